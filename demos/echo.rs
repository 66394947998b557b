//! TCP echo demo: an accept loop spawning one task per connection, plus a
//! client that sends a single line and prints the echo.

use std::sync::mpsc;

use evio::net::tcp;
use evio::net::{Endpoint, Family};
use evio::Runtime;

fn main() -> evio::Result<()> {
    tracing_subscriber::fmt::init();

    let runtime = Runtime::with_workers(2)?;
    let context = runtime.context().clone();

    let mut listener = tcp::Socket::new(&context, Family::Ipv4)?;
    listener.bind(&Endpoint::new("127.0.0.1", 0)?)?;
    listener.listen(128)?;
    let target = *listener.endpoint().expect("bound socket has an endpoint");
    println!("listening on {target}");

    let server_ctx = context.clone();
    runtime.spawn(async move {
        loop {
            let mut client = match listener.accept().await {
                Ok(client) => client,
                Err(err) => {
                    eprintln!("accept failed: {err}");
                    return;
                }
            };
            server_ctx.spawn(async move {
                let mut data = [0u8; 4096];
                loop {
                    match client.recv(&mut data).await {
                        Ok(0) | Err(_) => break,
                        Ok(count) => {
                            if client.send(&data[..count]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    let (done, wait) = mpsc::channel();
    let client_ctx = context.clone();
    runtime.spawn(async move {
        let mut socket = tcp::Socket::new(&client_ctx, Family::Ipv4)?;
        socket.connect(target).await?;
        socket.send(b"hello over evio\n").await?;
        let mut data = [0u8; 64];
        let count = socket.recv(&mut data).await?;
        println!("echoed: {}", String::from_utf8_lossy(&data[..count]));
        let _ = done.send(());
        Ok::<(), evio::Error>(())
    });

    let _ = wait.recv();
    runtime.shutdown()
}
