//! UDP operation semantics over loopback.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use evio::net::udp;
use evio::net::{Endpoint, Family};
use evio::Context;

fn finish(context: &Context, pending: &Arc<AtomicUsize>) {
    if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
        context.stop();
    }
}

fn bound_socket(context: &Context) -> (udp::Socket, Endpoint) {
    let mut socket = udp::Socket::new(context, Family::Ipv4).unwrap();
    socket
        .bind(&Endpoint::new("127.0.0.1", 0).unwrap())
        .unwrap();
    let endpoint = *socket.endpoint().unwrap();
    (socket, endpoint)
}

#[test]
fn datagrams_carry_sizes_and_source() {
    let context = Context::new().unwrap();
    let (mut receiver, receiver_ep) = bound_socket(&context);
    let (mut sender, sender_ep) = bound_socket(&context);

    let pending = Arc::new(AtomicUsize::new(2));

    let recv_ctx = context.clone();
    let recv_pending = pending.clone();
    context.spawn(async move {
        for expected in [0usize, 1, 2] {
            let mut data = [0u8; 16];
            let (count, source) = receiver.recv_from(&mut data).await.unwrap();
            assert_eq!(count, expected);
            assert_eq!(source, sender_ep);
        }
        finish(&recv_ctx, &recv_pending);
    });

    let send_ctx = context.clone();
    let send_pending = pending.clone();
    context.spawn(async move {
        for payload in [&b""[..], b"x", b"yz"] {
            let sent = sender.send_to(receiver_ep, payload).await.unwrap();
            assert_eq!(sent, payload.len());
        }
        finish(&send_ctx, &send_pending);
    });

    context.run(8).unwrap();
}

#[test]
fn send_some_to_transmits_one_datagram() {
    let context = Context::new().unwrap();
    let (mut receiver, receiver_ep) = bound_socket(&context);
    let (mut sender, sender_ep) = bound_socket(&context);

    let pending = Arc::new(AtomicUsize::new(2));

    let recv_ctx = context.clone();
    let recv_pending = pending.clone();
    context.spawn(async move {
        let mut data = [0u8; 16];
        let (count, source) = receiver.recv_from(&mut data).await.unwrap();
        assert_eq!(&data[..count], b"ping");
        assert_eq!(source, sender_ep);
        finish(&recv_ctx, &recv_pending);
    });

    let send_ctx = context.clone();
    let send_pending = pending.clone();
    context.spawn(async move {
        let sent = sender.send_some_to(receiver_ep, b"ping").await.unwrap();
        assert_eq!(sent, 4);
        finish(&send_ctx, &send_pending);
    });

    context.run(8).unwrap();
}

#[test]
fn oversized_recv_buffer_reports_datagram_size() {
    let context = Context::new().unwrap();
    let (mut receiver, receiver_ep) = bound_socket(&context);
    let (mut sender, _) = bound_socket(&context);

    let pending = Arc::new(AtomicUsize::new(2));

    let recv_ctx = context.clone();
    let recv_pending = pending.clone();
    context.spawn(async move {
        let mut data = [0u8; 1024];
        let (count, _) = receiver.recv_from(&mut data).await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(&data[..3], b"abc");
        finish(&recv_ctx, &recv_pending);
    });

    let send_ctx = context.clone();
    let send_pending = pending.clone();
    context.spawn(async move {
        assert_eq!(sender.send_to(receiver_ep, b"abc").await.unwrap(), 3);
        finish(&send_ctx, &send_pending);
    });

    context.run(8).unwrap();
}
