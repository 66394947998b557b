//! Opaque address container with family, host and port.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::Domain;

use crate::error::{Error, Result};

/// Address family of an [`Endpoint`] or socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Ipv4,
    Ipv6,
}

impl Family {
    pub(crate) fn domain(self) -> Domain {
        match self {
            Family::Ipv4 => Domain::IPV4,
            Family::Ipv6 => Domain::IPV6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    addr: SocketAddr,
}

impl Endpoint {
    /// Parses a numeric IPv4 or IPv6 literal; IPv6 is detected by the
    /// presence of `':'`. Any other input is an invalid-address error.
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let ip = if host.contains(':') {
            host.parse::<Ipv6Addr>().map(IpAddr::V6)
        } else {
            host.parse::<Ipv4Addr>().map(IpAddr::V4)
        };
        let ip = ip
            .map_err(|_| Error::os("invalid address", io::ErrorKind::InvalidInput.into()))?;
        Ok(Self {
            addr: SocketAddr::new(ip, port),
        })
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn family(&self) -> Family {
        if self.addr.is_ipv4() {
            Family::Ipv4
        } else {
            Family::Ipv6
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// All-zero endpoint of the given family; stands in for a source the
    /// kernel did not report.
    pub(crate) fn unspecified(family: Family) -> Self {
        let ip = match family {
            Family::Ipv4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Family::Ipv6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        Self {
            addr: SocketAddr::new(ip, 0),
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr.ip(), self.addr.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_follow_the_literal() {
        assert_eq!(Endpoint::new("::1", 443).unwrap().family(), Family::Ipv6);
        assert_eq!(
            Endpoint::new("127.0.0.1", 80).unwrap().family(),
            Family::Ipv4
        );
    }

    #[test]
    fn non_numeric_hosts_are_rejected() {
        assert!(Endpoint::new("not an address", 1).is_err());
        assert!(Endpoint::new("localhost", 1).is_err());
        assert!(Endpoint::new("", 1).is_err());
    }

    #[test]
    fn formats_as_host_and_port() {
        let endpoint = Endpoint::new("127.0.0.1", 8080).unwrap();
        assert_eq!(endpoint.to_string(), "127.0.0.1:8080");
        assert_eq!(endpoint.host(), "127.0.0.1");
        assert_eq!(endpoint.port(), 8080);
    }

    #[test]
    fn unspecified_has_zero_port() {
        let endpoint = Endpoint::unspecified(Family::Ipv6);
        assert_eq!(endpoint.family(), Family::Ipv6);
        assert_eq!(endpoint.port(), 0);
    }
}
