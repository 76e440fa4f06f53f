//! OS-level check of a server's reuse-port setting.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};

/// Try to bind a second socket to `127.0.0.1:port` with `SO_REUSEADDR`,
/// `SO_REUSEPORT` and `TCP_NODELAY` set.
///
/// Returns `Ok(true)` if the bind succeeds and `Ok(false)` on "address in
/// use". While a listener holds the port, the bind only succeeds if that
/// listener also set `SO_REUSEPORT`. The probe socket is closed before
/// returning.
pub fn probe_reuse_port(port: u16) -> io::Result<bool> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_reuse_port(true)?;
    socket.set_nodelay(true)?;

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    match socket.bind(&addr.into()) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::AddrInUse => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_free_port() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        // The listener above is dropped, so the port is free again.
        assert!(probe_reuse_port(port).unwrap());
    }

    #[test]
    fn test_probe_plain_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!probe_reuse_port(port).unwrap());
    }
}
