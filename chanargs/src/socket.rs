//! Listening socket creation.
//!
//! Sockets are built with `socket2` so that options like `SO_REUSEPORT` can be
//! set between `socket()` and `bind()`, which `std` and `tokio` do not allow.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use chanargs_core::ValidatedOptions;
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::ServerError;

const LISTEN_BACKLOG: i32 = 1024;

/// Resolve a `host:port` address such as `127.0.0.1:0`, `[::]:0` or
/// `localhost:50051` to the first socket address it names.
pub fn parse_address(address: &str) -> Result<SocketAddr, ServerError> {
    let invalid = |reason: String| ServerError::InvalidAddress {
        address: address.to_owned(),
        reason,
    };

    address
        .to_socket_addrs()
        .map_err(|err| invalid(err.to_string()))?
        .next()
        .ok_or_else(|| invalid("resolved to no addresses".to_owned()))
}

/// Create a non-blocking listener bound to `addr`, applying the socket-level
/// options from `options`.
pub fn bind_listener(addr: SocketAddr, options: &ValidatedOptions) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    if options.reuse_port() {
        socket.set_reuse_address(true)?;
        set_reuse_port(&socket)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    tracing::debug!(%addr, reuse_port = options.reuse_port(), "bound listener");
    Ok(socket.into())
}

#[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
fn set_reuse_port(socket: &Socket) -> io::Result<()> {
    socket.set_reuse_port(true)
}

#[cfg(not(all(unix, not(any(target_os = "solaris", target_os = "illumos")))))]
fn set_reuse_port(_socket: &Socket) -> io::Result<()> {
    tracing::warn!("SO_REUSEPORT is not supported on this platform");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanargs_core::OptionSet;

    fn options(reuse_port: bool) -> ValidatedOptions {
        OptionSet::new()
            .with("grpc.so_reuseport", reuse_port)
            .validate()
            .unwrap()
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(
            parse_address("127.0.0.1:0").unwrap(),
            "127.0.0.1:0".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_address("[::]:8080").unwrap(),
            "[::]:8080".parse::<SocketAddr>().unwrap()
        );
        assert!(matches!(
            parse_address("no port here"),
            Err(ServerError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_bind_listener_ephemeral_port() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), &options(false)).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_reuse_port_allows_second_bind() {
        let first = bind_listener("127.0.0.1:0".parse().unwrap(), &options(true)).unwrap();
        let addr = first.local_addr().unwrap();

        let second = bind_listener(addr, &options(true));
        assert!(second.is_ok());

        let third = bind_listener(addr, &options(false));
        assert_eq!(third.unwrap_err().kind(), io::ErrorKind::AddrInUse);
    }
}
