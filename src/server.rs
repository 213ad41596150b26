//! TCP server for handling HTTP echo connections.
//!
//! Accepts incoming connections and serves each one on its own task,
//! answering every request with the echo handler.

use crate::echo;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Listen backlog
const BACKLOG: i32 = 1024;

/// Server instance
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Bind a listener to `address` (`[host]:port`).
    ///
    /// An empty host binds all interfaces, IPv6 and IPv4.
    pub async fn bind(address: &str) -> io::Result<Self> {
        let addr = resolve(address).await?;
        let listener = create_listener(addr)?;

        Ok(Server {
            listener: TcpListener::from_std(listener)?,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> io::Result<()> {
        info!(address = %self.listener.local_addr()?, "Server listening");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream).await {
                            debug!(peer = %addr, error = %e, "Connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Serve HTTP/1.1 requests on a single client connection
async fn handle_connection(stream: TcpStream) -> Result<(), hyper::Error> {
    http1::Builder::new()
        .keep_alive(true)
        .serve_connection(TokioIo::new(stream), service_fn(echo::handle::<Incoming>))
        .await
}

/// Resolve a listen address, treating an empty host as all interfaces.
///
/// Only the first address the resolver returns is used, so a name such as
/// `localhost` binds a single address family.
async fn resolve(address: &str) -> io::Result<SocketAddr> {
    let address = if address.starts_with(':') {
        format!("[::]{address}")
    } else {
        address.to_string()
    };

    let addr = lookup_host(&address).await?.next();
    addr.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no address found for '{address}'"),
        )
    })
}

/// Create the listener for `addr`.
///
/// The IPv6 wildcard accepts IPv4 clients too. Where IPv6 is unavailable
/// it falls back to the IPv4 wildcard on the same port.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    match addr {
        SocketAddr::V6(v6) if v6.ip().is_unspecified() => {
            bind_socket(addr).or_else(|e| {
                if e.kind() == io::ErrorKind::AddrInUse {
                    return Err(e);
                }
                debug!(error = %e, "IPv6 unavailable, listening on IPv4 only");
                bind_socket(SocketAddr::from((Ipv4Addr::UNSPECIFIED, addr.port())))
            })
        }
        _ => bind_socket(addr),
    }
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn bind_socket(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    Ok(socket.into())
}
