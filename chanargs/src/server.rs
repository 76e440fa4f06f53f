//! Server lifecycle.
//!
//! A [`Server`] is created from a channel option set, which is validated
//! before anything else happens. Routes and ports are added while the server
//! is [`ServerState::Created`]; [`Server::start`] begins accepting on every
//! bound port and [`Server::stop`] shuts everything down.

use std::net::SocketAddr;
use std::pin::pin;
use std::time::Duration;

use axum::{Router, middleware::from_fn_with_state};
use chanargs_core::{Code, IntoOptionSet, ValidatedOptions};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::context::{ServerLimits, context_middleware};
use crate::error::{ConnectError, ServerError};
use crate::socket::{bind_listener, parse_address};

/// Lifecycle state of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Started,
    Stopped,
}

pub struct Server {
    options: ValidatedOptions,
    router: Router,
    state: ServerState,
    listeners: Vec<std::net::TcpListener>,
    local_addrs: Vec<SocketAddr>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    /// Create a server from a channel option set.
    ///
    /// The option set is validated here; a malformed set fails with
    /// [`ServerError::Options`] and no socket is ever created.
    pub fn new(options: impl IntoOptionSet) -> Result<Self, ServerError> {
        let options = options.into_option_set()?.validate()?;
        let (shutdown, _) = watch::channel(false);

        tracing::debug!(
            reuse_port = options.reuse_port(),
            max_receive = ?options.receive_limits().max_message_size(),
            max_send = ?options.send_limits().max_message_size(),
            "created server"
        );

        Ok(Self {
            options,
            router: Router::new(),
            state: ServerState::Created,
            listeners: Vec::new(),
            local_addrs: Vec::new(),
            shutdown,
            tasks: Vec::new(),
        })
    }

    pub fn options(&self) -> &ValidatedOptions {
        &self.options
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Addresses of every bound port, in the order they were added.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Register the routes of a service.
    pub fn add_router(&mut self, router: Router) -> Result<(), ServerError> {
        self.ensure_created("add a router to")?;
        self.router = std::mem::take(&mut self.router).merge(router);
        Ok(())
    }

    /// Bind a plaintext port and return the port number actually bound.
    ///
    /// Port `0` binds an ephemeral port. Socket options (`SO_REUSEPORT`) are
    /// applied before binding.
    pub fn add_insecure_port(&mut self, address: &str) -> Result<u16, ServerError> {
        self.ensure_created("add a port to")?;

        let addr = parse_address(address)?;
        let listener = bind_listener(addr, &self.options)?;
        let local_addr = listener.local_addr()?;

        self.listeners.push(listener);
        self.local_addrs.push(local_addr);
        Ok(local_addr.port())
    }

    /// Start serving on every bound port.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        self.ensure_created("start")?;

        if self.listeners.is_empty() {
            tracing::warn!("starting a server with no bound ports");
        }

        let listeners = self
            .listeners
            .drain(..)
            .map(tokio::net::TcpListener::from_std)
            .collect::<Result<Vec<_>, _>>()?;

        let limits = ServerLimits {
            receive: self.options.receive_limits(),
            send: self.options.send_limits(),
        };
        let app = std::mem::take(&mut self.router)
            .fallback(unimplemented_method)
            .layer(from_fn_with_state(limits, context_middleware));

        for listener in listeners {
            let shutdown = self.shutdown.subscribe();
            self.tasks
                .push(tokio::spawn(serve_listener(listener, app.clone(), shutdown)));
        }

        self.state = ServerState::Started;
        tracing::info!(addrs = ?self.local_addrs, "server started");
        Ok(())
    }

    /// Stop the server.
    ///
    /// With a grace period, in-flight calls get that long to finish before
    /// being cancelled; with `None` they are cancelled immediately. Stopping is
    /// valid in every state and stopping twice is a no-op.
    pub async fn stop(&mut self, grace: Option<Duration>) {
        if self.state == ServerState::Stopped {
            return;
        }

        let _ = self.shutdown.send(true);
        self.listeners.clear();

        let tasks = std::mem::take(&mut self.tasks);
        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        let mut drained = pin!(futures::future::join_all(tasks));

        let graceful = match grace {
            Some(grace) => tokio::time::timeout(grace, drained.as_mut()).await.is_ok(),
            None => false,
        };
        if !graceful {
            if grace.is_some() {
                tracing::warn!("grace period elapsed, cancelling remaining calls");
            }
            for abort in &aborts {
                abort.abort();
            }
            drained.await;
        }

        self.state = ServerState::Stopped;
        tracing::info!("server stopped");
    }

    fn ensure_created(&self, operation: &'static str) -> Result<(), ServerError> {
        match self.state {
            ServerState::Created => Ok(()),
            state => Err(ServerError::InvalidState { operation, state }),
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.state)
            .field("local_addrs", &self.local_addrs)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Accept loop of one listener.
///
/// Every connection runs in a task owned by this loop's [`JoinSet`], so
/// aborting the loop cancels all calls in flight on its connections. On the
/// shutdown signal the listener is closed and open connections finish their
/// current calls before the loop returns.
async fn serve_listener(listener: TcpListener, app: Router, mut shutdown: watch::Receiver<bool>) {
    let mut connections = JoinSet::new();
    let connection_shutdown = shutdown.clone();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::trace!(%peer, "accepted connection");
                    connections.spawn(serve_connection(
                        stream,
                        app.clone(),
                        connection_shutdown.clone(),
                    ));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to accept connection");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            Some(_) = connections.join_next() => {}
            () = signalled(&mut shutdown) => break,
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
}

async fn serve_connection(stream: TcpStream, app: Router, mut shutdown: watch::Receiver<bool>) {
    let service = TowerToHyperService::new(app);
    let mut conn = pin!(http1::Builder::new().serve_connection(TokioIo::new(stream), service));

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = signalled(&mut shutdown) => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(err) = result {
        tracing::debug!(error = %err, "connection closed with error");
    }
}

/// Resolves once shutdown is requested or the [`Server`] is gone.
async fn signalled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn unimplemented_method() -> ConnectError {
    ConnectError::new(Code::Unimplemented, "method not found")
}
