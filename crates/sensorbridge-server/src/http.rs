//! [`ServerHandle`] – a router running on a dedicated Tokio runtime.
//!
//! The bridges are driven from plain threads (the capture consumer blocks,
//! the poller sleeps), so each HTTP surface owns its runtime instead of
//! requiring the caller to be async.  The listening socket is bound
//! synchronously, which surfaces bind errors at start-up and resolves port
//! `0` to the real port before [`spawn`] returns.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use sensorbridge_types::BridgeError;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Default bound on waiting for in-flight requests during [`ServerHandle::stop`].
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const WORKER_THREADS: usize = 2;

/// Bind `addr` and serve `router` in the background.
///
/// # Errors
///
/// Returns [`BridgeError::Bind`] if the address is unavailable and
/// [`BridgeError::Io`] if the runtime cannot be created.
pub fn spawn(name: &str, addr: SocketAddr, router: Router) -> Result<ServerHandle, BridgeError> {
    let listener = std::net::TcpListener::bind(addr).map_err(|e| BridgeError::Bind {
        addr: addr.to_string(),
        details: e.to_string(),
    })?;
    listener.set_nonblocking(true)?;
    let local_addr = listener.local_addr()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(WORKER_THREADS)
        .thread_name(format!("{name}-http"))
        .enable_all()
        .build()?;

    let listener = {
        let _guard = runtime.enter();
        tokio::net::TcpListener::from_std(listener)?
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = runtime.spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                // A dropped sender counts as a shutdown request too.
                let _ = shutdown_rx.await;
            })
            .await
    });

    info!(server = name, addr = %local_addr, "listening");

    Ok(ServerHandle {
        name: name.to_string(),
        local_addr,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
        runtime: Some(runtime),
    })
}

/// Running HTTP server.
///
/// [`stop`](Self::stop) (or drop) stops accepting connections, lets
/// in-flight requests finish within a deadline, then releases the listening
/// socket.  Both must be called from outside any Tokio runtime.
pub struct ServerHandle {
    name: String,
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
    runtime: Option<Runtime>,
}

impl ServerHandle {
    /// Address actually bound (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `false` once [`stop`](Self::stop) has run.
    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    /// Gracefully stop the server, waiting at most `timeout` for in-flight
    /// requests.  Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ShutdownTimeout`] when requests were still
    /// running at the deadline and [`BridgeError::Io`] when the serve loop
    /// itself failed.  The socket is released in every case.
    pub fn stop(&mut self, timeout: Duration) -> Result<(), BridgeError> {
        let Some(runtime) = self.runtime.take() else {
            return Ok(());
        };
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let mut result = Ok(());
        if let Some(task) = self.task.take() {
            // The timer must be registered from inside the runtime.
            match runtime.block_on(async { tokio::time::timeout(timeout, task).await }) {
                Ok(Ok(Ok(()))) => info!(server = %self.name, "server stopped"),
                Ok(Ok(Err(e))) => {
                    error!(server = %self.name, error = %e, "server loop failed");
                    result = Err(BridgeError::from(e));
                }
                Ok(Err(e)) => {
                    error!(server = %self.name, error = %e, "server task panicked");
                    result = Err(BridgeError::Io(e.to_string()));
                }
                Err(_) => {
                    warn!(server = %self.name, ?timeout, "in-flight requests did not finish; forcing close");
                    result = Err(BridgeError::ShutdownTimeout {
                        component: format!("{} server", self.name),
                        waited: timeout,
                    });
                }
            }
        }
        // Drops the listener and any remaining connections.
        runtime.shutdown_timeout(timeout);
        result
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop(DEFAULT_SHUTDOWN_TIMEOUT) {
            warn!(server = %self.name, error = %e, "server shutdown on drop was not clean");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    fn hello_router() -> Router {
        Router::new().route("/hello", get(|| async { "hello" }))
    }

    fn local() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    fn raw_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(
            stream,
            "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
        )
        .unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn port_zero_resolves_to_real_port() {
        let mut server = spawn("test", local(), hello_router()).unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert!(raw_get(server.local_addr(), "/hello").ends_with("hello"));
        server.stop(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn stop_releases_the_socket() {
        let mut server = spawn("test", local(), hello_router()).unwrap();
        let addr = server.local_addr();
        server.stop(Duration::from_secs(2)).unwrap();
        assert!(!server.is_running());
        // Port is free again.
        let rebound = std::net::TcpListener::bind(addr);
        assert!(rebound.is_ok(), "socket was not released: {rebound:?}");
    }

    #[test]
    fn stop_is_idempotent() {
        let mut server = spawn("test", local(), hello_router()).unwrap();
        server.stop(Duration::from_secs(2)).unwrap();
        server.stop(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn stop_after_serving_frees_port_for_a_new_server() {
        let mut first = spawn("first", local(), hello_router()).unwrap();
        let addr = first.local_addr();
        assert!(raw_get(addr, "/hello").ends_with("hello"));
        first.stop(Duration::from_secs(2)).unwrap();

        let mut second = spawn("second", addr, hello_router()).unwrap();
        assert_eq!(second.local_addr(), addr);
        assert!(raw_get(addr, "/hello").ends_with("hello"));
        second.stop(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn drop_stops_the_server() {
        let addr = {
            let server = spawn("test", local(), hello_router()).unwrap();
            server.local_addr()
        };
        assert!(std::net::TcpListener::bind(addr).is_ok());
    }

    #[test]
    fn bind_conflict_is_reported() {
        let taken = std::net::TcpListener::bind(local()).unwrap();
        let err = spawn("test", taken.local_addr().unwrap(), hello_router())
            .err()
            .expect("second bind must fail");
        assert!(matches!(err, BridgeError::Bind { .. }));
    }
}
