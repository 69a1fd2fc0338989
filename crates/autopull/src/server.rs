// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of autopull.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Server lifecycle: bind, serve on a background task, drain and stop

use crate::error::{BindError, ShutdownError, TimeoutError};
use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, info, warn};

/// How the serving task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeExit {
    /// Stopped on request after in-flight connections finished
    Drained,
    /// Connections still open at the drain deadline were closed
    Aborted,
    /// The accept loop failed
    Failed(String),
}

/// Stop requests, ordered by how far the server is asked to go
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Serving,
    /// No new connections; open ones finish their current request
    Draining,
    /// Remaining connections are dropped
    Closing,
}

#[derive(Debug, Default)]
struct Flags {
    ready: AtomicBool,
    running: AtomicBool,
}

/// Live listener plus the task serving it.
///
/// Shared behind an `Arc` between the entry point, which waits on it, and
/// the update loop, which stops it before relaunching.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    flags: Arc<Flags>,
    phase: watch::Sender<Phase>,
    exit: watch::Receiver<Option<ServeExit>>,
    abort: AbortHandle,
}

/// Clears the running flag and publishes the exit, even when the task is aborted.
struct ServeGuard {
    flags: Arc<Flags>,
    exit: watch::Sender<Option<ServeExit>>,
    outcome: Option<ServeExit>,
}

impl Drop for ServeGuard {
    fn drop(&mut self) {
        self.flags.running.store(false, Ordering::SeqCst);
        let outcome = self.outcome.take().unwrap_or(ServeExit::Aborted);
        self.exit.send_replace(Some(outcome));
    }
}

/// Bind `addr` and start serving `app` on a dedicated task.
///
/// The handle is ready as soon as this returns: the socket is bound and
/// listening, connections are accepted by the spawned task.
pub async fn start(addr: &str, app: Router) -> Result<ServerHandle, BindError> {
    let bind_err = |source| BindError {
        addr: addr.to_owned(),
        source,
    };

    let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
    let local_addr = listener.local_addr().map_err(bind_err)?;

    let flags = Arc::new(Flags::default());
    flags.ready.store(true, Ordering::SeqCst);
    flags.running.store(true, Ordering::SeqCst);

    let (phase_tx, phase_rx) = watch::channel(Phase::Serving);
    let (exit_tx, exit_rx) = watch::channel(None);

    let guard = ServeGuard {
        flags: Arc::clone(&flags),
        exit: exit_tx,
        outcome: None,
    };

    let task = tokio::spawn(async move {
        // Bound first so listener and connections are gone before the exit is published
        let mut guard = guard;
        guard.outcome = Some(serve(listener, app, phase_rx).await);
    });

    debug!("Serving task spawned for {local_addr}");

    Ok(ServerHandle {
        local_addr,
        flags,
        phase: phase_tx,
        exit: exit_rx,
        abort: task.abort_handle(),
    })
}

/// Accept until draining starts, then wait for open connections or the close order.
async fn serve(listener: TcpListener, app: Router, mut phase: watch::Receiver<Phase>) -> ServeExit {
    let mut connections = JoinSet::new();

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) if is_connection_error(&e) => {
                    debug!("Dropped connection during accept: {e}");
                    continue;
                }
                Err(e) => return ServeExit::Failed(e.to_string()),
            },
            () = reached(&mut phase, Phase::Draining) => break,
        };

        debug!("Accepted connection from {peer}");
        connections.spawn(serve_connection(stream, app.clone(), phase.clone()));
        while connections.try_join_next().is_some() {}
    }
    drop(listener);

    let drained = tokio::select! {
        () = join_all(&mut connections) => true,
        () = reached(&mut phase, Phase::Closing) => false,
    };
    if drained {
        return ServeExit::Drained;
    }

    debug!("Closing {} open connections", connections.len());
    connections.shutdown().await;
    ServeExit::Aborted
}

async fn serve_connection(stream: TcpStream, app: Router, mut phase: watch::Receiver<Phase>) {
    let conn = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(app));
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = reached(&mut phase, Phase::Draining) => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        debug!("Connection ended with error: {e}");
    }
}

/// Resolves once `phase` is at least `target`. A dropped handle counts as every phase.
async fn reached(phase: &mut watch::Receiver<Phase>, target: Phase) {
    let _ = phase.wait_for(|current| *current >= target).await;
}

async fn join_all(connections: &mut JoinSet<()>) {
    while connections.join_next().await.is_some() {}
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Listener is bound. Never goes back to false.
    pub fn is_ready(&self) -> bool {
        self.flags.ready.load(Ordering::SeqCst)
    }

    /// Serving task is still alive
    pub fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    /// `None` while the serving task is alive
    pub fn exit_status(&self) -> Option<ServeExit> {
        self.exit.borrow().clone()
    }

    /// Stop accepting, give in-flight requests `timeout` to finish, then
    /// close whatever is still open.
    ///
    /// Calling it again after a stop is harmless.
    pub async fn request_shutdown(&self, timeout: Duration) -> Result<(), ShutdownError> {
        let first = self.phase.send_if_modified(|phase| {
            if *phase == Phase::Serving {
                *phase = Phase::Draining;
                true
            } else {
                false
            }
        });
        if first {
            info!("Stopping listener on {}", self.local_addr);
        } else {
            debug!("Shutdown of {} already requested", self.local_addr);
        }

        if tokio::time::timeout(timeout, self.wait()).await.is_ok() {
            return Ok(());
        }

        warn!(
            "Connections on {} still open after {:?}, closing them",
            self.local_addr, timeout
        );
        self.phase.send_replace(Phase::Closing);

        if tokio::time::timeout(timeout, self.wait()).await.is_err() {
            warn!("Serving task on {} did not close, aborting it", self.local_addr);
            self.abort.abort();
        }
        Err(ShutdownError::DrainTimeout { timeout })
    }

    /// Wait until the serving task has exited and the port is released.
    pub async fn await_termination(&self, timeout: Duration) -> Result<(), TimeoutError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map(drop)
            .map_err(|_| TimeoutError { timeout })
    }

    /// Wait, without bound, for the serving task to exit.
    pub async fn wait(&self) -> ServeExit {
        let mut exit = self.exit.clone();
        match exit.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone().unwrap_or(ServeExit::Aborted),
            Err(_) => ServeExit::Aborted,
        }
    }
}
