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

//! autopull - entry point
//!
//! Serves the application routes while the update loop follows the git
//! remote of the working copy. A successful pull ends in the process image
//! being replaced; SIGINT or SIGTERM drains the server and exits.

use anyhow::{Context, anyhow};
use autopull::{
    ExecRelauncher, GitOracle, RelaunchError, ServeExit, ServerHandle, Settings, UpdateLoop,
    routes, server,
};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "autopull=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let settings = Settings::parse();
    let loop_config = settings.loop_config()?;
    let repo_dir = settings.repo_dir()?;

    // Must be captured before the first pull rewrites the working copy
    let relauncher = ExecRelauncher::from_current_process()?;

    info!("Starting autopull for {}", repo_dir.display());

    let server = server::start(&settings.listen_addr(), routes::router())
        .await
        .context("failed to start HTTP server")?;
    let server = Arc::new(server);
    info!("Listening on http://{}", server.local_addr());

    let updater = if settings.disable_updates {
        info!("Updates disabled, serving only");
        None
    } else {
        let oracle = GitOracle::new(repo_dir).with_git_binary(&settings.git_binary);
        let update_loop =
            UpdateLoop::new(loop_config.clone(), oracle, Arc::clone(&server), relauncher);
        Some(tokio::spawn(update_loop.run()))
    };

    run_until_exit(&server, updater, loop_config.drain_timeout()).await
}

/// Serve until the server stops, the update loop gives up relaunching, or a
/// termination signal arrives.
async fn run_until_exit(
    server: &ServerHandle,
    mut updater: Option<JoinHandle<RelaunchError>>,
    drain_timeout: Duration,
) -> anyhow::Result<()> {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            exit = server.wait() => {
                if let ServeExit::Failed(e) = exit {
                    return Err(anyhow!("server stopped unexpectedly: {e}"));
                }
                // Drained by the update loop, which is now relaunching
                return match updater.take() {
                    Some(handle) => Err(updater_error(handle.await)),
                    None => Ok(()),
                };
            }
            joined = wait_updater(&mut updater) => {
                updater = None;
                let err = updater_error(joined);
                if !server.is_running() {
                    return Err(err);
                }
                error!("{err:#}, serving without updates");
            }
            () = &mut shutdown => {
                info!("Shutdown signal received, draining");
                if let Err(e) = server.request_shutdown(drain_timeout).await {
                    warn!("{e}");
                }
                return Ok(());
            }
        }
    }
}

async fn wait_updater(
    updater: &mut Option<JoinHandle<RelaunchError>>,
) -> Result<RelaunchError, JoinError> {
    match updater {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn updater_error(joined: Result<RelaunchError, JoinError>) -> anyhow::Error {
    match joined {
        Ok(err) => anyhow::Error::new(err).context("relaunch failed"),
        Err(e) => anyhow!("update loop ended abnormally: {e}"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
