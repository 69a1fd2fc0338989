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

//! Update loop: poll on a fixed schedule, pull, drain the server, relaunch

use crate::config::UpdateLoopConfig;
use crate::detector::{PollOutcome, detect};
use crate::error::RelaunchError;
use crate::oracle::RevisionOracle;
use crate::relaunch::Relauncher;
use crate::revision::RevisionId;
use crate::server::ServerHandle;
use crate::telemetry::{UpdateEvent, report_event};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::info;

/// How a single poll cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cycle {
    UpToDate,
    CheckFailed,
    /// Remote moved but the fast-forward failed; retried on the next tick
    PullFailed,
    /// Working copy now at `to`; the process has to be relaunched
    Pulled { from: RevisionId, to: RevisionId },
}

#[derive(Debug)]
pub struct UpdateLoop<O, R> {
    config: UpdateLoopConfig,
    oracle: O,
    server: Arc<ServerHandle>,
    relauncher: R,
}

impl<O, R> UpdateLoop<O, R>
where
    O: RevisionOracle,
    R: Relauncher,
{
    pub fn new(
        config: UpdateLoopConfig,
        oracle: O,
        server: Arc<ServerHandle>,
        relauncher: R,
    ) -> Self {
        Self {
            config,
            oracle,
            server,
            relauncher,
        }
    }

    /// Poll forever; after a successful pull, drain the server and relaunch.
    ///
    /// Ticks follow a fixed schedule from the start of the loop, whatever
    /// the previous cycle did, and missed ticks are skipped. Returns only
    /// when replacing the process image failed.
    pub async fn run(self) -> RelaunchError {
        info!(
            "Polling {} every {:?}",
            self.config.remote(),
            self.config.poll_interval()
        );
        report_event(&UpdateEvent::LoopStarted {
            interval_secs: self.config.poll_interval().as_secs_f64(),
            remote: self.config.remote().to_owned(),
        });

        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            match AssertUnwindSafe(self.poll_once()).catch_unwind().await {
                Ok(Cycle::Pulled { .. }) => return self.drain_and_relaunch().await,
                Ok(Cycle::UpToDate | Cycle::CheckFailed | Cycle::PullFailed) => {}
                Err(panic) => report_event(&UpdateEvent::CyclePanicked {
                    message: panic_message(panic.as_ref()),
                }),
            }
        }
    }

    /// One detection cycle, pulling when the remote moved.
    ///
    /// Never touches the server.
    pub async fn poll_once(&self) -> Cycle {
        let (local, remote, source) = match detect(&self.oracle, &self.config).await {
            PollOutcome::UpToDate => return Cycle::UpToDate,
            PollOutcome::CheckFailed(err) => {
                report_event(&UpdateEvent::CheckFailed {
                    stage: err.stage,
                    message: err.message,
                });
                return Cycle::CheckFailed;
            }
            PollOutcome::UpdateAvailable {
                local,
                remote,
                source,
            } => (local, remote, source),
        };

        info!(
            "Update detected: local {} != remote {} ({source})",
            local.short(),
            remote.short()
        );
        report_event(&UpdateEvent::UpdateDetected {
            local: local.clone(),
            remote: remote.clone(),
        });

        match self.oracle.fast_forward_pull(&source).await {
            Ok(()) => {
                report_event(&UpdateEvent::Pulled {
                    from: local.clone(),
                    to: remote.clone(),
                });
                Cycle::Pulled {
                    from: local,
                    to: remote,
                }
            }
            Err(err) => {
                report_event(&UpdateEvent::PullFailed {
                    local,
                    remote,
                    message: err.message,
                });
                Cycle::PullFailed
            }
        }
    }

    async fn drain_and_relaunch(&self) -> RelaunchError {
        let timeout = self.config.drain_timeout();

        // Both bounds are advisory: a stuck drain must not block the relaunch
        if let Err(e) = self.server.request_shutdown(timeout).await {
            report_event(&UpdateEvent::DrainTimedOut {
                error: e.to_string(),
            });
        }
        if let Err(e) = self.server.await_termination(timeout).await {
            report_event(&UpdateEvent::DrainTimedOut {
                error: e.to_string(),
            });
        }

        report_event(&UpdateEvent::Relaunching {
            program: self.relauncher.describe(),
        });

        match self.relauncher.relaunch() {
            Ok(never) => match never {},
            Err(e) => {
                report_event(&UpdateEvent::RelaunchFailed {
                    error: e.to_string(),
                });
                e
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
