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

//! autopull - an HTTP server that keeps itself up to date with its git remote
//!
//! A background loop polls the remote repository of the working copy the
//! server was started from. When the remote has moved past the local
//! revision the loop fast-forwards the checkout, drains the HTTP server and
//! replaces the process image with a fresh invocation of the same binary.

pub mod config;
pub mod detector;
pub mod error;
pub mod oracle;
pub mod relaunch;
pub mod revision;
pub mod routes;
pub mod server;
pub mod telemetry;
pub mod update_loop;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{BranchFallback, Settings, UpdateLoopConfig};
pub use detector::{PollOutcome, detect};
pub use error::{
    BindError, ConfigError, OracleError, RelaunchError, ShutdownError, Stage, TimeoutError,
};
pub use oracle::{GitOracle, PullSource, RevisionOracle};
pub use relaunch::{ExecRelauncher, Relauncher};
pub use revision::RevisionId;
pub use server::{ServeExit, ServerHandle};
pub use update_loop::{Cycle, UpdateLoop};
