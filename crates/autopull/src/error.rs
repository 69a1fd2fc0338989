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

//! Error types for the self-update core

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Version-control step that produced an [`OracleError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    CurrentRevision,
    UpstreamRevision,
    BranchName,
    RemoteBranchRevision,
    Pull,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::CurrentRevision => "current revision",
            Self::UpstreamRevision => "upstream revision",
            Self::BranchName => "branch resolution",
            Self::RemoteBranchRevision => "remote branch revision",
            Self::Pull => "fast-forward pull",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A version-control operation failed.
///
/// `message` is the diagnostic reported by the underlying tool, verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{stage} failed: {message}")]
pub struct OracleError {
    pub stage: Stage,
    pub message: String,
}

impl OracleError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// The listener could not acquire its address.
#[derive(Debug, Error)]
#[error("failed to bind {addr}: {source}")]
pub struct BindError {
    pub addr: String,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("in-flight requests did not drain within {timeout:?}, serving task aborted")]
    DrainTimeout { timeout: Duration },
}

/// The serving task was still alive when the wait bound elapsed.
#[derive(Debug, Error)]
#[error("server task still running after {timeout:?}")]
pub struct TimeoutError {
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum RelaunchError {
    #[error("cannot resolve current executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    #[error("argument contains an interior NUL byte: {0}")]
    InvalidArgument(String),

    #[cfg(unix)]
    #[error("execv of {} failed: {source}", .path.display())]
    Exec {
        path: std::path::PathBuf,
        #[source]
        source: nix::errno::Errno,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("poll interval must be greater than zero")]
    ZeroInterval,

    #[error("drain timeout must be greater than zero")]
    ZeroDrainTimeout,

    #[error("cannot determine working directory: {0}")]
    WorkingDir(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_error_display_includes_stage_and_message() {
        let err = OracleError::new(Stage::Fetch, "fatal: unable to access remote");
        assert_eq!(
            err.to_string(),
            "fetch failed: fatal: unable to access remote"
        );
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        let json = serde_json::to_string(&Stage::RemoteBranchRevision).unwrap();
        assert_eq!(json, "\"remote_branch_revision\"");
    }

    #[test]
    fn test_bind_error_keeps_source() {
        let err = BindError {
            addr: "127.0.0.1:5000".to_owned(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("failed to bind 127.0.0.1:5000"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
