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

//! Configuration: command line / environment settings and the update loop config

use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_REMOTE: &str = "origin";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// How the detector picks a branch when no upstream tracking reference exists
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BranchFallback {
    /// Ask the oracle for the checked-out branch name
    #[default]
    CurrentBranch,
    /// Always compare against this branch of the remote
    Named(String),
}

/// Immutable settings of the update loop
#[derive(Debug, Clone)]
pub struct UpdateLoopConfig {
    poll_interval: Duration,
    remote: String,
    branch_fallback: BranchFallback,
    drain_timeout: Duration,
}

impl UpdateLoopConfig {
    pub fn new(poll_interval: Duration) -> Result<Self, ConfigError> {
        if poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(Self {
            poll_interval,
            remote: DEFAULT_REMOTE.to_owned(),
            branch_fallback: BranchFallback::default(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        })
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn with_branch_fallback(mut self, fallback: BranchFallback) -> Self {
        self.branch_fallback = fallback;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroDrainTimeout);
        }
        self.drain_timeout = timeout;
        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn branch_fallback(&self) -> &BranchFallback {
        &self.branch_fallback
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }
}

impl Default for UpdateLoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            remote: DEFAULT_REMOTE.to_owned(),
            branch_fallback: BranchFallback::default(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Process settings, read from flags with environment variable fallbacks
#[derive(Debug, Clone, Parser)]
#[command(name = "autopull", version, about = "HTTP server that follows its git remote")]
pub struct Settings {
    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Working copy to keep up to date (defaults to the current directory)
    #[arg(long, env = "AUTOPULL_REPO_DIR")]
    pub repo_dir: Option<PathBuf>,

    /// Remote to poll
    #[arg(long, env = "AUTOPULL_REMOTE", default_value = DEFAULT_REMOTE)]
    pub remote: String,

    /// Branch compared on the remote when no upstream is configured
    #[arg(long, env = "AUTOPULL_BRANCH")]
    pub branch: Option<String>,

    /// Seconds between two polls
    #[arg(long, env = "AUTOPULL_INTERVAL_SECS", default_value_t = 5)]
    pub interval_secs: u64,

    /// Seconds allowed for draining and for awaiting server termination
    #[arg(long, env = "AUTOPULL_DRAIN_TIMEOUT_SECS", default_value_t = 10)]
    pub drain_timeout_secs: u64,

    /// git executable
    #[arg(long = "git", env = "AUTOPULL_GIT", default_value = "git")]
    pub git_binary: PathBuf,

    /// Serve without polling for updates
    #[arg(long, env = "AUTOPULL_DISABLE_UPDATES")]
    pub disable_updates: bool,
}

impl Settings {
    /// `host:port`, with IPv6 literals bracketed
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn repo_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.repo_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().map_err(ConfigError::WorkingDir),
        }
    }

    pub fn loop_config(&self) -> Result<UpdateLoopConfig, ConfigError> {
        let fallback = match &self.branch {
            Some(branch) => BranchFallback::Named(branch.clone()),
            None => BranchFallback::CurrentBranch,
        };

        UpdateLoopConfig::new(Duration::from_secs(self.interval_secs))?
            .with_remote(self.remote.clone())
            .with_branch_fallback(fallback)
            .with_drain_timeout(Duration::from_secs(self.drain_timeout_secs))
    }
}
