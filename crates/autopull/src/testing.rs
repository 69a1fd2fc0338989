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

//! Test doubles shared by the unit tests

use crate::error::{OracleError, RelaunchError, Stage};
use crate::oracle::{PullSource, RevisionOracle};
use crate::relaunch::Relauncher;
use crate::revision::RevisionId;
use crate::server::ServerHandle;
use async_trait::async_trait;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Oracle answering from a fixed script and recording every call
#[derive(Debug, Clone)]
pub(crate) struct ScriptedOracle {
    pub fetch: Result<(), OracleError>,
    pub current: Result<RevisionId, OracleError>,
    pub upstream: Result<RevisionId, OracleError>,
    pub branch: Result<String, OracleError>,
    pub remote_branch: Result<RevisionId, OracleError>,
    pub pull: Result<(), OracleError>,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedOracle {
    /// Upstream configured, local and remote at the given revisions, pull succeeds
    pub fn tracking(local: &str, remote: &str) -> Self {
        Self {
            fetch: Ok(()),
            current: Ok(RevisionId::from(local)),
            upstream: Ok(RevisionId::from(remote)),
            branch: Ok("main".to_owned()),
            remote_branch: Ok(RevisionId::from(remote)),
            pull: Ok(()),
            log: Arc::default(),
        }
    }

    /// No upstream tracking reference; the remote branch holds `remote`
    pub fn untracked(local: &str, remote: &str) -> Self {
        Self {
            upstream: Err(OracleError::new(
                Stage::UpstreamRevision,
                "fatal: no upstream configured for branch 'main'",
            )),
            ..Self::tracking(local, remote)
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(op)).count()
    }

    fn record(&self, call: impl Into<String>) {
        self.log.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl RevisionOracle for ScriptedOracle {
    async fn fetch_remote(&self, remote: &str) -> Result<(), OracleError> {
        self.record(format!("fetch {remote}"));
        self.fetch.clone()
    }

    async fn current_revision(&self) -> Result<RevisionId, OracleError> {
        self.record("current");
        self.current.clone()
    }

    async fn upstream_revision(&self) -> Result<RevisionId, OracleError> {
        self.record("upstream");
        self.upstream.clone()
    }

    async fn current_branch(&self) -> Result<String, OracleError> {
        self.record("branch");
        self.branch.clone()
    }

    async fn remote_branch_revision(
        &self,
        remote: &str,
        branch: &str,
    ) -> Result<RevisionId, OracleError> {
        self.record(format!("remote_branch {remote}/{branch}"));
        self.remote_branch.clone()
    }

    async fn fast_forward_pull(&self, source: &PullSource) -> Result<(), OracleError> {
        self.record(format!("pull {source}"));
        self.pull.clone()
    }
}

/// Relauncher that counts invocations and, when watching a server, records
/// whether it was still running at that moment
#[derive(Debug, Clone, Default)]
pub(crate) struct CountingRelauncher {
    calls: Arc<AtomicUsize>,
    server: Option<Arc<ServerHandle>>,
    running_at_relaunch: Arc<Mutex<Vec<bool>>>,
}

impl CountingRelauncher {
    pub fn watching(server: &Arc<ServerHandle>) -> Self {
        Self {
            server: Some(Arc::clone(server)),
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn running_at_relaunch(&self) -> Vec<bool> {
        self.running_at_relaunch.lock().unwrap().clone()
    }
}

impl Relauncher for CountingRelauncher {
    fn relaunch(&self) -> Result<Infallible, RelaunchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(server) = &self.server {
            self.running_at_relaunch
                .lock()
                .unwrap()
                .push(server.is_running());
        }
        Err(RelaunchError::InvalidArgument("relaunch intercepted by test".to_owned()))
    }

    fn describe(&self) -> String {
        "counting test relauncher".to_owned()
    }
}
