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

//! Revision oracle: the version-control operations the update loop relies on

use crate::error::{OracleError, Stage};
use crate::revision::RevisionId;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Where a fast-forward takes its commits from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullSource {
    /// The upstream tracking reference of the checked-out branch
    Upstream,
    /// An explicit branch of a remote, used when nothing is tracked
    RemoteBranch { remote: String, branch: String },
}

impl fmt::Display for PullSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream => f.write_str("@{u}"),
            Self::RemoteBranch { remote, branch } => write!(f, "{remote}/{branch}"),
        }
    }
}

/// Read and update the state of the local working copy against its remote.
///
/// Every call may block on network or disk I/O. Implementations never retry
/// internally; a failure is reported once with the stage that failed.
#[async_trait]
pub trait RevisionOracle: Send + Sync {
    /// Update remote-tracking references from `remote`.
    async fn fetch_remote(&self, remote: &str) -> Result<(), OracleError>;

    /// Revision currently checked out.
    async fn current_revision(&self) -> Result<RevisionId, OracleError>;

    /// Revision of the configured upstream tracking reference.
    ///
    /// Fails when the current branch tracks nothing.
    async fn upstream_revision(&self) -> Result<RevisionId, OracleError>;

    /// Name of the checked-out branch. Fails on a detached HEAD.
    async fn current_branch(&self) -> Result<String, OracleError>;

    /// Revision of `<remote>/<branch>`.
    async fn remote_branch_revision(
        &self,
        remote: &str,
        branch: &str,
    ) -> Result<RevisionId, OracleError>;

    /// Fast-forward the working copy to `source`.
    ///
    /// Fails instead of merging when local and remote histories diverged.
    async fn fast_forward_pull(&self, source: &PullSource) -> Result<(), OracleError>;
}

/// [`RevisionOracle`] backed by the `git` command line client
#[derive(Debug, Clone)]
pub struct GitOracle {
    repo_dir: PathBuf,
    git: PathBuf,
}

impl GitOracle {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            git: PathBuf::from("git"),
        }
    }

    /// Use a specific git executable instead of the one on `PATH`
    pub fn with_git_binary(mut self, git: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Run git and return its trimmed stdout, or its stderr as the error message.
    async fn run(&self, stage: Stage, args: &[&str]) -> Result<String, OracleError> {
        debug!("git {} (in {})", args.join(" "), self.repo_dir.display());

        let output = Command::new(&self.git)
            .args(args)
            .current_dir(&self.repo_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                OracleError::new(stage, format!("failed to run {}: {e}", self.git.display()))
            })?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        let message = if stderr.is_empty() {
            output.status.to_string()
        } else {
            stderr
        };
        Err(OracleError::new(stage, message))
    }

    async fn rev_parse(&self, stage: Stage, rev: &str) -> Result<RevisionId, OracleError> {
        let out = self.run(stage, &["rev-parse", rev]).await?;
        RevisionId::parse(&out)
            .ok_or_else(|| OracleError::new(stage, format!("git rev-parse {rev} printed nothing")))
    }
}

#[async_trait]
impl RevisionOracle for GitOracle {
    async fn fetch_remote(&self, remote: &str) -> Result<(), OracleError> {
        self.run(Stage::Fetch, &["fetch", remote, "--quiet"])
            .await
            .map(drop)
    }

    async fn current_revision(&self) -> Result<RevisionId, OracleError> {
        self.rev_parse(Stage::CurrentRevision, "HEAD").await
    }

    async fn upstream_revision(&self) -> Result<RevisionId, OracleError> {
        self.rev_parse(Stage::UpstreamRevision, "@{u}").await
    }

    async fn current_branch(&self) -> Result<String, OracleError> {
        let branch = self
            .run(Stage::BranchName, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;

        // --abbrev-ref prints the literal "HEAD" when detached
        if branch.is_empty() || branch == "HEAD" {
            return Err(OracleError::new(
                Stage::BranchName,
                "HEAD is detached, no branch name",
            ));
        }
        Ok(branch)
    }

    async fn remote_branch_revision(
        &self,
        remote: &str,
        branch: &str,
    ) -> Result<RevisionId, OracleError> {
        self.rev_parse(Stage::RemoteBranchRevision, &format!("{remote}/{branch}"))
            .await
    }

    async fn fast_forward_pull(&self, source: &PullSource) -> Result<(), OracleError> {
        let args = match source {
            PullSource::Upstream => vec!["pull", "--ff-only"],
            PullSource::RemoteBranch { remote, branch } => {
                vec!["pull", "--ff-only", remote.as_str(), branch.as_str()]
            }
        };
        self.run(Stage::Pull, &args).await.map(drop)
    }
}
