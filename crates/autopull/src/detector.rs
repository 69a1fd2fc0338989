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

//! Update detection: compare the local revision with the remote one

use crate::config::{BranchFallback, UpdateLoopConfig};
use crate::error::{OracleError, Stage};
use crate::oracle::{PullSource, RevisionOracle};
use crate::revision::RevisionId;
use tracing::debug;

/// Result of a single poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    UpToDate,
    /// `remote` was read from `source`, which is also what a pull must use
    UpdateAvailable {
        local: RevisionId,
        remote: RevisionId,
        source: PullSource,
    },
    CheckFailed(OracleError),
}

impl PollOutcome {
    pub fn is_update_available(&self) -> bool {
        matches!(self, Self::UpdateAvailable { .. })
    }
}

/// Fetch the remote and decide whether the working copy is behind it.
///
/// The remote revision comes from the upstream tracking reference when one is
/// configured, otherwise from `<remote>/<branch>` per the branch fallback.
/// Every oracle failure ends the check with [`PollOutcome::CheckFailed`].
pub async fn detect<O>(oracle: &O, config: &UpdateLoopConfig) -> PollOutcome
where
    O: RevisionOracle + ?Sized,
{
    match compare(oracle, config).await {
        Ok(outcome) => outcome,
        Err(e) => PollOutcome::CheckFailed(e),
    }
}

async fn compare<O>(oracle: &O, config: &UpdateLoopConfig) -> Result<PollOutcome, OracleError>
where
    O: RevisionOracle + ?Sized,
{
    oracle.fetch_remote(config.remote()).await?;
    let local = oracle.current_revision().await?;
    let (remote, source) = remote_revision(oracle, config).await?;

    if local == remote {
        debug!("Up to date at {}", local.short());
        Ok(PollOutcome::UpToDate)
    } else {
        Ok(PollOutcome::UpdateAvailable {
            local,
            remote,
            source,
        })
    }
}

async fn remote_revision<O>(
    oracle: &O,
    config: &UpdateLoopConfig,
) -> Result<(RevisionId, PullSource), OracleError>
where
    O: RevisionOracle + ?Sized,
{
    let upstream_err = match oracle.upstream_revision().await {
        Ok(rev) => return Ok((rev, PullSource::Upstream)),
        Err(e) => e,
    };
    debug!("No upstream revision ({}), falling back to remote branch", upstream_err.message);

    let branch = match config.branch_fallback() {
        BranchFallback::Named(branch) => branch.clone(),
        BranchFallback::CurrentBranch => match oracle.current_branch().await {
            Ok(branch) => branch,
            Err(branch_err) => {
                // Report why the upstream lookup failed when it said anything
                let message = if upstream_err.message.is_empty() {
                    branch_err.message
                } else {
                    upstream_err.message
                };
                return Err(OracleError::new(Stage::BranchName, message));
            }
        },
    };

    let rev = oracle
        .remote_branch_revision(config.remote(), &branch)
        .await?;
    Ok((
        rev,
        PullSource::RemoteBranch {
            remote: config.remote().to_owned(),
            branch,
        },
    ))
}
