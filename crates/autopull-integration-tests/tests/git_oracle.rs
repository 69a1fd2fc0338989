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

use autopull::{
    BranchFallback, GitOracle, PollOutcome, PullSource, RevisionId, RevisionOracle, Stage,
    UpdateLoopConfig, detect,
};
use autopull_integration_tests::{BRANCH, GitFixture, git_available};
use std::time::Duration;

macro_rules! require_git {
    () => {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }
    };
}

fn config() -> UpdateLoopConfig {
    UpdateLoopConfig::new(Duration::from_secs(1)).unwrap()
}

#[tokio::test]
async fn test_fresh_clone_is_up_to_date() {
    require_git!();
    let fixture = GitFixture::new();
    let oracle = GitOracle::new(fixture.work());

    let current = oracle.current_revision().await.unwrap();
    assert_eq!(current.as_str(), fixture.work_head());
    assert_eq!(oracle.current_branch().await.unwrap(), BRANCH);

    assert_eq!(detect(&oracle, &config()).await, PollOutcome::UpToDate);
}

#[tokio::test]
async fn test_upstream_only_moves_after_fetch() {
    require_git!();
    let mut fixture = GitFixture::new();
    let oracle = GitOracle::new(fixture.work());
    let before = oracle.upstream_revision().await.unwrap();

    let pushed = fixture.push_remote_commit("second");
    assert_eq!(oracle.upstream_revision().await.unwrap(), before);

    oracle.fetch_remote("origin").await.unwrap();
    assert_eq!(oracle.upstream_revision().await.unwrap().as_str(), pushed);
    assert_eq!(
        oracle
            .remote_branch_revision("origin", BRANCH)
            .await
            .unwrap()
            .as_str(),
        pushed
    );
}

#[tokio::test]
async fn test_detect_and_fast_forward() {
    require_git!();
    let mut fixture = GitFixture::new();
    let oracle = GitOracle::new(fixture.work());
    let local = fixture.work_head();
    let pushed = fixture.push_remote_commit("second");

    assert_eq!(
        detect(&oracle, &config()).await,
        PollOutcome::UpdateAvailable {
            local: RevisionId::from(local.as_str()),
            remote: RevisionId::from(pushed.as_str()),
            source: PullSource::Upstream,
        }
    );

    oracle
        .fast_forward_pull(&PullSource::Upstream)
        .await
        .unwrap();
    assert_eq!(fixture.work_head(), pushed);
    assert_eq!(detect(&oracle, &config()).await, PollOutcome::UpToDate);
}

#[tokio::test]
async fn test_missing_upstream_falls_back_to_current_branch() {
    require_git!();
    let mut fixture = GitFixture::new();
    fixture.unset_upstream();
    let oracle = GitOracle::new(fixture.work());

    let upstream = oracle.upstream_revision().await.unwrap_err();
    assert_eq!(upstream.stage, Stage::UpstreamRevision);

    let pushed = fixture.push_remote_commit("second");
    let source = match detect(&oracle, &config()).await {
        PollOutcome::UpdateAvailable { remote, source, .. } => {
            assert_eq!(remote.as_str(), pushed);
            source
        }
        other => panic!("expected update, got {other:?}"),
    };

    // A bare `git pull` has nothing to pull from here
    assert_eq!(
        oracle
            .fast_forward_pull(&PullSource::Upstream)
            .await
            .unwrap_err()
            .stage,
        Stage::Pull
    );
    oracle.fast_forward_pull(&source).await.unwrap();
    assert_eq!(fixture.work_head(), pushed);
}

#[tokio::test]
async fn test_detached_head_without_named_branch_fails_check() {
    require_git!();
    let fixture = GitFixture::new();
    fixture.detach_head();
    let oracle = GitOracle::new(fixture.work());

    assert_eq!(
        oracle.current_branch().await.unwrap_err().stage,
        Stage::BranchName
    );
    match detect(&oracle, &config()).await {
        PollOutcome::CheckFailed(err) => assert_eq!(err.stage, Stage::BranchName),
        other => panic!("expected check failure, got {other:?}"),
    }

    // A configured branch still resolves
    let named = config().with_branch_fallback(BranchFallback::Named(BRANCH.to_owned()));
    assert_eq!(detect(&oracle, &named).await, PollOutcome::UpToDate);
}

#[tokio::test]
async fn test_diverged_history_refuses_to_merge() {
    require_git!();
    let mut fixture = GitFixture::new();
    let local = fixture.diverge_local("local only");
    fixture.push_remote_commit("remote only");
    let oracle = GitOracle::new(fixture.work());

    assert!(detect(&oracle, &config()).await.is_update_available());

    let err = oracle
        .fast_forward_pull(&PullSource::Upstream)
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::Pull);
    assert!(!err.message.is_empty());
    assert_eq!(fixture.work_head(), local);
}

#[tokio::test]
async fn test_unreachable_remote_fails_at_fetch() {
    require_git!();
    let fixture = GitFixture::new();
    let oracle = GitOracle::new(fixture.work());

    let err = oracle.fetch_remote("no-such-remote").await.unwrap_err();
    assert_eq!(err.stage, Stage::Fetch);

    let config = config().with_remote("no-such-remote");
    match detect(&oracle, &config).await {
        PollOutcome::CheckFailed(err) => assert_eq!(err.stage, Stage::Fetch),
        other => panic!("expected fetch failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_not_a_repository() {
    require_git!();
    let dir = tempfile::tempdir().unwrap();
    let oracle = GitOracle::new(dir.path());

    let err = oracle.current_revision().await.unwrap_err();
    assert_eq!(err.stage, Stage::CurrentRevision);
}
