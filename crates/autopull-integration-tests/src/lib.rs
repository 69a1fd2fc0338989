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

//! Throwaway git repositories for exercising autopull against a real `git`

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

pub const BRANCH: &str = "main";

/// `git` runs on this machine. Tests skip themselves otherwise.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Run git in `dir` and return its trimmed stdout. Panics on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=autopull",
            "-c",
            "user.email=autopull@localhost",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .output()
        .expect("failed to spawn git");

    assert!(
        output.status.success(),
        "git {} failed in {}: {}",
        args.join(" "),
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_owned()
}

/// A bare remote with two clones: `work`, the checkout the server follows,
/// and `publisher`, used to push new commits to the remote.
#[derive(Debug)]
pub struct GitFixture {
    root: TempDir,
    remote: PathBuf,
    work: PathBuf,
    publisher: PathBuf,
    commits: usize,
}

impl GitFixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("failed to create temp dir");
        let remote = root.path().join("remote.git");
        let publisher = root.path().join("publisher");
        let work = root.path().join("work");

        git(root.path(), &["init", "--quiet", "--bare", path_str(&remote)]);
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        git(root.path(), &["init", "--quiet", path_str(&publisher)]);
        git(&publisher, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&publisher, &["remote", "add", "origin", path_str(&remote)]);

        let mut fixture = Self {
            root,
            remote,
            work,
            publisher,
            commits: 0,
        };
        fixture.commit_in_publisher("initial");
        git(&fixture.publisher, &["push", "--quiet", "-u", "origin", BRANCH]);
        git(
            fixture.root.path(),
            &[
                "clone",
                "--quiet",
                path_str(&fixture.remote),
                path_str(&fixture.work),
            ],
        );
        fixture
    }

    /// The checkout the server runs from
    pub fn work(&self) -> &Path {
        &self.work
    }

    pub fn work_head(&self) -> String {
        git(&self.work, &["rev-parse", "HEAD"])
    }

    /// Publish a new commit on the remote's `main` and return its id.
    pub fn push_remote_commit(&mut self, message: &str) -> String {
        self.commit_in_publisher(message);
        git(&self.publisher, &["push", "--quiet", "origin", BRANCH]);
        git(&self.publisher, &["rev-parse", "HEAD"])
    }

    /// Commit in the working copy only, so it no longer fast-forwards.
    pub fn diverge_local(&mut self, message: &str) -> String {
        self.commits += 1;
        fs::write(self.work.join("local.txt"), format!("{message}\n"))
            .expect("failed to write local file");
        git(&self.work, &["add", "-A"]);
        git(&self.work, &["commit", "--quiet", "-m", message]);
        self.work_head()
    }

    pub fn detach_head(&self) {
        git(&self.work, &["checkout", "--quiet", "--detach"]);
    }

    pub fn unset_upstream(&self) {
        git(&self.work, &["branch", "--unset-upstream"]);
    }

    fn commit_in_publisher(&mut self, message: &str) {
        self.commits += 1;
        fs::write(
            self.publisher.join("VERSION"),
            format!("{} {message}\n", self.commits),
        )
        .expect("failed to write VERSION");
        git(&self.publisher, &["add", "-A"]);
        git(&self.publisher, &["commit", "--quiet", "-m", message]);
    }
}

impl Default for GitFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}
