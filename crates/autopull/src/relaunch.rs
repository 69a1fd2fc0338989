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

//! Process image replacement

use crate::error::RelaunchError;
use std::convert::Infallible;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Exit status used where the image cannot be replaced in place
#[cfg(not(unix))]
pub const RESTART_EXIT_CODE: i32 = 75;

/// Replaces the running process with a fresh copy of itself.
pub trait Relauncher: Send + Sync {
    /// Only returns when the replacement failed.
    fn relaunch(&self) -> Result<Infallible, RelaunchError>;

    /// What will be executed, for logs
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_owned()
    }
}

/// Re-executes the same binary with the original argument vector.
///
/// On unix this is `execv`: the pid is kept, so anything watching the
/// process sees it carry on rather than exit.
#[derive(Debug, Clone)]
pub struct ExecRelauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ExecRelauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Capture the executable path and argv of this process.
    ///
    /// Call at startup, before the working copy changes underneath us.
    pub fn from_current_process() -> Result<Self, RelaunchError> {
        let program = std::env::current_exe().map_err(RelaunchError::CurrentExe)?;
        Ok(Self::new(program, std::env::args_os().collect()))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }
}

#[cfg(unix)]
impl Relauncher for ExecRelauncher {
    fn describe(&self) -> String {
        self.program.display().to_string()
    }

    fn relaunch(&self) -> Result<Infallible, RelaunchError> {
        use std::ffi::{CString, OsStr};
        use std::os::unix::ffi::OsStrExt;

        fn c_string(value: &OsStr) -> Result<CString, RelaunchError> {
            CString::new(value.as_bytes())
                .map_err(|_| RelaunchError::InvalidArgument(value.to_string_lossy().into_owned()))
        }

        let path = c_string(self.program.as_os_str())?;
        let mut argv = self
            .args
            .iter()
            .map(|arg| c_string(arg))
            .collect::<Result<Vec<_>, _>>()?;
        if argv.is_empty() {
            argv.push(path.clone());
        }

        tracing::info!("Replacing process image with {}", self.program.display());
        nix::unistd::execv(&path, &argv).map_err(|source| RelaunchError::Exec {
            path: self.program.clone(),
            source,
        })
    }
}

#[cfg(not(unix))]
impl Relauncher for ExecRelauncher {
    fn describe(&self) -> String {
        self.program.display().to_string()
    }

    fn relaunch(&self) -> Result<Infallible, RelaunchError> {
        tracing::warn!(
            "In-place exec unavailable, exiting with status {RESTART_EXIT_CODE} so the supervisor restarts {}",
            self.program.display()
        );
        std::process::exit(RESTART_EXIT_CODE)
    }
}
