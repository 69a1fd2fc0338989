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

//! Structured records of update loop transitions

use crate::error::Stage;
use crate::revision::RevisionId;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UpdateEvent {
    LoopStarted {
        interval_secs: f64,
        remote: String,
    },
    CheckFailed {
        stage: Stage,
        message: String,
    },
    UpdateDetected {
        local: RevisionId,
        remote: RevisionId,
    },
    PullFailed {
        local: RevisionId,
        remote: RevisionId,
        message: String,
    },
    Pulled {
        from: RevisionId,
        to: RevisionId,
    },
    DrainTimedOut {
        error: String,
    },
    Relaunching {
        program: String,
    },
    RelaunchFailed {
        error: String,
    },
    CyclePanicked {
        message: String,
    },
}

impl UpdateEvent {
    fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::CheckFailed { .. }
                | Self::PullFailed { .. }
                | Self::DrainTimedOut { .. }
                | Self::RelaunchFailed { .. }
                | Self::CyclePanicked { .. }
        )
    }
}

/// Emit an update event as a JSON log record.
///
/// Never fails: a record that cannot be serialised is logged by its Debug form.
pub fn report_event(event: &UpdateEvent) {
    let record = serde_json::to_string(event).unwrap_or_else(|_| format!("{event:?}"));
    if event.is_failure() {
        tracing::warn!(target: "autopull::events", "{record}");
    } else {
        tracing::info!(target: "autopull::events", "{record}");
    }
}
