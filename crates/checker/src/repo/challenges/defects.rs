// SPDX-FileCopyrightText: 2026 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::PathBuf;

use thiserror::Error;

/// A configuration problem found while building or validating the tree.
///
/// None of these abort an invocation. The affected entity is skipped or
/// merely flagged, and the defect is printed in strict mode.
#[derive(Debug, Error)]
pub enum Defect {
    #[error("Failed to load {path}: {reason}")]
    LoadFailed { path: PathBuf, reason: String },
    #[error("Failed to walk challenge directory: {reason}")]
    WalkFailed { reason: String },
    #[error("Malformed directory {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("Duplicate id {id} in {path} (first defined in {first})")]
    DuplicateIdentity {
        id: String,
        path: PathBuf,
        first: PathBuf,
    },
    #[error("Challenge {challenge} is hosted but has no {script} script")]
    MissingScript { challenge: String, script: String },
    #[error("Challenge {challenge} is hosted but has no test harness")]
    MissingHarness { challenge: String },
    #[error("Orphaned challenge {challenge}: no category in {path}")]
    Orphaned { challenge: String, path: PathBuf },
    #[error("Missing writeup for {challenge}: {path}")]
    MissingWriteup { challenge: String, path: PathBuf },
    #[error("Id {id} of {name} is not a UUID")]
    InvalidIdentity { id: String, name: String },
    #[error("Flag found in handout of {challenge}: {path}:{line}")]
    FlagInHandout {
        challenge: String,
        path: PathBuf,
        line: usize,
    },
}

/// Formats an error together with all of its sources, one per line.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        out.push_str("\n  caused by: ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}
