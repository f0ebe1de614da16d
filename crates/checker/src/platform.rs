// SPDX-FileCopyrightText: 2026 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

mod ctfd;
pub mod publish;

pub use ctfd::CtfdClient;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Platform answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Hidden,
    Visible,
}

/// A scored item as created on the platform
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NewChallenge {
    pub name: String,
    pub category: String,
    pub description: String,
    pub value: u32,
    pub state: Visibility,
}

/// The three calls needed to publish a challenge.
#[async_trait::async_trait]
pub trait ScoringPlatform: Send + Sync {
    /// Creates a scored item and returns its platform id.
    async fn create_challenge(&self, challenge: &NewChallenge) -> Result<u64, PlatformError>;
    async fn attach_flag(&self, challenge_id: u64, flag: &str) -> Result<(), PlatformError>;
    async fn attach_file(&self, challenge_id: u64, path: &Path) -> Result<(), PlatformError>;
}
