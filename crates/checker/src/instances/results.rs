// SPDX-FileCopyrightText: 2026 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResultError {
    #[error("Test harness output is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Passed,
    Failed(String),
}

/// One named check reported by a test harness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            CheckStatus::Passed => write!(f, "OK   {}", self.name),
            CheckStatus::Failed(message) => write!(f, "FAIL {}: {}", self.name, message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    MissingTests,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
            Verdict::MissingTests => write!(f, "MISSING TESTS"),
        }
    }
}

/// Result of verifying one challenge
#[derive(Debug, Clone, Default)]
pub struct TestReport {
    pub challenge: String,
    /// Checks in the order the harness printed them
    pub checks: Vec<CheckResult>,
    /// Harness stderr and similar problems that do not fail the challenge by themselves
    pub warnings: Vec<String>,
}

impl TestReport {
    pub fn new(challenge: &str) -> Self {
        TestReport {
            challenge: challenge.to_string(),
            ..Default::default()
        }
    }

    /// Passing requires at least one check, and every check to be empty.
    pub fn verdict(&self) -> Verdict {
        if self.checks.is_empty() {
            Verdict::MissingTests
        } else if self
            .checks
            .iter()
            .all(|check| check.status == CheckStatus::Passed)
        {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict() == Verdict::Pass
    }
}

/// Parses the JSON object printed by a test harness.
///
/// Keys are check names. An empty string means the check passed, any other
/// string is the failure message. Values that are not strings count as
/// failures. Empty output parses to no checks at all.
pub fn parse_harness_output(stdout: &str) -> Result<Vec<CheckResult>, ResultError> {
    if stdout.trim().is_empty() {
        return Ok(vec![]);
    }
    let raw: IndexMap<String, serde_json::Value> = serde_json::from_str(stdout.trim())?;
    Ok(raw
        .into_iter()
        .map(|(name, value)| {
            let status = match value {
                serde_json::Value::String(message) if message.is_empty() => CheckStatus::Passed,
                serde_json::Value::String(message) => CheckStatus::Failed(message),
                other => CheckStatus::Failed(format!("unexpected result value {other}")),
            };
            CheckResult { name, status }
        })
        .collect())
}
