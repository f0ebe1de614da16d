// SPDX-FileCopyrightText: 2026 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::PathBuf;

use crate::platform::{NewChallenge, ScoringPlatform, Visibility};
use crate::repo::challenges::Challenge;
use crate::utils::substitute_placeholders;

/// One independently scored item. Challenges with several flags are split
/// into one part per flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPart {
    pub name: String,
    pub flag: String,
}

pub fn upload_parts(challenge: &Challenge) -> Vec<UploadPart> {
    if challenge.flags.len() == 1 {
        return challenge
            .flag_values()
            .map(|flag| UploadPart {
                name: challenge.name.clone(),
                flag: flag.to_string(),
            })
            .collect();
    }
    challenge
        .flag_values()
        .enumerate()
        .map(|(idx, flag)| UploadPart {
            name: format!("{} p{}", challenge.name, idx + 1),
            flag: flag.to_string(),
        })
        .collect()
}

/// Description shown to players, with connection hints for hosted challenges.
pub fn render_description(challenge: &Challenge, public_host: &str) -> String {
    let mut description = challenge.description.trim_end().to_string();
    if !challenge.hosted || challenge.connection_strings.is_empty() {
        return description;
    }
    if !description.is_empty() {
        description.push_str("\n\n");
    }
    for template in &challenge.connection_strings {
        description.push('`');
        description.push_str(&substitute_placeholders(
            template,
            public_host,
            challenge.port,
        ));
        description.push_str("`\n");
    }
    description
}

/// What happened to each sub-step of one part.
///
/// `flag` is `None` when the item could not be created, `files` is empty
/// when the flag could not be attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartReport {
    pub name: String,
    pub created: Result<u64, String>,
    pub flag: Option<Result<(), String>>,
    pub files: Vec<(PathBuf, Result<(), String>)>,
}

impl PartReport {
    pub fn succeeded(&self) -> bool {
        self.created.is_ok()
            && matches!(self.flag, Some(Ok(())))
            && self.files.iter().all(|(_, result)| result.is_ok())
    }
}

pub struct Publisher<'a> {
    platform: &'a dyn ScoringPlatform,
    public_host: String,
    visibility: Visibility,
}

impl<'a> Publisher<'a> {
    pub fn new(platform: &'a dyn ScoringPlatform, public_host: &str, visibility: Visibility) -> Self {
        Publisher {
            platform,
            public_host: public_host.to_string(),
            visibility,
        }
    }

    /// Uploads every part of `challenge`.
    ///
    /// Nothing is rolled back: a part that fails half way stays on the
    /// platform, and the report says which step to retry.
    pub async fn publish(&self, challenge: &Challenge, category: &str) -> Vec<PartReport> {
        let description = render_description(challenge, &self.public_host);
        let files = self.handout_files(challenge);
        let mut reports = vec![];
        for part in upload_parts(challenge) {
            reports.push(self.publish_part(challenge, &part, category, &description, &files).await);
        }
        reports
    }

    /// Regular files of the handout, symlinks and the like are skipped.
    fn handout_files(&self, challenge: &Challenge) -> Vec<PathBuf> {
        let handout_dir = challenge.handout_path();
        challenge
            .handouts
            .iter()
            .map(|relative| handout_dir.join(relative))
            .filter(|path| {
                let regular = std::fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_file());
                if !regular {
                    tracing::debug!("Not uploading {}, not a regular file", path.display());
                }
                regular
            })
            .collect()
    }

    async fn publish_part(
        &self,
        challenge: &Challenge,
        part: &UploadPart,
        category: &str,
        description: &str,
        files: &[PathBuf],
    ) -> PartReport {
        let mut report = PartReport {
            name: part.name.clone(),
            created: Err(String::new()),
            flag: None,
            files: vec![],
        };

        let new_challenge = NewChallenge {
            name: part.name.clone(),
            category: category.to_string(),
            description: description.to_string(),
            value: challenge.value,
            state: self.visibility,
        };
        let id = match self.platform.create_challenge(&new_challenge).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Failed to create {}: {}", part.name, e);
                report.created = Err(e.to_string());
                return report;
            }
        };
        tracing::info!("Created {} with id {}", part.name, id);
        report.created = Ok(id);

        if let Err(e) = self.platform.attach_flag(id, &part.flag).await {
            tracing::error!("Failed to attach flag to {}: {}", part.name, e);
            report.flag = Some(Err(e.to_string()));
            return report;
        }
        report.flag = Some(Ok(()));

        for file in files {
            let result = self.platform.attach_file(id, file).await.map_err(|e| {
                tracing::error!(
                    "Failed to attach {} to {}: {}",
                    file.display(),
                    part.name,
                    e
                );
                e.to_string()
            });
            report.files.push((file.clone(), result));
        }
        report
    }
}
