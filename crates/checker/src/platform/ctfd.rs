// SPDX-FileCopyrightText: 2026 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::Path;

use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::platform::{NewChallenge, PlatformError, ScoringPlatform};

/// Client for the CTFd REST API
pub struct CtfdClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

fn api_url(base_url: &str, path: &str) -> String {
    format!("{}/api/v1/{}", base_url.trim_end_matches('/'), path)
}

#[derive(Serialize)]
struct CreateChallengeBody<'a> {
    #[serde(flatten)]
    challenge: &'a NewChallenge,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CreatedChallenge {
    data: CreatedChallengeData,
}

#[derive(Deserialize)]
struct CreatedChallengeData {
    id: u64,
}

impl CtfdClient {
    pub fn new(url: &str, token: &str) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(CtfdClient {
            client,
            base_url: url.to_string(),
            token: token.to_string(),
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(api_url(&self.base_url, path))
            .header(AUTHORIZATION, format!("Token {}", self.token))
    }

    async fn send(request: reqwest::RequestBuilder) -> Result<reqwest::Response, PlatformError> {
        let resp = request.send().await?;
        if resp.status() != StatusCode::OK {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(PlatformError::Status { status, body });
        }
        Ok(resp)
    }
}

#[async_trait::async_trait]
impl ScoringPlatform for CtfdClient {
    async fn create_challenge(&self, challenge: &NewChallenge) -> Result<u64, PlatformError> {
        let body = CreateChallengeBody {
            challenge,
            kind: "standard",
        };
        let resp = Self::send(self.post("challenges").json(&body)).await?;
        let created: CreatedChallenge = resp.json().await?;
        Ok(created.data.id)
    }

    async fn attach_flag(&self, challenge_id: u64, flag: &str) -> Result<(), PlatformError> {
        let body = json!({
            "challenge": challenge_id,
            "content": flag,
            "type": "static",
        });
        Self::send(self.post("flags").json(&body)).await?;
        Ok(())
    }

    async fn attach_file(&self, challenge_id: u64, path: &Path) -> Result<(), PlatformError> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|source| PlatformError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let form = Form::new()
            .text("challenge", challenge_id.to_string())
            .text("type", "challenge")
            .part("file", Part::bytes(content).file_name(file_name));
        Self::send(self.post("files").multipart(form)).await?;
        Ok(())
    }
}
