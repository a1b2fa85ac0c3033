//! Adapters speaking the adapter contract over HTTP: one base URL per
//! service, JSON payloads, the per-user token or PAT as bearer token when
//! given and the operator token otherwise.

use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value as JsValue;
use std::path::PathBuf;
use std::time::Duration;

use crate::adapter::{Analytics, GitHost, IssueTracker, UserDirectory};
use crate::error::Error;
use crate::model::{Credentials, GitStats, JiraStats, ReviewStats, UserIdentity, WorkItem};
use crate::range::DateRange;

pub struct Upstream {
    client: reqwest::Client,
    service: &'static str,
    base: String,
    token: Option<String>,
}

impl Upstream {
    pub fn new(service: &'static str, base: &str, token: Option<String>) -> Result<Upstream, Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("eng-dashboard/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Upstream {
            client,
            service,
            base: base.trim_end_matches('/').to_owned(),
            token,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        range: Option<&DateRange>,
        creds: Option<&Credentials>,
    ) -> Result<T, Error> {
        let url = format!("{}/{}", self.base, path);
        let mut req = self.client.get(&url);
        if let Some(range) = range {
            if let Some(start) = range.start {
                req = req.query(&[("start", start.to_string())]);
            }
            if let Some(end) = range.end {
                req = req.query(&[("end", end.to_string())]);
            }
        }
        if let Some(creds) = creds {
            req = req.query(&[("login", &creds.login)]);
        }
        let token = creds
            .and_then(|c| c.token.as_deref())
            .or(self.token.as_deref());
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        debug!("GET {}", url);
        let res = req.send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(Error::Status {
                service: self.service,
                status: status.as_u16(),
            });
        }
        Ok(res.json().await?)
    }
}

/// GitHub or GitLab behind its adapter endpoint.
pub struct HttpGitHost(pub Upstream);

#[async_trait]
impl GitHost for HttpGitHost {
    async fn stats(&self, range: &DateRange, creds: Option<&Credentials>) -> Result<GitStats, Error> {
        self.0.get("stats", Some(range), creds).await
    }

    async fn review_comments(
        &self,
        range: &DateRange,
        creds: Option<&Credentials>,
    ) -> Result<ReviewStats, Error> {
        self.0.get("review-comments", Some(range), creds).await
    }

    async fn work_items(&self, range: &DateRange) -> Result<Vec<WorkItem>, Error> {
        self.0.get("items", Some(range), None).await
    }
}

pub struct HttpIssueTracker(pub Upstream);

#[async_trait]
impl IssueTracker for HttpIssueTracker {
    async fn stats(&self, range: &DateRange, creds: Option<&Credentials>) -> Result<JiraStats, Error> {
        self.0.get("stats", Some(range), creds).await
    }

    async fn issues(&self, range: &DateRange) -> Result<Vec<WorkItem>, Error> {
        self.0.get("issues", Some(range), None).await
    }

    async fn ctoi_stats(&self, range: &DateRange) -> Result<JsValue, Error> {
        self.0.get("ctoi", Some(range), None).await
    }
}

pub struct HttpAnalytics(pub Upstream);

#[async_trait]
impl Analytics for HttpAnalytics {
    async fn project(&self, project_key: &str) -> Result<JsValue, Error> {
        self.0.get(&format!("projects/{project_key}"), None, None).await
    }

    async fn rolling_window(&self, days: u32) -> Result<JsValue, Error> {
        self.0.get(&format!("rolling/{days}"), None, None).await
    }
}

/// Users listed in a JSON file, re-read on every call so edits apply
/// without a restart.
pub struct FileDirectory {
    path: PathBuf,
}

impl FileDirectory {
    pub fn new(path: PathBuf) -> FileDirectory {
        FileDirectory { path }
    }
}

#[async_trait]
impl UserDirectory for FileDirectory {
    async fn users(&self) -> Result<Vec<UserIdentity>, Error> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
