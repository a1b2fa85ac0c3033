//! Contract between the aggregation core and the per-service adapters.
//!
//! `None` credentials mean the operator identity configured for the process.
//! Adapters report quota exhaustion as a 429 [`Error::Status`] (or any error
//! whose message mentions 429) so rate-limit detection stays adapter-agnostic.

use async_trait::async_trait;
use serde_json::Value as JsValue;
use std::sync::Arc;

use crate::error::Error;
use crate::model::{Credentials, GitStats, JiraStats, ReviewStats, UserIdentity, WorkItem};
use crate::range::DateRange;

/// GitHub or GitLab.
#[async_trait]
pub trait GitHost: Send + Sync {
    async fn stats(&self, range: &DateRange, creds: Option<&Credentials>) -> Result<GitStats, Error>;

    async fn review_comments(
        &self,
        range: &DateRange,
        creds: Option<&Credentials>,
    ) -> Result<ReviewStats, Error>;

    /// Pull requests or merge requests of the operator over `range`.
    async fn work_items(&self, range: &DateRange) -> Result<Vec<WorkItem>, Error>;
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn stats(&self, range: &DateRange, creds: Option<&Credentials>) -> Result<JiraStats, Error>;

    async fn issues(&self, range: &DateRange) -> Result<Vec<WorkItem>, Error>;

    async fn ctoi_stats(&self, range: &DateRange) -> Result<JsValue, Error>;
}

#[async_trait]
pub trait Analytics: Send + Sync {
    async fn project(&self, project_key: &str) -> Result<JsValue, Error>;

    /// Report over the last `days` days.
    async fn rolling_window(&self, days: u32) -> Result<JsValue, Error>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn users(&self) -> Result<Vec<UserIdentity>, Error>;
}

/// All upstream collaborators, cheap to clone into spawned tasks.
#[derive(Clone)]
pub struct Upstreams {
    pub github: Arc<dyn GitHost>,
    pub gitlab: Arc<dyn GitHost>,
    pub jira: Arc<dyn IssueTracker>,
    pub analytics: Arc<dyn Analytics>,
    pub directory: Arc<dyn UserDirectory>,
}
