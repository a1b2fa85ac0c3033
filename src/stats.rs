use futures::future::OptionFuture;
use itertools::Itertools;
use log::warn;
use std::collections::BTreeMap;

use crate::adapter::Upstreams;
use crate::error::Error;
use crate::model::{CombinedStats, Credentials, ProjectRollup, Source, UserIdentity, WorkItem};
use crate::range::DateRange;

/// Which login each service is queried as.
#[derive(Debug, Clone)]
pub enum Logins {
    /// The process-wide operator identity, on every service.
    Operator,
    /// Per-user logins; a service without one is not queried.
    User {
        github: Option<Credentials>,
        gitlab: Option<Credentials>,
        jira: Option<Credentials>,
    },
}

impl Logins {
    pub fn of(user: &UserIdentity) -> Logins {
        Logins::User {
            github: user.github_credentials(),
            gitlab: user.gitlab_credentials(),
            jira: user.jira_credentials(),
        }
    }

    // Outer `None`: skip the service. Inner `None`: operator credentials.
    fn github(&self) -> Option<Option<&Credentials>> {
        match self {
            Logins::Operator => Some(None),
            Logins::User { github, .. } => github.as_ref().map(Some),
        }
    }

    fn gitlab(&self) -> Option<Option<&Credentials>> {
        match self {
            Logins::Operator => Some(None),
            Logins::User { gitlab, .. } => gitlab.as_ref().map(Some),
        }
    }

    fn jira(&self) -> Option<Option<&Credentials>> {
        match self {
            Logins::Operator => Some(None),
            Logins::User { jira, .. } => jira.as_ref().map(Some),
        }
    }
}

/// Outcome of a combined fetch: whatever succeeded, the per-service
/// failures, and whether any of them was a rate limit.
#[derive(Debug, Default)]
pub struct Settled {
    pub stats: CombinedStats,
    pub rate_limited: bool,
}

impl Settled {
    fn record<T>(&mut self, source: Source, outcome: Option<Result<T, Error>>) -> Option<T> {
        match outcome? {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("{} fetch failed: {}", source.name(), err);
                self.rate_limited |= err.is_rate_limited();
                self.stats.errors.entry(source).or_insert_with(|| err.to_string());
                None
            }
        }
    }

    /// A failed review-comment call is only reported for a service that has
    /// no stats either.
    fn record_reviews<T>(
        &mut self,
        source: Source,
        outcome: Option<Result<T, Error>>,
        has_stats: bool,
    ) -> Option<T> {
        match outcome? {
            Ok(value) => Some(value),
            Err(err) if has_stats => {
                warn!("{} review comments failed: {}", source.name(), err);
                self.rate_limited |= err.is_rate_limited();
                None
            }
            Err(err) => self.record(source, Some(Err(err))),
        }
    }

    /// True when at least one service returned stats.
    pub fn has_data(&self) -> bool {
        self.stats.github.is_some() || self.stats.gitlab.is_some() || self.stats.jira.is_some()
    }

    /// The stats, unless every service failed.
    pub fn into_result(self) -> Result<CombinedStats, Error> {
        if self.has_data() || self.stats.errors.is_empty() {
            return Ok(self.stats);
        }
        if self.rate_limited {
            return Err(Error::Status {
                service: "upstream",
                status: 429,
            });
        }
        Err(Error::Upstream(self.stats.errors.values().join("; ")))
    }
}

/// Fetches stats from all three services plus review comments from both git
/// hosts, concurrently. One service failing never affects the others.
pub async fn fetch_combined(upstreams: &Upstreams, range: &DateRange, logins: &Logins) -> Settled {
    let github = logins.github();
    let gitlab = logins.gitlab();
    let jira = logins.jira();

    let (github_stats, gitlab_stats, jira_stats, github_reviews, gitlab_reviews) = tokio::join!(
        OptionFuture::from(github.map(|creds| upstreams.github.stats(range, creds))),
        OptionFuture::from(gitlab.map(|creds| upstreams.gitlab.stats(range, creds))),
        OptionFuture::from(jira.map(|creds| upstreams.jira.stats(range, creds))),
        OptionFuture::from(github.map(|creds| upstreams.github.review_comments(range, creds))),
        OptionFuture::from(gitlab.map(|creds| upstreams.gitlab.review_comments(range, creds))),
    );

    let mut settled = Settled::default();
    settled.stats.github = settled.record(Source::Github, github_stats);
    settled.stats.gitlab = settled.record(Source::Gitlab, gitlab_stats);
    settled.stats.jira = settled.record(Source::Jira, jira_stats);
    let (has_github, has_gitlab) = (settled.stats.github.is_some(), settled.stats.gitlab.is_some());
    settled.stats.review_stats.github = settled.record_reviews(Source::Github, github_reviews, has_github);
    settled.stats.review_stats.gitlab = settled.record_reviews(Source::Gitlab, gitlab_reviews, has_gitlab);
    settled
}

const UNASSIGNED: &str = "unassigned";

/// Per-project counts across pull requests, merge requests and issues,
/// busiest project first.
pub fn project_rollup(prs: &[WorkItem], mrs: &[WorkItem], issues: &[WorkItem]) -> Vec<ProjectRollup> {
    let mut projects = BTreeMap::new();
    for item in prs {
        bump(&mut projects, item).pull_requests += 1;
    }
    for item in mrs {
        bump(&mut projects, item).merge_requests += 1;
    }
    for item in issues {
        bump(&mut projects, item).issues += 1;
    }
    projects
        .into_values()
        .sorted_by(|a, b| b.total().cmp(&a.total()).then_with(|| a.project.cmp(&b.project)))
        .collect()
}

fn bump<'a, 'i>(
    projects: &'a mut BTreeMap<&'i str, ProjectRollup>,
    item: &'i WorkItem,
) -> &'a mut ProjectRollup {
    let name = item.project.as_deref().unwrap_or(UNASSIGNED);
    projects.entry(name).or_insert_with(|| ProjectRollup {
        project: name.to_owned(),
        ..ProjectRollup::default()
    })
}
