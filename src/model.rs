use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsValue};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;

/// Where a failure came from, as reported in `errors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Github,
    Gitlab,
    Jira,
    General,
}

impl Source {
    pub fn name(self) -> &'static str {
        match self {
            Source::Github => "github",
            Source::Gitlab => "gitlab",
            Source::Jira => "jira",
            Source::General => "general",
        }
    }
}

pub type Errors = BTreeMap<Source, String>;

/// Login handed to an adapter. `token` overrides the operator's token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GitAccount {
    pub username: String,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JiraAccount {
    pub email: String,
    #[serde(default, skip_serializing)]
    pub pat: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserIdentity {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub github: Option<GitAccount>,
    #[serde(default)]
    pub gitlab: Option<GitAccount>,
    #[serde(default)]
    pub jira: Option<JiraAccount>,
    #[serde(default)]
    pub level: Option<String>,
}

impl UserIdentity {
    pub fn github_credentials(&self) -> Option<Credentials> {
        self.github.as_ref().map(|a| Credentials {
            login: a.username.clone(),
            token: a.token.clone(),
        })
    }

    pub fn gitlab_credentials(&self) -> Option<Credentials> {
        self.gitlab.as_ref().map(|a| Credentials {
            login: a.username.clone(),
            token: a.token.clone(),
        })
    }

    pub fn jira_credentials(&self) -> Option<Credentials> {
        self.jira.as_ref().map(|a| Credentials {
            login: a.email.clone(),
            token: a.pat.clone(),
        })
    }

    /// True when any service carries a per-user token or PAT.
    pub fn has_token_override(&self) -> bool {
        self.github.as_ref().is_some_and(|a| a.token.is_some())
            || self.gitlab.as_ref().is_some_and(|a| a.token.is_some())
            || self.jira.as_ref().is_some_and(|a| a.pat.is_some())
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            level: self.level.clone(),
            github: self.github.as_ref().map(|a| a.username.clone()),
            gitlab: self.gitlab.as_ref().map(|a| a.username.clone()),
            jira: self.jira.as_ref().map(|a| a.email.clone()),
        }
    }
}

/// Public part of a user: no tokens.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub name: Option<String>,
    pub level: Option<String>,
    pub github: Option<String>,
    pub gitlab: Option<String>,
    pub jira: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MonthlyCount {
    /// `YYYY-MM`
    pub month: String,
    #[serde(default)]
    pub count: u64,
}

/// Pull request (GitHub) or merge request (GitLab) statistics.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitStats {
    pub total: Option<u64>,
    pub created: Option<u64>,
    pub merged: Option<u64>,
    /// Legacy review count, superseded by [`ReviewStats`].
    pub reviews: Option<u64>,
    /// Legacy review comment count, superseded by [`ReviewStats`].
    pub comments: Option<u64>,
    pub avg_time_to_merge: Option<f64>,
    #[serde(default, alias = "monthlyPRs", alias = "monthlyMRs")]
    pub monthly: Vec<MonthlyCount>,
    #[serde(flatten)]
    pub extra: Map<String, JsValue>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Velocity {
    pub average_velocity: Option<f64>,
    pub combined_average_velocity: Option<f64>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraStats {
    pub total: Option<u64>,
    pub resolved: Option<u64>,
    pub story_points: Option<f64>,
    pub avg_resolution_time: Option<f64>,
    pub ctoi_fixed: Option<u64>,
    pub ctoi_participated: Option<u64>,
    pub velocity: Option<Velocity>,
    #[serde(flatten)]
    pub extra: Map<String, JsValue>,
}

/// Reviews given and review comments written by one login.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ReviewStats {
    #[serde(default)]
    pub reviews: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(flatten)]
    pub extra: Map<String, JsValue>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ReviewBreakdown {
    pub github: Option<ReviewStats>,
    pub gitlab: Option<ReviewStats>,
}

impl ReviewBreakdown {
    pub fn is_empty(&self) -> bool {
        self.github.is_none() && self.gitlab.is_none()
    }
}

/// Everything fetched for one identity over one range.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedStats {
    pub github: Option<GitStats>,
    pub gitlab: Option<GitStats>,
    pub jira: Option<JiraStats>,
    #[serde(default)]
    pub review_stats: ReviewBreakdown,
    #[serde(default)]
    pub errors: Errors,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitComposite {
    pub github: Option<GitStats>,
    pub gitlab: Option<GitStats>,
    #[serde(default)]
    pub review_stats: ReviewBreakdown,
    #[serde(default)]
    pub errors: Errors,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct JiraComposite {
    pub jira: Option<JiraStats>,
    #[serde(default)]
    pub errors: Errors,
}

impl CombinedStats {
    pub fn git_only(&self) -> GitComposite {
        GitComposite {
            github: self.github.clone(),
            gitlab: self.gitlab.clone(),
            review_stats: self.review_stats.clone(),
            errors: self
                .errors
                .iter()
                .filter(|(source, _)| matches!(source, Source::Github | Source::Gitlab))
                .map(|(source, msg)| (*source, msg.clone()))
                .collect(),
        }
    }

    pub fn jira_only(&self) -> JiraComposite {
        JiraComposite {
            jira: self.jira.clone(),
            errors: self
                .errors
                .iter()
                .filter(|(source, _)| **source == Source::Jira)
                .map(|(source, msg)| (*source, msg.clone()))
                .collect(),
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user: UserSummary,
    pub github: Option<GitStats>,
    pub gitlab: Option<GitStats>,
    pub jira: Option<JiraStats>,
    pub review_stats: Option<ReviewBreakdown>,
    #[serde(default)]
    pub errors: Errors,
}

impl LeaderboardEntry {
    pub fn from_stats(user: UserSummary, stats: CombinedStats) -> LeaderboardEntry {
        LeaderboardEntry {
            user,
            github: stats.github,
            gitlab: stats.gitlab,
            jira: stats.jira,
            review_stats: Some(stats.review_stats).filter(|r| !r.is_empty()),
            errors: stats.errors,
        }
    }

    /// An entry with no data and a single `general` error.
    pub fn failed(user: UserSummary, reason: impl Into<String>) -> LeaderboardEntry {
        LeaderboardEntry {
            user,
            github: None,
            gitlab: None,
            jira: None,
            review_stats: None,
            errors: Errors::from([(Source::General, reason.into())]),
        }
    }
}

/// A pull request, merge request or issue as listed by an adapter.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsValue>,
}

// GitHub and Jira hand out string ids, GitLab numeric ones.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRollup {
    pub project: String,
    pub pull_requests: usize,
    pub merge_requests: usize,
    pub issues: usize,
}

impl ProjectRollup {
    pub fn total(&self) -> usize {
        self.pull_requests + self.merge_requests + self.issues
    }
}

/// Peer averages of one group; `None` means no member had data.
#[skip_serializing_none]
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricAverages {
    pub created: Option<f64>,
    pub reviews: Option<f64>,
    pub comments: Option<f64>,
    pub comments_per_month: Option<f64>,
    pub velocity: Option<f64>,
    pub story_points: Option<f64>,
    pub resolved: Option<f64>,
    pub avg_resolution_time: Option<f64>,
    pub ctoi_fixed: Option<f64>,
    pub ctoi_participated: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct Benchmarks {
    pub fte: MetricAverages,
    pub p1: MetricAverages,
    pub p2: MetricAverages,
    pub p3: MetricAverages,
    pub p4: MetricAverages,
}
