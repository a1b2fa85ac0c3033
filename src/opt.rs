use clap::{Args, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::Upstreams;
use crate::client::{FileDirectory, HttpAnalytics, HttpGitHost, HttpIssueTracker, Upstream};
use crate::error::Error;
use crate::keys::Ttls;
use crate::leaderboard::{LeaderboardConfig, OperatorIdentity};
use crate::warmer::WarmerConfig;

#[derive(Parser, Debug, Clone)]
#[clap(version, about = "Cached aggregation backend for the engineering dashboard")]
pub struct Opt {
    /// Binding address. Note that the cache invalidation endpoint must be
    /// protected using a reverse proxy.
    #[clap(long, default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,
    #[clap(flatten)]
    pub upstream: UpstreamOpt,
    #[clap(flatten)]
    pub operator: OperatorOpt,
    /// JSON file listing the users shown on the leaderboard.
    #[clap(long, env = "DASHBOARD_USERS", default_value = "users.json")]
    pub users: PathBuf,
    /// Users fetched concurrently per leaderboard batch.
    #[clap(long, default_value = "5")]
    pub batch_size: usize,
    /// Seconds between two cache warming runs.
    #[clap(long, default_value = "600")]
    pub warm_interval: u64,
    /// Do not warm caches in the background.
    #[clap(long)]
    pub no_warm: bool,
    /// Analytics project key to keep warm. Repeatable.
    #[clap(long = "analytics-project")]
    pub analytics_projects: Vec<String>,
    /// Maximum number of cache entries.
    #[clap(long, default_value = "10000")]
    pub cache_capacity: u64,
}

#[derive(Args, Debug, Clone)]
pub struct UpstreamOpt {
    /// Base url of the GitHub adapter.
    #[clap(long, env = "GITHUB_ADAPTER_URL", default_value = "http://127.0.0.1:4001")]
    pub github_url: String,
    /// Operator token for GitHub.
    #[clap(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
    /// Base url of the GitLab adapter.
    #[clap(long, env = "GITLAB_ADAPTER_URL", default_value = "http://127.0.0.1:4002")]
    pub gitlab_url: String,
    /// Operator token for GitLab.
    #[clap(long, env = "GITLAB_TOKEN", hide_env_values = true)]
    pub gitlab_token: Option<String>,
    /// Base url of the Jira adapter.
    #[clap(long, env = "JIRA_ADAPTER_URL", default_value = "http://127.0.0.1:4003")]
    pub jira_url: String,
    /// Operator personal access token for Jira.
    #[clap(long, env = "JIRA_PAT", hide_env_values = true)]
    pub jira_pat: Option<String>,
    /// Base url of the analytics adapter.
    #[clap(long, env = "ANALYTICS_ADAPTER_URL", default_value = "http://127.0.0.1:4004")]
    pub analytics_url: String,
    #[clap(long, env = "ANALYTICS_TOKEN", hide_env_values = true)]
    pub analytics_token: Option<String>,
}

impl UpstreamOpt {
    pub fn build(&self, users: PathBuf) -> Result<Upstreams, Error> {
        Ok(Upstreams {
            github: Arc::new(HttpGitHost(Upstream::new(
                "github",
                &self.github_url,
                self.github_token.clone(),
            )?)),
            gitlab: Arc::new(HttpGitHost(Upstream::new(
                "gitlab",
                &self.gitlab_url,
                self.gitlab_token.clone(),
            )?)),
            jira: Arc::new(HttpIssueTracker(Upstream::new(
                "jira",
                &self.jira_url,
                self.jira_pat.clone(),
            )?)),
            analytics: Arc::new(HttpAnalytics(Upstream::new(
                "analytics",
                &self.analytics_url,
                self.analytics_token.clone(),
            )?)),
            directory: Arc::new(FileDirectory::new(users)),
        })
    }
}

/// Who the operator tokens belong to.
#[derive(Args, Debug, Clone)]
pub struct OperatorOpt {
    #[clap(long, env = "GITHUB_USERNAME")]
    pub github_username: Option<String>,
    #[clap(long, env = "GITLAB_USERNAME")]
    pub gitlab_username: Option<String>,
    #[clap(long, env = "JIRA_EMAIL")]
    pub jira_email: Option<String>,
}

impl OperatorOpt {
    pub fn identity(&self) -> OperatorIdentity {
        OperatorIdentity {
            github: self.github_username.clone(),
            gitlab: self.gitlab_username.clone(),
            jira_email: self.jira_email.clone(),
        }
    }
}

impl Opt {
    pub fn leaderboard_config(&self) -> LeaderboardConfig {
        LeaderboardConfig {
            batch_size: self.batch_size.max(1),
            ..LeaderboardConfig::default()
        }
    }

    pub fn warmer_config(&self) -> WarmerConfig {
        WarmerConfig {
            interval: Duration::from_secs(self.warm_interval.max(1)),
            ttl: Ttls::default(),
            analytics_projects: self.analytics_projects.clone(),
            ..WarmerConfig::default()
        }
    }
}
