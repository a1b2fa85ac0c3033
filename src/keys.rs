//! Cache key conventions shared by the fetcher, the warmer and the read
//! endpoints. The prefixes are part of the external contract.

use itertools::Itertools;
use std::time::Duration;

use crate::range::DateRange;

pub const STATS: &str = "stats:";
pub const STATS_GIT: &str = "stats-git:";
pub const STATS_JIRA: &str = "stats-jira:";
pub const LEADERBOARD: &str = "leaderboard:";
pub const BENCHMARKS: &str = "benchmarks:";
pub const CTOI_STATS: &str = "ctoi-stats:";
pub const PRS: &str = "prs:";
pub const MRS: &str = "mrs:";
pub const ISSUES: &str = "issues:";
pub const PROJECTS: &str = "projects-v3:";
pub const PROJECT_ANALYTICS: &str = "project-analytics:";
pub const ANALYTICS_WINDOW: &str = "analytics-window:";

/// How long each kind of entry stays fresh. Issues churn faster than the
/// rest.
#[derive(Debug, Clone)]
pub struct Ttls {
    pub stats: Duration,
    pub lists: Duration,
    pub issues: Duration,
    pub projects: Duration,
    pub ctoi: Duration,
    pub benchmarks: Duration,
    pub analytics: Duration,
}

impl Default for Ttls {
    fn default() -> Ttls {
        Ttls {
            stats: Duration::from_secs(15 * 60),
            lists: Duration::from_secs(15 * 60),
            issues: Duration::from_secs(5 * 60),
            projects: Duration::from_secs(15 * 60),
            ctoi: Duration::from_secs(15 * 60),
            benchmarks: Duration::from_secs(5 * 60),
            analytics: Duration::from_secs(30 * 60),
        }
    }
}

pub fn stats(range: &DateRange) -> String {
    format!("{STATS}{range}")
}

pub fn stats_git(range: &DateRange) -> String {
    format!("{STATS_GIT}{range}")
}

pub fn stats_jira(range: &DateRange) -> String {
    format!("{STATS_JIRA}{range}")
}

pub fn benchmarks(range: &DateRange) -> String {
    format!("{BENCHMARKS}{range}")
}

pub fn ctoi_stats(range: &DateRange) -> String {
    format!("{CTOI_STATS}{range}")
}

pub fn prs(range: &DateRange) -> String {
    format!("{PRS}{range}")
}

pub fn mrs(range: &DateRange) -> String {
    format!("{MRS}{range}")
}

pub fn issues(range: &DateRange) -> String {
    format!("{ISSUES}{range}")
}

pub fn projects(range: &DateRange) -> String {
    format!("{PROJECTS}{range}")
}

pub fn project_analytics(project_key: &str) -> String {
    format!("{PROJECT_ANALYTICS}{project_key}")
}

pub fn analytics_window(days: u32) -> String {
    format!("{ANALYTICS_WINDOW}{days}")
}

/// User ids are sorted so the same set of users maps to one entry whatever
/// order the directory returned them in. Commas and backslashes inside an id
/// are escaped.
pub fn leaderboard<'a, I>(user_ids: I, range: &DateRange) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let ids = user_ids.into_iter().sorted().map(escape_id).join(",");
    format!("{LEADERBOARD}{ids}:{range}")
}

fn escape_id(id: &str) -> String {
    id.replace('\\', "\\\\").replace(',', "\\,")
}
