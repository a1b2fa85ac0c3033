//! Mock adapters with call counters, shared by the unit tests.

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsValue};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::adapter::{Analytics, GitHost, IssueTracker, UserDirectory, Upstreams};
use crate::error::Error;
use crate::model::{
    Credentials, GitAccount, GitStats, JiraStats, MonthlyCount, ReviewStats, UserIdentity, Velocity,
    WorkItem,
};
use crate::range::DateRange;

/// One adapter call as seen by a fault or delay hook.
pub struct Call {
    /// Zero-based index of this call among calls to the same method.
    pub n: usize,
    pub login: Option<String>,
    pub range: DateRange,
}

type Fault = Box<dyn Fn(&Call) -> Option<Error> + Send + Sync>;
type Delay = Box<dyn Fn(&Call) -> Duration + Send + Sync>;

#[derive(Default)]
struct Hooks {
    stats: Mutex<Option<Fault>>,
    reviews: Mutex<Option<Fault>>,
    listing: Mutex<Option<Fault>>,
    delay: Mutex<Option<Delay>>,
}

impl Hooks {
    fn fault(slot: &Mutex<Option<Fault>>, call: &Call) -> Option<Error> {
        slot.lock().unwrap().as_ref().and_then(|f| f(call))
    }

    async fn pause(&self, call: &Call) {
        let delay = self.delay.lock().unwrap().as_ref().map(|f| f(call));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn enter(counter: &AtomicUsize, range: &DateRange, creds: Option<&Credentials>) -> Call {
    Call {
        n: counter.fetch_add(1, Ordering::SeqCst),
        login: creds.map(|c| c.login.clone()),
        range: *range,
    }
}

#[derive(Default)]
pub struct MockGitHost {
    stats_calls: AtomicUsize,
    review_calls: AtomicUsize,
    item_calls: AtomicUsize,
    logins: Mutex<Vec<String>>,
    hooks: Hooks,
}

impl MockGitHost {
    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub fn review_calls(&self) -> usize {
        self.review_calls.load(Ordering::SeqCst)
    }

    pub fn item_calls(&self) -> usize {
        self.item_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.stats_calls() + self.review_calls() + self.item_calls()
    }

    /// Logins seen by `stats` and `review_comments`, in call order.
    pub fn logins(&self) -> Vec<String> {
        self.logins.lock().unwrap().clone()
    }

    pub fn fail_stats(&self, f: impl Fn(&Call) -> Option<Error> + Send + Sync + 'static) {
        *self.hooks.stats.lock().unwrap() = Some(Box::new(f));
    }

    pub fn fail_reviews(&self, f: impl Fn(&Call) -> Option<Error> + Send + Sync + 'static) {
        *self.hooks.reviews.lock().unwrap() = Some(Box::new(f));
    }

    pub fn fail_items(&self, f: impl Fn(&Call) -> Option<Error> + Send + Sync + 'static) {
        *self.hooks.listing.lock().unwrap() = Some(Box::new(f));
    }

    pub fn delay(&self, f: impl Fn(&Call) -> Duration + Send + Sync + 'static) {
        *self.hooks.delay.lock().unwrap() = Some(Box::new(f));
    }

    fn remember(&self, call: &Call) {
        if let Some(login) = &call.login {
            self.logins.lock().unwrap().push(login.clone());
        }
    }
}

#[async_trait]
impl GitHost for MockGitHost {
    async fn stats(&self, range: &DateRange, creds: Option<&Credentials>) -> Result<GitStats, Error> {
        let call = enter(&self.stats_calls, range, creds);
        self.remember(&call);
        self.hooks.pause(&call).await;
        if let Some(err) = Hooks::fault(&self.hooks.stats, &call) {
            return Err(err);
        }
        Ok(GitStats {
            total: Some(4),
            created: Some(3),
            monthly: vec![MonthlyCount {
                month: "2025-09".to_owned(),
                count: 3,
            }],
            ..GitStats::default()
        })
    }

    async fn review_comments(
        &self,
        range: &DateRange,
        creds: Option<&Credentials>,
    ) -> Result<ReviewStats, Error> {
        let call = enter(&self.review_calls, range, creds);
        self.remember(&call);
        self.hooks.pause(&call).await;
        if let Some(err) = Hooks::fault(&self.hooks.reviews, &call) {
            return Err(err);
        }
        Ok(ReviewStats {
            reviews: 2,
            comments: 5,
            extra: Map::new(),
        })
    }

    async fn work_items(&self, range: &DateRange) -> Result<Vec<WorkItem>, Error> {
        let call = enter(&self.item_calls, range, None);
        if let Some(err) = Hooks::fault(&self.hooks.listing, &call) {
            return Err(err);
        }
        Ok(vec![item("1", Some("API")), item("2", Some("WEB"))])
    }
}

#[derive(Default)]
pub struct MockIssueTracker {
    stats_calls: AtomicUsize,
    issue_calls: AtomicUsize,
    ctoi_calls: AtomicUsize,
    hooks: Hooks,
}

impl MockIssueTracker {
    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub fn issue_calls(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }

    pub fn ctoi_calls(&self) -> usize {
        self.ctoi_calls.load(Ordering::SeqCst)
    }

    pub fn fail_stats(&self, f: impl Fn(&Call) -> Option<Error> + Send + Sync + 'static) {
        *self.hooks.stats.lock().unwrap() = Some(Box::new(f));
    }

    pub fn fail_issues(&self, f: impl Fn(&Call) -> Option<Error> + Send + Sync + 'static) {
        *self.hooks.listing.lock().unwrap() = Some(Box::new(f));
    }
}

#[async_trait]
impl IssueTracker for MockIssueTracker {
    async fn stats(&self, range: &DateRange, creds: Option<&Credentials>) -> Result<JiraStats, Error> {
        let call = enter(&self.stats_calls, range, creds);
        self.hooks.pause(&call).await;
        if let Some(err) = Hooks::fault(&self.hooks.stats, &call) {
            return Err(err);
        }
        Ok(JiraStats {
            total: Some(10),
            resolved: Some(8),
            story_points: Some(21.0),
            velocity: Some(Velocity {
                average_velocity: Some(7.0),
                combined_average_velocity: None,
            }),
            ..JiraStats::default()
        })
    }

    async fn issues(&self, range: &DateRange) -> Result<Vec<WorkItem>, Error> {
        let call = enter(&self.issue_calls, range, None);
        if let Some(err) = Hooks::fault(&self.hooks.listing, &call) {
            return Err(err);
        }
        Ok(vec![item("ENG-1", Some("API"))])
    }

    async fn ctoi_stats(&self, range: &DateRange) -> Result<JsValue, Error> {
        enter(&self.ctoi_calls, range, None);
        Ok(json!({ "fixed": 1, "participated": 2 }))
    }
}

#[derive(Default)]
pub struct MockAnalytics {
    project_calls: AtomicUsize,
    window_calls: AtomicUsize,
    failing_projects: Mutex<Vec<String>>,
}

impl MockAnalytics {
    pub fn project_calls(&self) -> usize {
        self.project_calls.load(Ordering::SeqCst)
    }

    pub fn window_calls(&self) -> usize {
        self.window_calls.load(Ordering::SeqCst)
    }

    pub fn fail_project(&self, key: &str) {
        self.failing_projects.lock().unwrap().push(key.to_owned());
    }
}

#[async_trait]
impl Analytics for MockAnalytics {
    async fn project(&self, project_key: &str) -> Result<JsValue, Error> {
        self.project_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_projects.lock().unwrap().iter().any(|k| k == project_key) {
            return Err(Error::Upstream(format!("no report suite for {project_key}")));
        }
        Ok(json!({ "project": project_key, "clicks": 12 }))
    }

    async fn rolling_window(&self, days: u32) -> Result<JsValue, Error> {
        self.window_calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "days": days, "clicks": 40 }))
    }
}

#[derive(Default)]
pub struct MockDirectory {
    users: Mutex<Vec<UserIdentity>>,
    calls: AtomicUsize,
}

impl MockDirectory {
    pub fn set_users(&self, users: Vec<UserIdentity>) {
        *self.users.lock().unwrap() = users;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserDirectory for MockDirectory {
    async fn users(&self) -> Result<Vec<UserIdentity>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.users.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct Mocks {
    pub github: Arc<MockGitHost>,
    pub gitlab: Arc<MockGitHost>,
    pub jira: Arc<MockIssueTracker>,
    pub analytics: Arc<MockAnalytics>,
    pub directory: Arc<MockDirectory>,
}

impl Mocks {
    /// Upstream calls made against the three stats services.
    pub fn stats_traffic(&self) -> usize {
        self.github.calls() + self.gitlab.calls() + self.jira.stats_calls()
    }
}

pub fn upstreams(mocks: &Mocks) -> Upstreams {
    Upstreams {
        github: mocks.github.clone(),
        gitlab: mocks.gitlab.clone(),
        jira: mocks.jira.clone(),
        analytics: mocks.analytics.clone(),
        directory: mocks.directory.clone(),
    }
}

pub fn user(id: &str, github: Option<&str>, gitlab: Option<&str>) -> UserIdentity {
    let account = |username: &str| GitAccount {
        username: username.to_owned(),
        token: None,
    };
    UserIdentity {
        id: id.to_owned(),
        name: None,
        github: github.map(account),
        gitlab: gitlab.map(account),
        jira: None,
        level: None,
    }
}

pub fn item(id: &str, project: Option<&str>) -> WorkItem {
    WorkItem {
        id: id.to_owned(),
        title: format!("item {id}"),
        project: project.map(str::to_owned),
        state: None,
        url: None,
        created_at: None,
        extra: Map::new(),
    }
}

pub fn rate_limited(service: &'static str) -> Error {
    Error::Status {
        service,
        status: 429,
    }
}
