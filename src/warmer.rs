use chrono::{Local, NaiveDate};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::adapter::Upstreams;
use crate::benchmark;
use crate::cache::TtlCache;
use crate::error::Error;
use crate::keys::{self, Ttls};
use crate::leaderboard::{LeaderboardFetcher, RateLimit};
use crate::range::DateRange;
use crate::stats::{self, Logins};

#[derive(Debug, Clone)]
pub struct WarmerConfig {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub ttl: Ttls,
    pub analytics_projects: Vec<String>,
    /// Rolling analytics windows, in days.
    pub analytics_windows: Vec<u32>,
}

impl Default for WarmerConfig {
    fn default() -> WarmerConfig {
        WarmerConfig {
            initial_delay: Duration::from_secs(5),
            interval: Duration::from_secs(10 * 60),
            ttl: Ttls::default(),
            analytics_projects: Vec::new(),
            analytics_windows: vec![7, 30, 90],
        }
    }
}

/// What one warming run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmReport {
    pub ranges: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub leaderboards: usize,
    pub leaderboards_skipped: usize,
    pub rate_limited: bool,
}

impl WarmReport {
    fn record<T>(&mut self, what: &str, rate_limit: &RateLimit, outcome: Result<T, Error>) -> Option<T> {
        match outcome {
            Ok(value) => {
                self.succeeded += 1;
                Some(value)
            }
            Err(err) => {
                self.failed += 1;
                warn!("warming {} failed: {}", what, err);
                if err.is_rate_limited() && rate_limit.trip() {
                    warn!("rate limited, leaderboards skipped for the rest of this run");
                }
                None
            }
        }
    }
}

/// Keeps the dashboard caches populated ahead of requests.
///
/// Strictly best effort: failures are logged and the run moves on. Any
/// entry left cold is filled on its first real request.
pub struct CacheWarmer {
    cache: Arc<TtlCache>,
    upstreams: Upstreams,
    fetcher: Arc<LeaderboardFetcher>,
    config: WarmerConfig,
}

impl CacheWarmer {
    pub fn new(
        cache: Arc<TtlCache>,
        upstreams: Upstreams,
        fetcher: Arc<LeaderboardFetcher>,
        config: WarmerConfig,
    ) -> CacheWarmer {
        CacheWarmer {
            cache,
            upstreams,
            fetcher,
            config,
        }
    }

    /// Runs shortly after start, then on every interval, until aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = Instant::now() + self.config.initial_delay;
            let mut tick = interval_at(start, self.config.interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let started = Instant::now();
                let report = self.run_once().await;
                info!(
                    "cache warmed in {:?}: {} ok, {} failed, {} leaderboards{}",
                    started.elapsed(),
                    report.succeeded,
                    report.failed,
                    report.leaderboards,
                    if report.rate_limited { ", rate limited" } else { "" }
                );
            }
        })
    }

    pub async fn run_once(&self) -> WarmReport {
        self.run_for(Local::now().date_naive()).await
    }

    /// Warms the current fiscal year to date, then the previous fiscal year,
    /// then analytics. Ranges are warmed one after the other.
    pub async fn run_for(&self, today: NaiveDate) -> WarmReport {
        let rate_limit = Arc::new(RateLimit::default());
        let mut report = WarmReport::default();
        let ranges = [
            DateRange::fiscal_year_to_date(today),
            DateRange::previous_fiscal_year(today),
        ];
        for range in ranges.into_iter().flatten() {
            self.warm_range(&range, &rate_limit, &mut report).await;
            report.ranges += 1;
        }
        self.warm_analytics(&rate_limit, &mut report).await;
        report.rate_limited = rate_limit.is_tripped();
        report
    }

    async fn warm_range(&self, range: &DateRange, rate_limit: &Arc<RateLimit>, report: &mut WarmReport) {
        let ttl = &self.config.ttl;
        debug!("warming {}", range);

        let settled = stats::fetch_combined(&self.upstreams, range, &Logins::Operator).await;
        if settled.rate_limited && rate_limit.trip() {
            warn!("rate limited while warming stats for {}", range);
        }
        if let Some(stats) = report.record("stats", rate_limit, settled.into_result()) {
            // sub-endpoints reuse this fetch instead of a second round-trip
            self.cache.set(keys::stats_git(range), &stats.git_only(), ttl.stats).await;
            self.cache.set(keys::stats_jira(range), &stats.jira_only(), ttl.stats).await;
            self.cache.set(keys::stats(range), &stats, ttl.stats).await;
        }

        let prs = report.record("prs", rate_limit, self.upstreams.github.work_items(range).await);
        if let Some(prs) = &prs {
            self.cache.set(keys::prs(range), prs, ttl.lists).await;
        }
        let mrs = report.record("mrs", rate_limit, self.upstreams.gitlab.work_items(range).await);
        if let Some(mrs) = &mrs {
            self.cache.set(keys::mrs(range), mrs, ttl.lists).await;
        }
        let issues = report.record("issues", rate_limit, self.upstreams.jira.issues(range).await);
        if let Some(issues) = &issues {
            self.cache.set(keys::issues(range), issues, ttl.issues).await;
        }
        let ctoi = report.record("ctoi stats", rate_limit, self.upstreams.jira.ctoi_stats(range).await);
        if let Some(ctoi) = &ctoi {
            self.cache.set(keys::ctoi_stats(range), ctoi, ttl.ctoi).await;
        }
        if prs.is_some() || mrs.is_some() || issues.is_some() {
            let rollup = stats::project_rollup(
                prs.as_deref().unwrap_or_default(),
                mrs.as_deref().unwrap_or_default(),
                issues.as_deref().unwrap_or_default(),
            );
            self.cache.set(keys::projects(range), &rollup, ttl.projects).await;
        }

        self.warm_leaderboard(range, rate_limit, report).await;
    }

    async fn warm_leaderboard(&self, range: &DateRange, rate_limit: &Arc<RateLimit>, report: &mut WarmReport) {
        if rate_limit.is_tripped() {
            info!("skipping leaderboard for {}: rate limited", range);
            report.leaderboards_skipped += 1;
            return;
        }
        let Some(users) = report.record("users", rate_limit, self.upstreams.directory.users().await) else {
            return;
        };
        let entries = self.fetcher.fetch(&users, range, true, rate_limit).await;
        if rate_limit.is_tripped() {
            warn!(
                "leaderboard for {} cut short at {}/{} users",
                range,
                entries.len(),
                users.len()
            );
            report.failed += 1;
            return;
        }
        let benchmarks = benchmark::compute(&entries);
        self.cache
            .set(keys::benchmarks(range), &benchmarks, self.config.ttl.benchmarks)
            .await;
        report.leaderboards += 1;
    }

    async fn warm_analytics(&self, rate_limit: &RateLimit, report: &mut WarmReport) {
        let ttl = self.config.ttl.analytics;
        for project in &self.config.analytics_projects {
            let outcome = self.upstreams.analytics.project(project).await;
            if let Some(value) = report.record(project, rate_limit, outcome) {
                self.cache.set(keys::project_analytics(project), &value, ttl).await;
            }
        }
        for days in &self.config.analytics_windows {
            let outcome = self.upstreams.analytics.rolling_window(*days).await;
            if let Some(value) = report.record("analytics window", rate_limit, outcome) {
                self.cache.set(keys::analytics_window(*days), &value, ttl).await;
            }
        }
    }
}
