use futures::future::join_all;
use itertools::Itertools;
use log::{debug, error, info, warn};
use moka::future::Cache;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};

use crate::adapter::Upstreams;
use crate::cache::TtlCache;
use crate::keys;
use crate::model::{CombinedStats, LeaderboardEntry, UserIdentity};
use crate::range::DateRange;
use crate::stats::{self, Logins};

#[derive(Debug, Clone)]
pub struct LeaderboardConfig {
    pub batch_size: usize,
    /// Pause before every batch after the first.
    pub batch_delay: Duration,
    /// Start offset between users of one batch.
    pub stagger: Duration,
    pub user_timeout: Duration,
    pub ttl: Duration,
}

impl Default for LeaderboardConfig {
    fn default() -> LeaderboardConfig {
        LeaderboardConfig {
            batch_size: 5,
            batch_delay: Duration::from_millis(2000),
            stagger: Duration::from_millis(100),
            user_timeout: Duration::from_secs(30),
            ttl: Duration::from_secs(300),
        }
    }
}

/// The identity whose credentials come from the process configuration.
#[derive(Debug, Clone, Default)]
pub struct OperatorIdentity {
    pub github: Option<String>,
    pub gitlab: Option<String>,
    pub jira_email: Option<String>,
}

impl OperatorIdentity {
    pub fn matches(&self, user: &UserIdentity) -> bool {
        fn same(ours: &Option<String>, theirs: Option<&str>) -> bool {
            matches!((ours, theirs), (Some(a), Some(b)) if a.eq_ignore_ascii_case(b))
        }
        same(&self.github, user.github.as_ref().map(|a| a.username.as_str()))
            || same(&self.gitlab, user.gitlab.as_ref().map(|a| a.username.as_str()))
            || same(&self.jira_email, user.jira.as_ref().map(|a| a.email.as_str()))
    }
}

/// Set once an upstream reports a 429. Work already started finishes; no
/// new batch or warm step starts afterwards.
#[derive(Debug, Default)]
pub struct RateLimit {
    tripped: AtomicBool,
}

impl RateLimit {
    /// Returns true for the call that tripped it.
    pub fn trip(&self) -> bool {
        !self.tripped.swap(true, Ordering::SeqCst)
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

pub struct LeaderboardFetcher {
    cache: Arc<TtlCache>,
    upstreams: Upstreams,
    operator: OperatorIdentity,
    config: LeaderboardConfig,
    /// One lock per leaderboard key, held for the whole fetch.
    in_flight: Cache<String, Arc<Mutex<()>>>,
}

impl LeaderboardFetcher {
    pub fn new(
        cache: Arc<TtlCache>,
        upstreams: Upstreams,
        operator: OperatorIdentity,
        config: LeaderboardConfig,
    ) -> LeaderboardFetcher {
        let in_flight: Cache<String, Arc<Mutex<()>>> = Cache::builder()
            .max_capacity(1_000)
            .time_to_idle(Duration::from_secs(10 * 60))
            .build();
        LeaderboardFetcher {
            cache,
            upstreams,
            operator,
            config,
            in_flight,
        }
    }

    /// Stats of every user over `range`, entry `i` belonging to `users[i]`.
    ///
    /// Users are fetched in sequential batches. Once `rate_limit` trips, the
    /// current batch completes and the entries collected so far are returned;
    /// such a partial leaderboard is not cached.
    pub async fn fetch(
        &self,
        users: &[UserIdentity],
        range: &DateRange,
        skip_cache: bool,
        rate_limit: &Arc<RateLimit>,
    ) -> Vec<LeaderboardEntry> {
        let key = keys::leaderboard(users.iter().map(|u| u.id.as_str()), range);
        if !skip_cache {
            if let Some(cached) = self.cached(&key, users).await {
                return cached;
            }
        }
        // Concurrent callers for the same users wait here; once the first
        // one has cached its result the others read it.
        let lock = self.in_flight.get_with(key.clone(), async { Arc::default() }).await;
        let _guard = lock.lock().await;
        if !skip_cache {
            if let Some(cached) = self.cached(&key, users).await {
                return cached;
            }
        }

        let started = Instant::now();
        let mut entries = Vec::with_capacity(users.len());
        for (n, batch) in users.chunks(self.config.batch_size.max(1)).enumerate() {
            if rate_limit.is_tripped() {
                warn!(
                    "rate limited, leaderboard stops at {}/{} users",
                    entries.len(),
                    users.len()
                );
                break;
            }
            if n > 0 {
                sleep(self.config.batch_delay).await;
            }
            let batch_entries = join_all(
                batch
                    .iter()
                    .enumerate()
                    .map(|(i, user)| self.fetch_user(user, i, range, rate_limit)),
            )
            .await;
            entries.extend(batch_entries);
        }

        if rate_limit.is_tripped() {
            return entries;
        }
        info!(
            "leaderboard of {} users for {} fetched in {:?}",
            entries.len(),
            range,
            started.elapsed()
        );
        self.cache.set(key, &entries, self.config.ttl).await;
        entries
    }

    /// The cached leaderboard under `key`, entry `i` belonging to `users[i]`.
    async fn cached(&self, key: &str, users: &[UserIdentity]) -> Option<Vec<LeaderboardEntry>> {
        let cached = self.cache.get::<Vec<LeaderboardEntry>>(key).await?;
        let mut by_id = cached
            .into_iter()
            .map(|entry| (entry.user.id.clone(), entry))
            .into_group_map();
        let entries: Option<Vec<_>> = users
            .iter()
            .map(|user| by_id.get_mut(&user.id).and_then(Vec::pop))
            .collect();
        match entries {
            Some(entries) => {
                debug!("leaderboard cache hit for {} users", entries.len());
                Some(entries)
            }
            None => {
                warn!("cached leaderboard {} does not match its users", key);
                None
            }
        }
    }

    async fn fetch_user(
        &self,
        user: &UserIdentity,
        index: usize,
        range: &DateRange,
        rate_limit: &Arc<RateLimit>,
    ) -> LeaderboardEntry {
        if self.operator.matches(user) && !user.has_token_override() {
            if let Some(stats) = self.cache.get::<CombinedStats>(&keys::stats(range)).await {
                debug!("{} is the operator, reusing cached stats", user.id);
                return LeaderboardEntry::from_stats(user.summary(), stats);
            }
        }

        sleep(self.config.stagger * index as u32).await;
        // Detached so that a timeout only stops the waiting; the request runs
        // to completion and its result is dropped.
        let task = tokio::spawn(fetch_one(
            self.upstreams.clone(),
            user.clone(),
            *range,
            rate_limit.clone(),
        ));
        match timeout(self.config.user_timeout, task).await {
            Ok(Ok(entry)) => entry,
            Ok(Err(err)) => {
                error!("leaderboard task for {} failed: {}", user.id, err);
                LeaderboardEntry::failed(user.summary(), err.to_string())
            }
            Err(_) => {
                warn!(
                    "{} timed out after {:?}",
                    user.id, self.config.user_timeout
                );
                LeaderboardEntry::failed(user.summary(), "timeout")
            }
        }
    }
}

async fn fetch_one(
    upstreams: Upstreams,
    user: UserIdentity,
    range: DateRange,
    rate_limit: Arc<RateLimit>,
) -> LeaderboardEntry {
    let settled = stats::fetch_combined(&upstreams, &range, &Logins::of(&user)).await;
    if settled.rate_limited && rate_limit.trip() {
        warn!("rate limited while fetching {}, no further batches", user.id);
    }
    LeaderboardEntry::from_stats(user.summary(), settled.stats)
}
