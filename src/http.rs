use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Router,
};
use axum_extra::response::ErasedJson;
use chrono::NaiveDate;
use log::{info, warn};
use serde::Deserialize;
use serde_json::Value as JsValue;
use std::sync::Arc;
use thiserror::Error as ThisError;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::adapter::Upstreams;
use crate::benchmark;
use crate::cache::TtlCache;
use crate::error::Error;
use crate::keys::{self, Ttls};
use crate::leaderboard::{LeaderboardFetcher, RateLimit};
use crate::model::{Benchmarks, CombinedStats, GitComposite, JiraComposite, ProjectRollup, WorkItem};
use crate::range::DateRange;
use crate::stats::{self, Logins};

#[derive(ThisError, Debug)]
pub enum HttpResponseError {
    #[error("{0}")]
    HTTP(StatusCode),
    #[error("{0}")]
    Upstream(Arc<Error>),
}

impl From<Arc<Error>> for HttpResponseError {
    fn from(err: Arc<Error>) -> HttpResponseError {
        HttpResponseError::Upstream(err)
    }
}

impl From<Error> for HttpResponseError {
    fn from(err: Error) -> HttpResponseError {
        HttpResponseError::Upstream(Arc::new(err))
    }
}

impl IntoResponse for HttpResponseError {
    fn into_response(self) -> Response {
        match self {
            HttpResponseError::HTTP(sc) => (sc, sc.to_string()).into_response(),
            HttpResponseError::Upstream(err) => {
                let sc = if err.is_rate_limited() {
                    StatusCode::TOO_MANY_REQUESTS
                } else {
                    StatusCode::BAD_GATEWAY
                };
                warn!("{}: {}", sc, err);
                (sc, err.to_string()).into_response()
            }
        }
    }
}

pub fn bad_request() -> HttpResponseError {
    HttpResponseError::HTTP(StatusCode::BAD_REQUEST)
}

type Reply = Result<ErasedJson, HttpResponseError>;

pub struct AppState {
    pub cache: Arc<TtlCache>,
    pub upstreams: Upstreams,
    pub fetcher: Arc<LeaderboardFetcher>,
    pub ttl: Ttls,
}

impl AppState {
    async fn combined(&self, range: &DateRange) -> Result<CombinedStats, Arc<Error>> {
        self.cache
            .get_or_fetch(&keys::stats(range), self.ttl.stats, async {
                stats::fetch_combined(&self.upstreams, range, &Logins::Operator)
                    .await
                    .into_result()
            })
            .await
    }

    async fn prs(&self, range: &DateRange) -> Result<Vec<WorkItem>, Arc<Error>> {
        self.cache
            .get_or_fetch(&keys::prs(range), self.ttl.lists, self.upstreams.github.work_items(range))
            .await
    }

    async fn mrs(&self, range: &DateRange) -> Result<Vec<WorkItem>, Arc<Error>> {
        self.cache
            .get_or_fetch(&keys::mrs(range), self.ttl.lists, self.upstreams.gitlab.work_items(range))
            .await
    }

    async fn issues(&self, range: &DateRange) -> Result<Vec<WorkItem>, Arc<Error>> {
        self.cache
            .get_or_fetch(&keys::issues(range), self.ttl.issues, self.upstreams.jira.issues(range))
            .await
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    #[serde(default)]
    refresh: bool,
}

impl RangeQuery {
    fn range(&self) -> Result<DateRange, HttpResponseError> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start > end => Err(bad_request()),
            (start, end) => Ok(DateRange::new(start, end)),
        }
    }
}

/// Either one exact key, every key under a prefix, or everything.
#[derive(Debug, Default, Deserialize)]
pub struct Invalidate {
    key: Option<String>,
    prefix: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/stats", get(combined_stats))
        .route("/stats/git", get(git_stats))
        .route("/stats/jira", get(jira_stats))
        .route("/leaderboard", get(leaderboard))
        .route("/benchmarks", get(benchmarks))
        .route("/ctoi", get(ctoi))
        .route("/prs", get(prs))
        .route("/mrs", get(mrs))
        .route("/issues", get(issues))
        .route("/projects", get(projects))
        .route("/analytics/:project", get(project_analytics))
        .route("/cache", delete(invalidate))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

async fn root() -> &'static str {
    "eng-dashboard"
}

async fn combined_stats(State(app): State<Arc<AppState>>, Query(q): Query<RangeQuery>) -> Reply {
    let stats = app.combined(&q.range()?).await?;
    Ok(ErasedJson::new(stats))
}

async fn git_stats(State(app): State<Arc<AppState>>, Query(q): Query<RangeQuery>) -> Reply {
    let range = q.range()?;
    let git: GitComposite = app
        .cache
        .get_or_fetch(&keys::stats_git(&range), app.ttl.stats, async {
            Ok::<_, Error>(app.combined(&range).await?.git_only())
        })
        .await?;
    Ok(ErasedJson::new(git))
}

async fn jira_stats(State(app): State<Arc<AppState>>, Query(q): Query<RangeQuery>) -> Reply {
    let range = q.range()?;
    let jira: JiraComposite = app
        .cache
        .get_or_fetch(&keys::stats_jira(&range), app.ttl.stats, async {
            Ok::<_, Error>(app.combined(&range).await?.jira_only())
        })
        .await?;
    Ok(ErasedJson::new(jira))
}

async fn leaderboard(State(app): State<Arc<AppState>>, Query(q): Query<RangeQuery>) -> Reply {
    let range = q.range()?;
    let users = app.upstreams.directory.users().await?;
    let rate_limit = Arc::new(RateLimit::default());
    let entries = app.fetcher.fetch(&users, &range, q.refresh, &rate_limit).await;
    Ok(ErasedJson::new(entries))
}

/// Benchmarks over a leaderboard cut short by rate limiting are still
/// returned, but only complete ones are cached.
async fn benchmarks(State(app): State<Arc<AppState>>, Query(q): Query<RangeQuery>) -> Reply {
    let range = q.range()?;
    let key = keys::benchmarks(&range);
    if let Some(benchmarks) = app.cache.get::<Benchmarks>(&key).await {
        return Ok(ErasedJson::new(benchmarks));
    }
    let users = app.upstreams.directory.users().await?;
    let rate_limit = Arc::new(RateLimit::default());
    let entries = app.fetcher.fetch(&users, &range, false, &rate_limit).await;
    let benchmarks = benchmark::compute(&entries);
    if rate_limit.is_tripped() {
        warn!(
            "benchmarks for {} computed over {}/{} users",
            range,
            entries.len(),
            users.len()
        );
    } else {
        app.cache.set(key, &benchmarks, app.ttl.benchmarks).await;
    }
    Ok(ErasedJson::new(benchmarks))
}

async fn ctoi(State(app): State<Arc<AppState>>, Query(q): Query<RangeQuery>) -> Reply {
    let range = q.range()?;
    let ctoi: JsValue = app
        .cache
        .get_or_fetch(&keys::ctoi_stats(&range), app.ttl.ctoi, app.upstreams.jira.ctoi_stats(&range))
        .await?;
    Ok(ErasedJson::new(ctoi))
}

async fn prs(State(app): State<Arc<AppState>>, Query(q): Query<RangeQuery>) -> Reply {
    Ok(ErasedJson::new(app.prs(&q.range()?).await?))
}

async fn mrs(State(app): State<Arc<AppState>>, Query(q): Query<RangeQuery>) -> Reply {
    Ok(ErasedJson::new(app.mrs(&q.range()?).await?))
}

async fn issues(State(app): State<Arc<AppState>>, Query(q): Query<RangeQuery>) -> Reply {
    Ok(ErasedJson::new(app.issues(&q.range()?).await?))
}

async fn projects(State(app): State<Arc<AppState>>, Query(q): Query<RangeQuery>) -> Reply {
    let range = q.range()?;
    let rollup: Vec<ProjectRollup> = app
        .cache
        .get_or_fetch(&keys::projects(&range), app.ttl.projects, async {
            let (prs, mrs, issues) =
                tokio::try_join!(app.prs(&range), app.mrs(&range), app.issues(&range))?;
            Ok::<_, Error>(stats::project_rollup(&prs, &mrs, &issues))
        })
        .await?;
    Ok(ErasedJson::new(rollup))
}

async fn project_analytics(State(app): State<Arc<AppState>>, Path(project): Path<String>) -> Reply {
    let report: JsValue = app
        .cache
        .get_or_fetch(
            &keys::project_analytics(&project),
            app.ttl.analytics,
            app.upstreams.analytics.project(&project),
        )
        .await?;
    Ok(ErasedJson::new(report))
}

async fn invalidate(State(app): State<Arc<AppState>>, Query(q): Query<Invalidate>) -> StatusCode {
    match (q.key, q.prefix) {
        (Some(key), _) => {
            app.cache.delete(&key).await;
            info!("cache entry {} invalidated", key);
        }
        (None, Some(prefix)) => {
            app.cache.delete_by_prefix(&prefix);
            info!("cache entries under {} invalidated", prefix);
        }
        (None, None) => {
            app.cache.clear();
            info!("cache cleared");
        }
    }
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::{LeaderboardConfig, OperatorIdentity};
    use crate::testing::{rate_limited, upstreams, user, Mocks};
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn serve(mocks: &Mocks) -> String {
        let cache = Arc::new(TtlCache::new(1_000, Duration::from_secs(60)));
        let upstreams = upstreams(mocks);
        let fetcher = Arc::new(LeaderboardFetcher::new(
            cache.clone(),
            upstreams.clone(),
            OperatorIdentity::default(),
            LeaderboardConfig {
                stagger: Duration::from_millis(1),
                ..LeaderboardConfig::default()
            },
        ));
        let state = Arc::new(AppState {
            cache,
            upstreams,
            fetcher,
            ttl: Ttls::default(),
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(state)).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn stats_are_cached_until_invalidated() {
        let mocks = Mocks::default();
        let base = serve(&mocks).await;
        let url = format!("{base}/stats?start=2025-09-01&end=2026-08-31");

        let res = reqwest::get(&url).await.unwrap();
        assert_eq!(res.status().as_u16(), 200);
        assert_eq!(res.headers().get("cache-control").unwrap(), "no-store");
        let body: JsValue = res.json().await.unwrap();
        assert_eq!(body["github"]["total"], 4);
        assert_eq!(body["jira"]["resolved"], 8);

        reqwest::get(&url).await.unwrap();
        assert_eq!(mocks.github.stats_calls(), 1);

        let res = reqwest::Client::new()
            .delete(format!("{base}/cache?prefix=stats:"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 204);

        reqwest::get(&url).await.unwrap();
        assert_eq!(mocks.github.stats_calls(), 2);
    }

    #[tokio::test]
    async fn composites_reuse_combined_stats() {
        let mocks = Mocks::default();
        let base = serve(&mocks).await;

        let git: JsValue = reqwest::get(format!("{base}/stats/git")).await.unwrap().json().await.unwrap();
        assert!(git.get("jira").is_none());
        assert_eq!(git["gitlab"]["created"], 3);
        let jira: JsValue = reqwest::get(format!("{base}/stats/jira")).await.unwrap().json().await.unwrap();
        assert_eq!(jira["jira"]["total"], 10);

        assert_eq!(mocks.github.stats_calls(), 1);
        assert_eq!(mocks.jira.stats_calls(), 1);
    }

    #[tokio::test]
    async fn rate_limited_upstreams_answer_429() {
        let mocks = Mocks::default();
        mocks.github.fail_stats(|_| Some(rate_limited("github")));
        mocks.gitlab.fail_stats(|_| Some(rate_limited("gitlab")));
        mocks.jira.fail_stats(|_| Some(rate_limited("jira")));
        let base = serve(&mocks).await;

        let res = reqwest::get(format!("{base}/stats")).await.unwrap();
        assert_eq!(res.status().as_u16(), 429);
    }

    #[tokio::test]
    async fn failing_list_answers_502() {
        let mocks = Mocks::default();
        mocks
            .jira
            .fail_issues(|_| Some(Error::Upstream("jql rejected".to_owned())));
        let base = serve(&mocks).await;

        let res = reqwest::get(format!("{base}/issues")).await.unwrap();
        assert_eq!(res.status().as_u16(), 502);
        let res = reqwest::get(format!("{base}/projects")).await.unwrap();
        assert_eq!(res.status().as_u16(), 502);
    }

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let mocks = Mocks::default();
        let base = serve(&mocks).await;

        let res = reqwest::get(format!("{base}/prs?start=2026-01-02&end=2026-01-01"))
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 400);
        assert_eq!(mocks.github.item_calls(), 0);
    }

    #[tokio::test]
    async fn leaderboard_and_benchmarks() {
        let mocks = Mocks::default();
        mocks.directory.set_users(vec![
            user("u1", Some("ann"), Some("ann")),
            user("u2", Some("bob"), None),
            user("u3", None, None),
        ]);
        let base = serve(&mocks).await;

        let entries: JsValue = reqwest::get(format!("{base}/leaderboard")).await.unwrap().json().await.unwrap();
        let ids: Vec<&str> = entries
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["user"]["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["u1", "u2", "u3"]);
        let traffic = mocks.stats_traffic();

        let benchmarks: JsValue = reqwest::get(format!("{base}/benchmarks")).await.unwrap().json().await.unwrap();
        assert_eq!(benchmarks["fte"]["created"], 4.5);
        // the leaderboard was reused from the cache
        assert_eq!(mocks.stats_traffic(), traffic);

        reqwest::get(format!("{base}/leaderboard?refresh=true")).await.unwrap();
        assert!(mocks.stats_traffic() > traffic);
    }

    #[tokio::test]
    async fn concurrent_leaderboards_fetch_once() {
        let mocks = Mocks::default();
        mocks.directory.set_users(vec![
            user("u1", Some("ann"), None),
            user("u2", Some("bob"), None),
            user("u3", Some("cat"), None),
        ]);
        let base = serve(&mocks).await;
        let url = format!("{base}/leaderboard");

        let (a, b) = tokio::join!(reqwest::get(&url), reqwest::get(&url));
        assert_eq!(a.unwrap().status().as_u16(), 200);
        assert_eq!(b.unwrap().status().as_u16(), 200);
        assert_eq!(mocks.github.stats_calls(), 3);
    }

    #[tokio::test]
    async fn benchmarks_survive_a_cut_short_leaderboard() {
        let mocks = Mocks::default();
        mocks.directory.set_users(
            (0..6)
                .map(|i| user(&format!("u{i}"), Some(&format!("gh{i}")), None))
                .collect(),
        );
        mocks
            .github
            .fail_stats(|call| (call.login.as_deref() == Some("gh0")).then(|| rate_limited("github")));
        let base = serve(&mocks).await;

        let res = reqwest::get(format!("{base}/benchmarks")).await.unwrap();
        assert_eq!(res.status().as_u16(), 200);
        let benchmarks: JsValue = res.json().await.unwrap();
        // first batch only, the rate limited user has no data
        assert_eq!(benchmarks["fte"]["created"], 3.0);
        assert_eq!(mocks.github.stats_calls(), 5);

        // nothing was cached, the next request fetches again
        reqwest::get(format!("{base}/benchmarks")).await.unwrap();
        assert_eq!(mocks.github.stats_calls(), 10);
    }

    #[tokio::test]
    async fn projects_roll_up_all_lists() {
        let mocks = Mocks::default();
        let base = serve(&mocks).await;

        let rollup: JsValue = reqwest::get(format!("{base}/projects")).await.unwrap().json().await.unwrap();
        assert_eq!(rollup[0]["project"], "API");
        assert_eq!(rollup[0]["issues"], 1);
        assert_eq!(rollup[1]["project"], "WEB");

        // the lists behind the rollup are cached on their own keys
        reqwest::get(format!("{base}/prs")).await.unwrap();
        assert_eq!(mocks.github.item_calls(), 1);
    }

    #[tokio::test]
    async fn analytics_by_project() {
        let mocks = Mocks::default();
        let base = serve(&mocks).await;

        let report: JsValue = reqwest::get(format!("{base}/analytics/WEB")).await.unwrap().json().await.unwrap();
        assert_eq!(report["project"], "WEB");
        reqwest::get(format!("{base}/analytics/WEB")).await.unwrap();
        assert_eq!(mocks.analytics.project_calls(), 1);
    }
}
