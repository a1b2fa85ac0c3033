use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use eng_dashboard::cache::TtlCache;
use eng_dashboard::error::Error;
use eng_dashboard::http::{router, AppState};
use eng_dashboard::keys::Ttls;
use eng_dashboard::leaderboard::LeaderboardFetcher;
use eng_dashboard::opt::Opt;
use eng_dashboard::warmer::CacheWarmer;

const SWEEP_EVERY: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(
        env_logger::Env::new()
            .filter("DASHBOARD_LOG")
            .write_style("DASHBOARD_LOG_STYLE"),
    )
    .format_timestamp(None)
    .format_module_path(false)
    .format_target(false)
    .init();

    let opt = Opt::parse();

    let cache = Arc::new(TtlCache::new(opt.cache_capacity, SWEEP_EVERY));
    let upstreams = opt.upstream.build(opt.users.clone())?;
    let fetcher = Arc::new(LeaderboardFetcher::new(
        cache.clone(),
        upstreams.clone(),
        opt.operator.identity(),
        opt.leaderboard_config(),
    ));

    let warmer = if opt.no_warm {
        None
    } else {
        let warmer = CacheWarmer::new(
            cache.clone(),
            upstreams.clone(),
            fetcher.clone(),
            opt.warmer_config(),
        );
        Some(Arc::new(warmer).spawn())
    };

    let app = router(Arc::new(AppState {
        cache: cache.clone(),
        upstreams,
        fetcher,
        ttl: Ttls::default(),
    }));

    let listener = TcpListener::bind(opt.bind).await?;
    log::info!("listening on {}", opt.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::error!("cannot listen for shutdown signal: {}", err);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    log::info!("shutting down");
    if let Some(warmer) = warmer {
        warmer.abort();
    }
    cache.close();
    Ok(())
}
