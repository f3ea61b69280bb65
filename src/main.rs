// src/main.rs

use std::{error::Error, time::Duration};

use assessment_engine::{config::Config, db, routes, services::leaderboard, state::AppState};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load configuration from environment (.env included)
    let config = Config::from_env()?;

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match db::connect(&config.database_url, 5).await {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    tracing::error!("Failed to connect to database after 5 retries: {}", e);
                    return Err(e.into());
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    tracing::info!("Running migrations...");
    db::migrate(&pool).await?;
    tracing::info!("Migrations applied successfully.");

    if config.leaderboard_refresh_secs > 0 {
        spawn_leaderboard_refresh(pool.clone(), &config);
    }

    let state = AppState {
        pool,
        config: config.clone(),
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Rebuilds both leaderboards on a fixed period. A failed pass is logged and
/// the previous snapshot stays in place until the next tick.
fn spawn_leaderboard_refresh(pool: SqlitePool, config: &Config) {
    let period = Duration::from_secs(config.leaderboard_refresh_secs);
    let policy = config.policy.ranking;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = leaderboard::recompute_all(&pool, policy, Utc::now()).await {
                tracing::error!("Leaderboard refresh failed: {}", e);
            }
        }
    });
}
