mod admin;
mod app;
mod auth;
mod challenges;
mod config;
mod error;
mod extract;
mod notifications;
mod ranking;
mod state;
mod storage;
mod teams;
mod users;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.env.default_log_filter().to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    tracing::info!(env = ?config.env, competition = %config.competition.name, "starting");
    let listen_addr = config.listen_addr();
    let app_state = AppState::init(config).await?;

    sqlx::migrate!("./migrations").run(&app_state.db).await?;

    app::serve(app::build_app(app_state), &listen_addr).await
}
