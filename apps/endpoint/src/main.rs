use std::sync::Arc;

use anyhow::Result;
use axum::serve;
use screambot_core::QnaClient;
use screambot_endpoint::adapter::{Adapter, default_turn_error_handler};
use screambot_endpoint::bot::ScreamBot;
use screambot_endpoint::config::BotConfig;
use screambot_endpoint::http::{AppState, build_router};
use screambot_telemetry::install as init_telemetry;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_telemetry("screambot")?;

    let config = BotConfig::from_env()?;
    let bot = Arc::new(ScreamBot::new(Arc::new(QnaClient::new(config.qna.clone()))));
    let on_turn_error = default_turn_error_handler();

    let state = AppState {
        adapter: Arc::new(Adapter::new(bot.clone(), on_turn_error.clone(), true)),
        streaming: Arc::new(Adapter::new(bot, on_turn_error, false)),
    };
    let router = build_router(state);

    let listener = TcpListener::bind(config.addr).await?;
    info!("screambot listening on {}", config.addr);

    serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
