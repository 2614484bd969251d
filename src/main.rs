mod admin;
mod app;
mod auth;
mod config;
mod error;
mod ledger;
mod notifications;
mod referrals;
mod rules;
mod scans;
mod security;
mod state;
mod store;
mod users;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "foodid=debug,axum=info,tower_http=info".to_string());
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

    let app_state = state::AppState::init().await?;
    admin::services::bootstrap(&app_state).await?;

    let server = app_state.config.server.clone();
    app::serve(app::build_app(app_state), &server).await
}
