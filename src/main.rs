use clap::Parser;
use palaver::{AppState, Args};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    use tracing_subscriber::prelude::*;

    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => "palaver=debug".into(),
    };

    // Setup file logging
    let file_appender = tracing_appender::rolling::daily(".", "palaver.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .with(tracing_error::ErrorLayer::default())
        .init();

    palaver::logging::setup_panic_hook();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let state = match AppState::new(args) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("failed to build application state: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        "palaver listening on {} relaying to {}",
        addr,
        state.upstream.base_url()
    );

    let app = palaver::routes::router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server exited with error: {}", e);
        std::process::exit(1);
    }
}
