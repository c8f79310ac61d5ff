use crate::constants::DEFAULT_MODEL;
use crate::reconcile::ConversationRegistry;
use crate::types::Result;
use crate::upstream::UpstreamClient;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    /// Base URL of the external chat service. Overridden by the
    /// UPSTREAM_CHAT_URL environment variable when set.
    #[arg(long, default_value = "http://localhost:9000")]
    pub upstream_url: String,
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,
    #[arg(long, default_value_t = 120)]
    pub request_timeout_secs: u64,
    #[arg(long, default_value_t = 10)]
    pub connect_timeout_secs: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub upstream: UpstreamClient,
    pub registry: Arc<ConversationRegistry>,
    pub args: Arc<Args>,
}

impl AppState {
    pub fn new(args: Args) -> Result<Self> {
        let base_url = std::env::var("UPSTREAM_CHAT_URL").unwrap_or_else(|_| args.upstream_url.clone());

        // No overall request timeout: completion streams stay open for as
        // long as the model keeps talking. Connect and REST timeouts still
        // apply per call.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(args.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(crate::types::PalaverError::Network)?;

        Ok(Self {
            upstream: UpstreamClient::new(
                http,
                base_url,
                Duration::from_secs(args.request_timeout_secs),
            ),
            registry: Arc::new(ConversationRegistry::new()),
            args: Arc::new(args),
        })
    }
}
