/// Upstream endpoint paths, relative to the configured base URL.
pub const UPSTREAM_COMPLETIONS_PATH: &str = "/v2/chat/completions";
pub const UPSTREAM_CONVERSATIONS_PATH: &str = "/api/chat/conversations";
pub const UPSTREAM_CONVERSATION_DETAIL_PATH: &str = "/api/chat/conversations/detail";
pub const UPSTREAM_CONVERSATION_PATH: &str = "/api/chat/conversation";
pub const UPSTREAM_HISTORY_PATH: &str = "/api/chat/history";
pub const UPSTREAM_INTERACTION_PATH: &str = "/api/chat/interaction";
pub const UPSTREAM_APP_CONFIG_PATH: &str = "/api/app/config";

/// Custom session header the upstream REST endpoints authenticate with; the
/// completion endpoint takes the same token as a bearer credential instead.
pub const UPSTREAM_SESSION_HEADER: &str = "X-Session-Token";

/// Model the relay pins chat completions to.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Sampling defaults the upstream completion endpoint expects.
pub const DEFAULT_TEMPERATURE: f64 = 0.5;
pub const DEFAULT_PRESENCE_PENALTY: f64 = 0.0;
pub const DEFAULT_FREQUENCY_PENALTY: f64 = 0.0;
pub const DEFAULT_TOP_P: f64 = 1.0;

/// SSE wire framing.
pub const SSE_DATA_PREFIX: &str = "data:";
pub const STREAM_DONE_MARKER: &str = "[DONE]";

/// Page size used when a whole conversation or listing is needed in one
/// call; upstream paginates at 10 by default which is too small for either.
pub const UPSTREAM_FETCH_PAGE_SIZE: u32 = 100;

/// Hard cap on frames accepted from one upstream stream.
pub const MAX_STREAM_FRAMES: usize = 100_000;
