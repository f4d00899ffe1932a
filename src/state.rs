use crate::backend::{ApiKey, BackendClient};
use crate::config::{Args, Capabilities};
use crate::db::DbPool;
use crate::extract::Extractor;
use crate::format::ResponseFormatter;
use crate::types::{ChatError, Result};
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    pub db: DbPool,
    pub backend: BackendClient,
    pub formatter: ResponseFormatter,
    pub extractor: Extractor,
    pub capabilities: Capabilities,
    pub args: Arc<Args>,
}

impl AppState {
    pub fn new(args: Args, db: DbPool) -> Result<Self> {
        Self::with_capabilities(args, db, Capabilities::detect())
    }

    pub fn with_capabilities(args: Args, db: DbPool, capabilities: Capabilities) -> Result<Self> {
        let client = match reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(args.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                return Err(ChatError::Internal(
                    format!("Failed to build HTTP client: {}", e),
                    tracing_error::SpanTrace::capture(),
                )
                .into())
            }
        };

        let api_key = Arc::new(ApiKey::new(args.api_key.clone()));
        let backend = BackendClient::new(client, args.backend_url.clone(), api_key).with_timeouts(
            Duration::from_secs(args.request_timeout_secs),
            Duration::from_secs(args.list_timeout_secs),
        );

        Ok(Self {
            db,
            backend,
            formatter: ResponseFormatter::new(&capabilities),
            extractor: Extractor::new(capabilities),
            capabilities,
            args: Arc::new(args),
        })
    }
}
