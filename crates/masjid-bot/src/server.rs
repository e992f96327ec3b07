use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::automation::AutomationClient;
use crate::bot::Bot;
use crate::channel::OutboundChannel;
use crate::config::{AdminList, Config};
use crate::handlers;
use crate::llm::Assistant;
use crate::prayer::PrayerResolver;
use crate::queue::MessageQueue;
use crate::sheets::SheetsClient;

/// Static facts reported by the info endpoints.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub session: String,
    pub gateway_url: String,
    pub prayer_api: String,
    pub default_city: String,
    pub automation_configured: bool,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub bot: Bot,
    pub queue: MessageQueue,
    pub channel: Arc<dyn OutboundChannel>,
    pub admins: Arc<AdminList>,
    pub sheets: SheetsClient,
    pub prayer: PrayerResolver,
    pub assistant: Assistant,
    pub info: Arc<ServiceInfo>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every collaborator from `config` around `channel`.
    pub fn from_config(config: &Config, channel: Arc<dyn OutboundChannel>) -> anyhow::Result<Self> {
        let admins = Arc::new(config.admin_list().context("invalid ADMIN_NUMBERS")?);
        let queue = MessageQueue::new(channel.clone(), config.queue.queue_config());
        let automation =
            AutomationClient::new(&config.automation).context("failed to build automation client")?;
        let sheets = SheetsClient::new(&config.sheets).context("failed to build sheets client")?;
        let prayer = PrayerResolver::new(&config.prayer).context("failed to build prayer client")?;
        let assistant = Assistant::from_config(&config.ai).context("failed to build AI provider")?;

        let bot = Bot::new(
            queue.clone(),
            channel.clone(),
            admins.clone(),
            automation.clone(),
            sheets.clone(),
        );

        let info = ServiceInfo {
            session: config.gateway.session.clone(),
            gateway_url: config.gateway.base_url.clone(),
            prayer_api: config.prayer.primary_base_url.clone(),
            default_city: config.prayer.default_city.clone(),
            automation_configured: automation.is_configured(),
        };

        Ok(Self {
            bot,
            queue,
            channel,
            admins,
            sheets,
            prayer,
            assistant,
            info: Arc::new(info),
            started_at: Instant::now(),
        })
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

pub fn build_app(state: AppState, request_timeout_secs: u64) -> Router {
    let webhooks = Router::new()
        .route("/send-message", post(handlers::send_message))
        .route("/send-image", post(handlers::send_image))
        .route("/send", post(handlers::send))
        .route("/send-bulk", post(handlers::send_bulk))
        .route("/broadcast", post(handlers::broadcast))
        .route("/admin", post(handlers::admin))
        .route("/waha", post(handlers::waha_event))
        .route("/n8n", post(handlers::automation_event))
        .route("/prayer-notification", post(handlers::prayer_notification));

    let api = Router::new()
        .route("/status", get(handlers::status))
        .route("/message", post(handlers::simulate_message))
        .route("/session/status/{session_name}", get(handlers::session_status))
        .route("/screenshot/{session_name}", get(handlers::screenshot))
        .route("/prayer/{city}", get(handlers::prayer_times))
        .route("/ai-chat", post(handlers::ai_chat))
        .route("/faq", get(handlers::list_faq))
        .route("/faq/search", get(handlers::search_faq))
        .route("/sheets/test", get(handlers::sheets_test));

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .nest("/webhook", webhooks)
        .nest("/api", api)
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_secs),
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
