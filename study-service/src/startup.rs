use crate::config::StudyConfig;
use crate::handlers;
use crate::services::providers::{CompletionProvider, OpenAiProvider};
use crate::services::{
    BillingClock, BillingResolver, ChatOrchestrator, Database, QuotaEngine, UsageReportingService,
};
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: StudyConfig,
    pub db: Arc<Database>,
    pub quota: QuotaEngine,
    pub chat: Arc<ChatOrchestrator>,
    pub usage: UsageReportingService,
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the configured OpenAI-compatible provider.
    pub async fn build(config: StudyConfig) -> Result<Self, AppError> {
        let provider = OpenAiProvider::new(&config.provider)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("{}", e)))?;
        Self::build_with_provider(config, Arc::new(provider)).await
    }

    /// Build with an injected provider. Tests use this to swap in a mock.
    pub async fn build_with_provider(
        config: StudyConfig,
        provider: Arc<dyn CompletionProvider>,
    ) -> Result<Self, AppError> {
        let db = Arc::new(
            Database::new(
                &config.database.url,
                config.database.max_connections,
                config.database.min_connections,
            )
            .await?,
        );
        db.run_migrations().await?;

        let clock = BillingClock::new(config.billing.timezone);
        let quota = QuotaEngine::new(db.clone(), clock);
        let billing = BillingResolver::new(config.billing.pricing.clone());
        let chat = Arc::new(ChatOrchestrator::new(
            db.clone(),
            quota.clone(),
            billing,
            provider,
        ));
        let usage = UsageReportingService::new(db.clone(), quota.clone());

        let state = AppState {
            config: config.clone(),
            db,
            quota,
            chat,
            usage,
        };

        let listener = TcpListener::bind(("0.0.0.0", config.common.port)).await?;
        let port = listener
            .local_addr()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("{}", e)))?
            .port();

        let router = build_router(state);

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), AppError> {
        info!(port = self.port, "HTTP server listening");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Server error: {}", e)))?;
        Ok(())
    }
}

fn build_router(state: AppState) -> Router {
    let api = Router::new()
        // Classes
        .route("/classes", post(handlers::classes::create_class))
        .route("/classes", get(handlers::classes::list_classes))
        .route("/classes/join", post(handlers::classes::join_class))
        .route("/classes/:class_id", get(handlers::classes::get_class))
        .route(
            "/classes/:class_id",
            patch(handlers::classes::update_class),
        )
        .route(
            "/classes/:class_id",
            delete(handlers::classes::delete_class),
        )
        // Memberships and permissions
        .route(
            "/classes/:class_id/members",
            get(handlers::permissions::list_members),
        )
        .route(
            "/classes/:class_id/members/:member_id",
            patch(handlers::permissions::update_membership),
        )
        .route(
            "/classes/:class_id/members/:member_id",
            delete(handlers::permissions::remove_member),
        )
        .route(
            "/classes/:class_id/members/:member_id/limits",
            put(handlers::permissions::update_member_limits),
        )
        .route(
            "/classes/:class_id/sponsorship",
            put(handlers::permissions::set_class_sponsorship),
        )
        .route(
            "/classes/:class_id/eligibility",
            get(handlers::permissions::chat_eligibility),
        )
        // Chat
        .route("/chat/sessions", post(handlers::chat::create_session))
        .route(
            "/classes/:class_id/sessions",
            get(handlers::chat::list_sessions),
        )
        .route(
            "/chat/sessions/:session_id/messages",
            post(handlers::chat::send_message),
        )
        .route(
            "/chat/sessions/:session_id/messages",
            get(handlers::chat::list_messages),
        )
        .route(
            "/chat/sessions/:session_id",
            delete(handlers::chat::close_session),
        )
        // Usage reporting
        .route("/usage/me", get(handlers::usage::my_usage))
        .route(
            "/classes/:class_id/usage/me",
            get(handlers::usage::my_class_usage),
        )
        .route(
            "/classes/:class_id/usage",
            get(handlers::usage::class_usage_overview),
        )
        .route(
            "/classes/:class_id/usage/records",
            get(handlers::usage::my_usage_records),
        )
        // Documents
        .route(
            "/classes/:class_id/documents",
            post(handlers::documents::register_document),
        )
        .route(
            "/classes/:class_id/documents",
            get(handlers::documents::list_documents),
        );

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))
        .nest("/api/v1", api)
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
