//! stopcast-server library
//!
//! Admin HTTP API for the passenger-demand notification service: stop and
//! registrant management, daily prediction regeneration, push and SMS
//! delivery, model training and profile-photo uploads.

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use stopcast_common::config::Config;
use stopcast_forecast::ForecastModel;

pub mod api;
pub mod error;
pub mod jobs;
pub mod notify;
pub mod rate_limit;
pub mod scheduler;

use error::ApiResult;
use notify::{PushClient, SmsClient};
use rate_limit::SlidingWindowLimiter;

/// Application state shared across HTTP handlers and background jobs
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub config: Arc<Config>,
    /// Currently deployed model; `None` means predictions use the heuristic
    model: Arc<RwLock<Option<Arc<ForecastModel>>>>,
    /// Serializes appends to the training dataset CSV
    pub dataset_lock: Arc<std::sync::Mutex<()>>,
    /// Held for the duration of a training run
    pub training_lock: Arc<tokio::sync::Mutex<()>>,
    pub rate_limiter: Arc<SlidingWindowLimiter>,
    pub push: Arc<PushClient>,
    pub sms: Arc<SmsClient>,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, config: Config) -> ApiResult<Self> {
        let push = PushClient::new(&config.push)?;
        let sms = SmsClient::new(&config.sms)?;

        Ok(Self {
            db,
            config: Arc::new(config),
            model: Arc::new(RwLock::new(None)),
            dataset_lock: Arc::new(std::sync::Mutex::new(())),
            training_lock: Arc::new(tokio::sync::Mutex::new(())),
            rate_limiter: Arc::new(SlidingWindowLimiter::new()),
            push: Arc::new(push),
            sms: Arc::new(sms),
        })
    }

    pub async fn current_model(&self) -> Option<Arc<ForecastModel>> {
        self.model.read().await.clone()
    }

    /// Swap in a new model; in-flight runs keep the one they started with
    pub async fn set_model(&self, model: ForecastModel) {
        *self.model.write().await = Some(Arc::new(model));
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.config.storage.uploads_dir());

    let api = Router::new()
        .route("/api/dashboard", get(api::dashboard))
        .route("/api/users", get(api::list_users).post(api::add_user))
        .route("/api/users/token", post(api::register_push_token))
        .route("/api/users/:id", delete(api::delete_user))
        .route("/api/stops", get(api::list_stops))
        .route("/api/predictions", get(api::all_predictions))
        .route("/api/predictions/today", get(api::today_predictions))
        .route("/api/predictions/generate", post(api::generate_predictions))
        .route("/api/predictions/send", post(api::send_predictions))
        .route("/api/predictions/:date", get(api::predictions_by_date))
        .route("/api/model/metrics", get(api::model_metrics))
        .route("/api/model/train", post(api::train_model))
        .route("/api/sms/send", post(api::send_sms))
        .route("/api/sms/balance", get(api::sms_balance))
        .route(
            "/api/uploads/profile-photo",
            post(api::upload_profile_photo)
                .layer(DefaultBodyLimit::max(api::uploads::BODY_LIMIT_BYTES)),
        );

    Router::new()
        .route("/", get(api::serve_index))
        .merge(api::health_routes())
        .merge(api)
        .nest_service("/uploads", uploads)
        .fallback(api::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
