//! HTTP routes

use crate::forecast::{self, SUMMARY_KEY, WeatherForecast};
use crate::store::ConfigProvider;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<dyn ConfigProvider>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/weatherforecast", get(weather_forecast))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn weather_forecast(State(state): State<AppState>) -> Json<Vec<WeatherForecast>> {
    let summary = state.config.current(SUMMARY_KEY).await;
    let records = forecast::forecasts(&mut rand::thread_rng(), summary);
    Json(records)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
