use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::services::ServeDir;
use std::net::SocketAddr;
use tracing::info;

use crate::models::{DashboardState, NewsSection, ProbeMetric, ProviderDataset};

type SharedState = Arc<Mutex<DashboardState>>;

pub async fn get_observations(State(state): State<SharedState>) -> Json<Vec<ProviderDataset>> {
    let state = state.lock().await;
    Json(state.datasets.clone())
}

pub async fn get_news(State(state): State<SharedState>) -> Json<Vec<NewsSection>> {
    let state = state.lock().await;
    Json(state.news.clone())
}

pub async fn get_probe_metrics(State(state): State<SharedState>) -> Json<Vec<ProbeMetric>> {
    let state = state.lock().await;
    Json(state.probe_metrics.clone())
}

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/observations", get(get_observations))
        .route("/api/news", get(get_news))
        .route("/api/metrics", get(get_probe_metrics))
        .fallback_service(ServeDir::new("public"))
        .with_state(state)
}

pub async fn start_server(port: u16, state: SharedState) {
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Dataset API: http://localhost:{}", addr.port());
    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind API port");
    axum::serve(listener, app).await.unwrap();
}
