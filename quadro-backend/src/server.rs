use crate::api::api_router;
use crate::state::AppState;
/// HTTP server: axum with permissive CORS, stopped by the shutdown channel.
use axum::Router;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    api_router().layer(cors).with_state(state)
}

pub async fn serve(state: AppState, mut shutdown_rx: watch::Receiver<bool>) -> std::io::Result<()> {
    let bind_addr = state.bind_address.clone();
    let port = state.port;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind_addr, port)).await?;
    let actual_port = listener.local_addr()?.port();
    log::info!("HTTP server listening on http://{}:{}", bind_addr, actual_port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
            log::info!("HTTP server shutting down");
        })
        .await
}
