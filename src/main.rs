mod routes;
mod models;
mod store;
mod layout;
mod fonts;
mod textfit;
mod pdf;

use axum::{Router, routing::{post, get}};
use routes::{AppState, create_invoice, list_invoices, get_invoice, update_invoice, delete_invoice, delete_invoices, get_settings, update_settings, export_pdf};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};
use tower_http::cors::{CorsLayer, Any};

use crate::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".into());
    let store = Store::open(&data_dir)?;
    let state = AppState {
        store: Arc::new(store),
        http: reqwest::Client::new(),
    };

    let app = Router::new()
        .route("/api/invoices", post(create_invoice).get(list_invoices))
        .route(
            "/api/invoices/:id",
            get(get_invoice).put(update_invoice).delete(delete_invoice),
        )
        .route("/api/invoices/delete", post(delete_invoices))
        .route("/api/settings", get(get_settings).put(update_settings))
        .route("/api/export", post(export_pdf))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state);

    let port: u16 = std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Starting server");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
