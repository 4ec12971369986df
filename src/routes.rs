use axum::{Json, extract::{Path, Query, State}, http::StatusCode, response::{IntoResponse, Response}};
use std::sync::Arc;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    fonts,
    layout::is_valid_tile_count,
    models::{BulkDeleteRequest, CreateInvoiceRequest, ExportRequest, Invoice, Settings, UpdateInvoiceRequest},
    pdf::generate_pdf,
    store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub q: Option<String>,
}

pub async fn create_invoice(
    State(state): State<AppState>,
    Json(body): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>), StatusCode> {
    if body.text.trim().is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let invoice = state.store.add_invoice(body.text);
    tracing::info!("🧾 Created invoice {}", invoice.id);
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Vec<Invoice>> {
    Json(state.store.list(params.q.as_deref()))
}

pub async fn get_invoice(Path(id): Path<Uuid>, State(state): State<AppState>) -> Response {
    if let Some(invoice) = state.store.get(id) {
        Json(invoice).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

pub async fn update_invoice(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<UpdateInvoiceRequest>,
) -> Result<Json<Invoice>, StatusCode> {
    if body.text.trim().is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    state
        .store
        .update_invoice(id, body.text)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn delete_invoice(Path(id): Path<Uuid>, State(state): State<AppState>) -> StatusCode {
    if state.store.delete_invoice(id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn delete_invoices(
    State(state): State<AppState>,
    Json(body): Json<BulkDeleteRequest>,
) -> Json<serde_json::Value> {
    let deleted = state.store.delete_many(&body.ids);
    tracing::info!("🗑️ Deleted {} invoices", deleted);
    Json(serde_json::json!({ "deleted": deleted }))
}

pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.store.settings())
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(body): Json<Settings>,
) -> Result<Json<Settings>, StatusCode> {
    if !is_valid_tile_count(body.invoices_per_page) {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    Ok(Json(state.store.update_settings(body)))
}

#[axum::debug_handler]
pub async fn export_pdf(
    State(state): State<AppState>,
    Json(body): Json<ExportRequest>,
) -> Response {
    let mut settings = state.store.settings();
    if let Some(per_page) = body.invoices_per_page {
        if !is_valid_tile_count(per_page) {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invoices_per_page must be 4, 6 or 8",
            )
                .into_response();
        }
        settings.invoices_per_page = per_page;
    }

    let mut invoices = state.store.select(&body.ids);
    if let Some(limit) = body.limit {
        invoices.truncate(limit);
    }
    if invoices.is_empty() {
        return (StatusCode::UNPROCESSABLE_ENTITY, "no invoices selected").into_response();
    }

    tracing::info!(
        "📄 Exporting {} invoices at {} per page",
        invoices.len(),
        settings.invoices_per_page
    );

    // Best effort: a failed download only disables the Arabic face
    let arabic = match fonts::fetch_arabic_font(&state.http).await {
        Ok(bytes) => {
            tracing::info!("✅ Arabic font loaded ({} bytes)", bytes.len());
            Some(bytes)
        }
        Err(e) => {
            tracing::warn!("Could not load Arabic font, Arabic text degrades to Helvetica: {}", e);
            None
        }
    };

    match generate_pdf(&invoices, &settings, arabic) {
        Ok(pdf_bytes) => {
            let mut headers = axum::http::HeaderMap::new();
            headers.insert(axum::http::header::CONTENT_TYPE, "application/pdf".parse().unwrap());
            headers.insert(
                axum::http::header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"invoices-{}.pdf\"",
                    Utc::now().format("%Y-%m-%d")
                )
                .parse()
                .unwrap(),
            );
            (StatusCode::OK, headers, pdf_bytes).into_response()
        }
        Err(e) => {
            tracing::error!("❌ PDF export failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
