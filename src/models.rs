use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Invoice {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogoType {
    Text,
    Image,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub logo: String,
    pub logo_type: LogoType,
    /// Base64 payload, raw or as a data: URL. Only used when logo_type == Image.
    #[serde(default)]
    pub logo_image: String,
    pub invoices_per_page: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            logo: "Invoice Manager".to_string(),
            logo_type: LogoType::Text,
            logo_image: String::new(),
            invoices_per_page: 4,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateInvoiceRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpdateInvoiceRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BulkDeleteRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExportRequest {
    pub ids: Vec<Uuid>,
    /// Overrides the saved invoices-per-page setting for this export only.
    #[serde(default)]
    pub invoices_per_page: Option<u32>,
    /// Caps how many of the selected invoices end up in the PDF.
    #[serde(default)]
    pub limit: Option<usize>,
}
