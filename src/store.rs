use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Invoice, Settings};

pub const SNAPSHOT_VERSION: u32 = 1;

const INVOICES_FILE: &str = "invoices.json";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")] Io(#[from] std::io::Error),
}

/// On-disk envelope for the invoice list. The version gate lets a future
/// format change fail closed instead of surfacing later as a render error.
#[derive(Debug, Serialize, Deserialize)]
struct InvoiceSnapshot {
    version: u32,
    invoices: Vec<Invoice>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SettingsSnapshot {
    version: u32,
    settings: Settings,
}

/// Process-wide invoice + settings store. Constructed once in main and handed
/// to consumers explicitly; every mutation writes a fresh snapshot to disk.
pub struct Store {
    dir: PathBuf,
    invoices: RwLock<Vec<Invoice>>,
    settings: RwLock<Settings>,
}

impl Store {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Store, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let invoices = load_invoices(&dir.join(INVOICES_FILE));
        let settings = load_settings(&dir.join(SETTINGS_FILE));
        tracing::info!("📂 Store opened with {} invoices in {}", invoices.len(), dir.display());
        Ok(Store {
            dir,
            invoices: RwLock::new(invoices),
            settings: RwLock::new(settings),
        })
    }

    pub fn add_invoice(&self, text: String) -> Invoice {
        let now = Utc::now();
        let invoice = Invoice {
            id: Uuid::new_v4(),
            text,
            created_at: now,
            updated_at: now,
        };
        let mut invoices = self.invoices.write();
        // Newest first, same order the list is shown and exported in
        invoices.insert(0, invoice.clone());
        self.save_invoices(&invoices);
        invoice
    }

    /// Full list, or a case-insensitive substring filter when a query is given.
    pub fn list(&self, query: Option<&str>) -> Vec<Invoice> {
        let invoices = self.invoices.read();
        match query {
            Some(q) if !q.trim().is_empty() => {
                let q = q.to_lowercase();
                invoices
                    .iter()
                    .filter(|inv| inv.text.to_lowercase().contains(&q))
                    .cloned()
                    .collect()
            }
            _ => invoices.clone(),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Invoice> {
        self.invoices.read().iter().find(|inv| inv.id == id).cloned()
    }

    pub fn update_invoice(&self, id: Uuid, text: String) -> Option<Invoice> {
        let mut invoices = self.invoices.write();
        let invoice = invoices.iter_mut().find(|inv| inv.id == id)?;
        invoice.text = text;
        invoice.updated_at = Utc::now();
        let updated = invoice.clone();
        self.save_invoices(&invoices);
        Some(updated)
    }

    pub fn delete_invoice(&self, id: Uuid) -> bool {
        let mut invoices = self.invoices.write();
        let before = invoices.len();
        invoices.retain(|inv| inv.id != id);
        let removed = invoices.len() != before;
        if removed {
            self.save_invoices(&invoices);
        }
        removed
    }

    pub fn delete_many(&self, ids: &[Uuid]) -> usize {
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        let mut invoices = self.invoices.write();
        let before = invoices.len();
        invoices.retain(|inv| !wanted.contains(&inv.id));
        let removed = before - invoices.len();
        if removed > 0 {
            self.save_invoices(&invoices);
        }
        removed
    }

    /// Invoices matching the given ids, kept in stored (newest-first) order.
    /// Export placement depends on this order, so it must be reproducible.
    pub fn select(&self, ids: &[Uuid]) -> Vec<Invoice> {
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        self.invoices
            .read()
            .iter()
            .filter(|inv| wanted.contains(&inv.id))
            .cloned()
            .collect()
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    pub fn update_settings(&self, settings: Settings) -> Settings {
        let mut current = self.settings.write();
        *current = settings;
        self.save_settings(&current);
        current.clone()
    }

    // Persistence is fire-and-forget: a failed write is logged but the
    // in-memory mutation stands, so the running session keeps working.
    fn save_invoices(&self, invoices: &[Invoice]) {
        let snapshot = InvoiceSnapshot {
            version: SNAPSHOT_VERSION,
            invoices: invoices.to_vec(),
        };
        write_json(&self.dir.join(INVOICES_FILE), &snapshot);
    }

    fn save_settings(&self, settings: &Settings) {
        let snapshot = SettingsSnapshot {
            version: SNAPSHOT_VERSION,
            settings: settings.clone(),
        };
        write_json(&self.dir.join(SETTINGS_FILE), &snapshot);
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            if let Err(e) = fs::write(path, json) {
                tracing::error!("💾 Failed to persist {}: {}", path.display(), e);
            }
        }
        Err(e) => tracing::error!("💾 Failed to serialize {}: {}", path.display(), e),
    }
}

fn load_invoices(path: &Path) -> Vec<Invoice> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_str::<InvoiceSnapshot>(&contents) {
        Ok(snap) if snap.version == SNAPSHOT_VERSION => snap.invoices,
        Ok(snap) => {
            tracing::warn!(
                "Invoice snapshot has unsupported version {}, starting empty",
                snap.version
            );
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("Failed to parse invoice snapshot, starting empty: {}", e);
            Vec::new()
        }
    }
}

fn load_settings(path: &Path) -> Settings {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return Settings::default(),
    };
    match serde_json::from_str::<SettingsSnapshot>(&contents) {
        Ok(snap) if snap.version == SNAPSHOT_VERSION => {
            let mut settings = snap.settings;
            if !crate::layout::is_valid_tile_count(settings.invoices_per_page) {
                tracing::warn!(
                    "Saved invoices_per_page {} is invalid, resetting to 4",
                    settings.invoices_per_page
                );
                settings.invoices_per_page = 4;
            }
            settings
        }
        Ok(snap) => {
            tracing::warn!(
                "Settings snapshot has unsupported version {}, using defaults",
                snap.version
            );
            Settings::default()
        }
        Err(e) => {
            tracing::warn!("Failed to parse settings snapshot, using defaults: {}", e);
            Settings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogoType;
    use pretty_assertions::assert_eq;

    #[test]
    fn add_prepends_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let first = store.add_invoice("first".into());
        let second = store.add_invoice("second".into());

        let listed = store.list(None);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);

        // A fresh store over the same directory sees the same list
        let reopened = Store::open(dir.path()).unwrap();
        assert_eq!(reopened.list(None), listed);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.add_invoice("Widgets for ACME Corp".into());
        store.add_invoice("Consulting retainer".into());

        assert_eq!(store.list(Some("acme")).len(), 1);
        assert_eq!(store.list(Some("RETAINER")).len(), 1);
        assert_eq!(store.list(Some("nothing")).len(), 0);
        assert_eq!(store.list(Some("  ")).len(), 2);
    }

    #[test]
    fn update_touches_updated_at_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let invoice = store.add_invoice("draft".into());

        let updated = store.update_invoice(invoice.id, "final".into()).unwrap();
        assert_eq!(updated.text, "final");
        assert_eq!(updated.created_at, invoice.created_at);
        assert!(updated.updated_at >= invoice.updated_at);

        assert!(store.update_invoice(Uuid::new_v4(), "x".into()).is_none());
    }

    #[test]
    fn delete_many_reports_removed_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let a = store.add_invoice("a".into());
        let b = store.add_invoice("b".into());
        store.add_invoice("c".into());

        let removed = store.delete_many(&[a.id, b.id, Uuid::new_v4()]);
        assert_eq!(removed, 2);
        assert_eq!(store.list(None).len(), 1);
    }

    #[test]
    fn select_keeps_stored_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let a = store.add_invoice("a".into());
        let b = store.add_invoice("b".into());
        let c = store.add_invoice("c".into());

        // Request out of order; stored order is newest-first: c, b, a
        let selected = store.select(&[a.id, c.id, b.id]);
        let ids: Vec<Uuid> = selected.iter().map(|inv| inv.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);
    }

    #[test]
    fn settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let saved = store.update_settings(Settings {
            logo: "ACME".into(),
            logo_type: LogoType::Image,
            logo_image: "aGVsbG8=".into(),
            invoices_per_page: 8,
        });

        let reopened = Store::open(dir.path()).unwrap();
        assert_eq!(reopened.settings(), saved);
    }

    #[test]
    fn corrupt_snapshots_fail_closed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INVOICES_FILE), "not json at all").unwrap();
        fs::write(dir.path().join(SETTINGS_FILE), "{\"version\": 99}").unwrap();

        let store = Store::open(dir.path()).unwrap();
        assert!(store.list(None).is_empty());
        assert_eq!(store.settings(), Settings::default());
    }

    #[test]
    fn version_mismatch_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let json = "{\"version\": 2, \"invoices\": []}";
        fs::write(dir.path().join(INVOICES_FILE), json).unwrap();

        let store = Store::open(dir.path()).unwrap();
        assert!(store.list(None).is_empty());
    }

    #[test]
    fn invalid_saved_tile_count_resets_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = SettingsSnapshot {
            version: SNAPSHOT_VERSION,
            settings: Settings {
                invoices_per_page: 5,
                ..Settings::default()
            },
        };
        fs::write(
            dir.path().join(SETTINGS_FILE),
            serde_json::to_string(&snapshot).unwrap(),
        )
        .unwrap();

        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.settings().invoices_per_page, 4);
    }
}
