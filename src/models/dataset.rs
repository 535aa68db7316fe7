//! Dataset and backup document models
//!
//! The Dataset is the shop's local state. The BackupDocument is the JSON
//! shape stored on the backend for every snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BackupError, BackupResult};

/// A product record owned by the host application
pub type Product = Value;

/// A sale record owned by the host application
pub type Sale = Value;

/// Version written into `backupInfo.version`
pub const DOCUMENT_VERSION: &str = "2.0";

/// The local application data being backed up or restored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub sales: Vec<Sale>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl Dataset {
    /// Create an empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if there is nothing worth backing up
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.sales.is_empty() && self.settings.is_empty()
    }
}

/// Summary block embedded in every backup document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub total_products: usize,
    #[serde(default)]
    pub total_sales: usize,
}

/// Backup document as persisted on the storage backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub products: Vec<Product>,
    #[serde(default)]
    pub sales: Vec<Sale>,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_info: Option<BackupInfo>,
}

impl BackupDocument {
    /// Wrap a dataset for upload
    pub fn from_dataset(dataset: &Dataset, created: DateTime<Utc>) -> Self {
        Self {
            products: dataset.products.clone(),
            sales: dataset.sales.clone(),
            settings: dataset.settings.clone(),
            backup_info: Some(BackupInfo {
                created,
                version: Some(DOCUMENT_VERSION.to_string()),
                total_products: dataset.products.len(),
                total_sales: dataset.sales.len(),
            }),
        }
    }

    /// Serialize as the pretty-printed JSON stored on the backend
    pub fn to_bytes(&self) -> BackupResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| BackupError::Json(format!("Failed to serialize backup: {}", e)))
    }

    /// Parse and structurally validate a downloaded payload
    ///
    /// The only hard requirement is a top-level `products` array. Documents
    /// written by the older Gist integration nest the dataset under `data`
    /// and are unwrapped first.
    pub fn parse(bytes: &[u8]) -> BackupResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| BackupError::InvalidBackupFormat(format!("not valid JSON: {}", e)))?;

        let value = unwrap_legacy_envelope(value);

        let object = value
            .as_object()
            .ok_or_else(|| BackupError::InvalidBackupFormat("expected a JSON object".into()))?;

        match object.get("products") {
            Some(Value::Array(_)) => {}
            Some(_) => {
                return Err(BackupError::InvalidBackupFormat(
                    "`products` is not an array".into(),
                ))
            }
            None => {
                return Err(BackupError::InvalidBackupFormat(
                    "missing `products` array".into(),
                ))
            }
        }

        serde_json::from_value(value)
            .map_err(|e| BackupError::InvalidBackupFormat(e.to_string()))
    }

    /// Creation time written inside a stored payload, if any
    ///
    /// Reads `backupInfo.created`, or `created` of the older Gist envelope.
    pub fn embedded_created(bytes: &[u8]) -> Option<DateTime<Utc>> {
        let stamps: EmbeddedStamps = serde_json::from_slice(bytes).ok()?;
        stamps.backup_info.map(|info| info.created).or(stamps.created)
    }

    /// Extract the dataset part of the document
    pub fn into_dataset(self) -> Dataset {
        Dataset {
            products: self.products,
            sales: self.sales,
            settings: self.settings,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddedStamps {
    #[serde(default)]
    backup_info: Option<CreatedOnly>,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct CreatedOnly {
    created: DateTime<Utc>,
}

/// `{ version, created, description, data: { products, .. } }` -> `data`
fn unwrap_legacy_envelope(value: Value) -> Value {
    let is_legacy = value
        .as_object()
        .map(|o| !o.contains_key("products") && o.get("data").map_or(false, Value::is_object))
        .unwrap_or(false);

    if !is_legacy {
        return value;
    }

    match value {
        Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}
