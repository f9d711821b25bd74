//! ESM collection catalogs (the format served by the Pangeo CMIP6 archive).
//!
//! A collection is a JSON descriptor pointing at a CSV table with one row per
//! dataset. One column of that table (the "asset" column, `zstore` for
//! Pangeo) holds the storage location of each dataset.

pub mod entry;
pub mod search;

use std::collections::BTreeMap;
use std::io::Read;

use flate2::read::GzDecoder;
use log::info;
use serde::Deserialize;
use thiserror::Error;

pub use entry::{CatalogEntry, VariantLabel};
pub use search::{MemberPolicy, Query, search, select_members};

use crate::readers::DEFAULT_GCS_ENDPOINT;

pub const PANGEO_CMIP6_URL: &str = "https://storage.googleapis.com/cmip6/pangeo-cmip6.json";

/// Columns every catalog table must provide.
const REQUIRED_COLUMNS: [&str; 5] = [
    "source_id",
    "experiment_id",
    "variable_id",
    "grid_label",
    "member_id",
];

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid collection descriptor: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid catalog table: {0}")]
    Csv(#[from] csv::Error),
    #[error("catalog table has no '{0}' column")]
    MissingColumn(String),
}

#[derive(Debug, Deserialize)]
struct EsmCollection {
    #[serde(default)]
    id: String,
    catalog_file: String,
    assets: Assets,
}

#[derive(Debug, Deserialize)]
struct Assets {
    column_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Downloads the collection descriptor at `url` and the table it points to.
    pub fn fetch(url: &str) -> Result<Self, CatalogError> {
        let descriptor = read_resource(url)?;
        let collection: EsmCollection = serde_json::from_slice(&descriptor)?;

        let table_url = resolve_relative(url, &collection.catalog_file);
        info!(
            "Fetching catalog table '{}' from {}",
            collection.id, table_url
        );
        let table = read_resource(&table_url)?;

        Self::from_csv(decompress(table)?.as_slice(), &collection.assets.column_name)
    }

    /// Parses a catalog table; `asset_column` names the location column.
    pub fn from_csv<R: Read>(reader: R, asset_column: &str) -> Result<Self, CatalogError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();

        for column in REQUIRED_COLUMNS.iter().chain([&asset_column]) {
            if !headers.iter().any(|h| h == *column) {
                return Err(CatalogError::MissingColumn(column.to_string()));
            }
        }

        let mut entries = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let mut fields = BTreeMap::new();
            let mut location = String::new();
            for (column, value) in headers.iter().zip(record.iter()) {
                if column == asset_column {
                    location = value.to_string();
                } else {
                    fields.insert(column.to_string(), value.to_string());
                }
            }
            entries.push(CatalogEntry::new(fields, location));
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn search(&self, query: &Query) -> Catalog {
        Catalog::new(search(&self.entries, query))
    }

    pub fn select_members(&self, policy: &MemberPolicy) -> Catalog {
        Catalog::new(select_members(&self.entries, policy))
    }
}

/// Reads `location` over HTTP(S), from a public `gs://` bucket or from disk.
fn read_resource(location: &str) -> Result<Vec<u8>, CatalogError> {
    let url = match location.strip_prefix("gs://") {
        Some(rest) => format!("{}/{}", DEFAULT_GCS_ENDPOINT, rest),
        None => location.to_string(),
    };

    if url.starts_with("http://") || url.starts_with("https://") {
        let response = reqwest::blocking::get(&url)?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    } else {
        Ok(std::fs::read(&url)?)
    }
}

fn resolve_relative(base: &str, target: &str) -> String {
    if target.contains("://") || target.starts_with('/') {
        return target.to_string();
    }
    match base.rfind('/') {
        Some(idx) => format!("{}/{}", &base[..idx], target),
        None => target.to_string(),
    }
}

// Tables are sometimes published gzip-compressed
fn decompress(bytes: Vec<u8>) -> Result<Vec<u8>, CatalogError> {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut out = Vec::new();
        GzDecoder::new(bytes.as_slice()).read_to_end(&mut out)?;
        Ok(out)
    } else {
        Ok(bytes)
    }
}
