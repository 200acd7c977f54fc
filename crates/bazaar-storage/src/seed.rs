//! Bulk import of marketplace documents.
//!
//! Two sources are supported. A JSON object keyed by collection name, each
//! value an array of document objects:
//!
//! ```json
//! { "accounts": [{"id": 42, "email": "a@b.com"}], "orders": [...] }
//! ```
//!
//! Or a directory of the marketplace data set's CSV exports
//! (`users.csv`, `orders.csv`, ...), whose numeric columns are coerced per
//! collection so owner fields compare as integers.
//!
//! Every input is parsed and validated before anything is written, so a bad
//! key or cell leaves the store untouched.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Number, Value};
use tracing::{info, warn};

use bazaar_core::error::BazaarError;
use bazaar_core::types::Collection;

use crate::documents::DocumentStore;

/// Documents inserted per collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: BTreeMap<String, usize>,
}

impl SeedReport {
    pub fn total(&self) -> usize {
        self.inserted.values().sum()
    }
}

/// Load a seed document already parsed into JSON.
pub fn seed_from_json(store: &DocumentStore, data: &Value) -> Result<SeedReport, BazaarError> {
    let Value::Object(map) = data else {
        return Err(BazaarError::InvalidQuery(
            "seed data must be an object keyed by collection".to_string(),
        ));
    };

    let mut batches = Vec::with_capacity(map.len());
    for (name, docs) in map {
        let collection = Collection::parse(name).ok_or_else(|| {
            BazaarError::InvalidQuery(format!("unknown collection '{}'", name))
        })?;
        let Value::Array(docs) = docs else {
            return Err(BazaarError::InvalidQuery(format!(
                "collection '{}' must map to an array of documents",
                name
            )));
        };
        batches.push((collection, docs));
    }

    let mut report = SeedReport::default();
    for (collection, docs) in batches {
        let n = store.insert_many(collection, docs)?;
        info!(collection = %collection, inserted = n, "Seeded collection");
        *report.inserted.entry(collection.to_string()).or_default() += n;
    }
    Ok(report)
}

/// Read and load a seed file from disk.
pub fn seed_from_file(store: &DocumentStore, path: &Path) -> Result<SeedReport, BazaarError> {
    let contents = std::fs::read_to_string(path)?;
    let data: Value = serde_json::from_str(&contents)?;
    seed_from_json(store, &data)
}

// =============================================================================
// CSV data set
// =============================================================================

/// CSV export file and its target collection, in import order.
const CSV_FILES: [(&str, Collection); 6] = [
    ("distribution_centers.csv", Collection::DistributionCenters),
    ("products.csv", Collection::Products),
    ("inventory_items.csv", Collection::InventoryItems),
    ("users.csv", Collection::Accounts),
    ("orders.csv", Collection::Orders),
    ("order_items.csv", Collection::OrderItems),
];

/// Rows written per insert transaction.
const CSV_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cast {
    Int,
    Float,
}

/// Numeric columns per collection. Everything else stays a string.
fn numeric_columns(collection: Collection) -> &'static [(&'static str, Cast)] {
    use Cast::{Float, Int};
    match collection {
        Collection::DistributionCenters => &[("id", Int), ("latitude", Float), ("longitude", Float)],
        Collection::InventoryItems => &[
            ("id", Int),
            ("product_id", Int),
            ("cost", Float),
            ("product_retail_price", Float),
            ("product_distribution_center_id", Int),
        ],
        Collection::OrderItems => &[
            ("id", Int),
            ("order_id", Int),
            ("user_id", Int),
            ("product_id", Int),
            ("inventory_item_id", Int),
        ],
        Collection::Orders => &[("order_id", Int), ("user_id", Int), ("num_of_item", Int)],
        Collection::Products => &[
            ("id", Int),
            ("cost", Float),
            ("retail_price", Float),
            ("distribution_center_id", Int),
        ],
        Collection::Accounts => &[
            ("id", Int),
            ("age", Int),
            ("latitude", Float),
            ("longitude", Float),
        ],
    }
}

/// Convert one CSV cell. Empty cells are kept as empty strings.
fn coerce_cell(collection: Collection, column: &str, raw: &str) -> Result<Value, String> {
    let cast = numeric_columns(collection)
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, cast)| *cast);
    let trimmed = raw.trim();
    let Some(cast) = cast.filter(|_| !trimmed.is_empty()) else {
        return Ok(Value::String(raw.to_string()));
    };

    match cast {
        Cast::Int => {
            if let Ok(n) = trimmed.parse::<i64>() {
                return Ok(Value::from(n));
            }
            // "42.0" style exports truncate like an integer parse would.
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Value::from(f.trunc() as i64)),
                _ => Err(format!("column '{}' is not an integer: {:?}", column, raw)),
            }
        }
        Cast::Float => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("column '{}' is not a number: {:?}", column, raw)),
    }
}

fn csv_err(path: &Path) -> impl Fn(csv::Error) -> BazaarError + '_ {
    move |e| BazaarError::Serialization(format!("{}: {}", path.display(), e))
}

/// Parse one CSV export into documents for `collection`.
fn read_csv(path: &Path, collection: Collection) -> Result<Vec<Value>, BazaarError> {
    let mut reader = csv::Reader::from_path(path).map_err(csv_err(path))?;
    let headers = reader.headers().map_err(csv_err(path))?.clone();

    let mut docs = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err(path))?;
        let mut doc = Map::new();
        for (column, raw) in headers.iter().zip(record.iter()) {
            let value = coerce_cell(collection, column, raw).map_err(|msg| {
                // Row numbers count the header line.
                BazaarError::InvalidQuery(format!("{} row {}: {}", path.display(), index + 2, msg))
            })?;
            doc.insert(column.to_string(), value);
        }
        docs.push(Value::Object(doc));
    }
    Ok(docs)
}

/// Import the CSV exports found in `dir`, replacing each imported collection.
///
/// Missing files are skipped with a warning; a directory without any of them
/// is an error.
pub fn seed_from_csv_dir(store: &DocumentStore, dir: &Path) -> Result<SeedReport, BazaarError> {
    if !dir.is_dir() {
        return Err(BazaarError::NotFound(format!(
            "seed directory {}",
            dir.display()
        )));
    }

    let mut batches = Vec::new();
    for (file, collection) in CSV_FILES {
        let path = dir.join(file);
        if !path.is_file() {
            warn!(path = %path.display(), "CSV file not found, skipping");
            continue;
        }
        let docs = read_csv(&path, collection)?;
        info!(path = %path.display(), rows = docs.len(), "Parsed CSV file");
        batches.push((collection, docs));
    }
    if batches.is_empty() {
        return Err(BazaarError::InvalidQuery(format!(
            "no marketplace CSV files found in {}",
            dir.display()
        )));
    }

    let mut report = SeedReport::default();
    for (collection, docs) in batches {
        let cleared = store.clear(collection)?;
        if cleared > 0 {
            info!(collection = %collection, cleared, "Cleared existing documents");
        }
        let mut inserted = 0;
        for chunk in docs.chunks(CSV_BATCH_SIZE) {
            inserted += store.insert_many(collection, chunk)?;
        }
        info!(collection = %collection, inserted, "Seeded collection");
        report.inserted.insert(collection.to_string(), inserted);
    }
    Ok(report)
}
