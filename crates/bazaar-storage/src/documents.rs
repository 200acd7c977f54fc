//! Marketplace document store.
//!
//! Documents are JSON bodies grouped by [`Collection`]. Reads take a parsed
//! [`Filter`]; top-level scalar equalities are pushed down into SQL via
//! `json_extract`, and the full filter is then evaluated in Rust.

use std::sync::Arc;

use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use tracing::debug;

use bazaar_core::error::BazaarError;
use bazaar_core::types::Collection;

use crate::db::{storage_err, Database};
use crate::filter::{Filter, Projection, SortSpec};

/// Cursor options for [`DocumentStore::find`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: Option<SortSpec>,
    /// `None` returns every matching document.
    pub limit: Option<usize>,
}

/// Repository for the queryable marketplace collections.
pub struct DocumentStore {
    db: Arc<Database>,
}

impl DocumentStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a single document. Returns its storage sequence number.
    pub fn insert_one(&self, collection: Collection, doc: &Value) -> Result<i64, BazaarError> {
        ensure_object(doc)?;
        let body = serde_json::to_string(doc)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO documents (collection, body) VALUES (?1, ?2)",
                rusqlite::params![collection.as_str(), body],
            )
            .map_err(storage_err("Failed to insert document"))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Insert many documents in one transaction.
    pub fn insert_many(&self, collection: Collection, docs: &[Value]) -> Result<usize, BazaarError> {
        let mut bodies = Vec::with_capacity(docs.len());
        for doc in docs {
            ensure_object(doc)?;
            bodies.push(serde_json::to_string(doc)?);
        }

        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(storage_err("Failed to begin transaction"))?;
            {
                let mut stmt = tx
                    .prepare("INSERT INTO documents (collection, body) VALUES (?1, ?2)")
                    .map_err(storage_err("Failed to prepare insert"))?;
                for body in &bodies {
                    stmt.execute(rusqlite::params![collection.as_str(), body])
                        .map_err(storage_err("Failed to insert document"))?;
                }
            }
            tx.commit().map_err(storage_err("Failed to commit documents"))?;
            Ok(bodies.len())
        })
    }

    /// Remove every document in `collection`. Returns the number removed.
    pub fn clear(&self, collection: Collection) -> Result<usize, BazaarError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM documents WHERE collection = ?1",
                rusqlite::params![collection.as_str()],
            )
            .map_err(storage_err("Failed to clear collection"))
        })
    }

    /// All matching documents, sorted, limited and then projected.
    ///
    /// Sorting happens before projection so a sort key need not survive the
    /// projection.
    pub fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>, BazaarError> {
        let mut docs = self.scan(collection, filter)?;

        if let Some(sort) = &options.sort {
            docs.sort_by(|a, b| sort.compare(a, b));
        }
        if let Some(limit) = options.limit {
            docs.truncate(limit);
        }
        if let Some(projection) = &options.projection {
            docs = docs.iter().map(|d| projection.apply(d)).collect();
        }

        debug!(collection = %collection, returned = docs.len(), "find");
        Ok(docs)
    }

    /// First matching document (in sort order when a sort is given).
    pub fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
        projection: Option<&Projection>,
        sort: Option<&SortSpec>,
    ) -> Result<Option<Value>, BazaarError> {
        let docs = self.scan(collection, filter)?;
        let first = match sort {
            Some(sort) => docs.into_iter().min_by(|a, b| sort.compare(a, b)),
            None => docs.into_iter().next(),
        };
        Ok(first.map(|doc| match projection {
            Some(p) => p.apply(&doc),
            None => doc,
        }))
    }

    /// Number of matching documents.
    pub fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, BazaarError> {
        Ok(self.scan(collection, filter)?.len() as u64)
    }

    /// Load candidate rows (narrowed by pushed-down equalities) and keep the
    /// ones the full filter accepts, in insertion order.
    fn scan(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>, BazaarError> {
        let hints = filter.equality_hints();

        let mut sql = String::from("SELECT body FROM documents WHERE collection = ?1");
        let mut params: Vec<SqlValue> = vec![SqlValue::Text(collection.as_str().to_string())];
        for (field, value) in &hints {
            let Some(bound) = to_sql(value) else {
                continue;
            };
            params.push(bound);
            sql.push_str(&format!(
                " AND json_extract(body, '$.{}') = ?{}",
                field,
                params.len()
            ));
        }
        sql.push_str(" ORDER BY seq ASC");

        let bodies: Vec<String> = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(storage_err("Failed to prepare document scan"))?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    row.get::<_, String>(0)
                })
                .map_err(storage_err("Failed to scan documents"))?;
            let mut bodies = Vec::new();
            for row in rows {
                bodies.push(row.map_err(storage_err("Failed to read document row"))?);
            }
            Ok(bodies)
        })?;

        let mut docs = Vec::with_capacity(bodies.len());
        for body in bodies {
            let doc: Value = serde_json::from_str(&body)?;
            if filter.matches(&doc) {
                docs.push(doc);
            }
        }
        Ok(docs)
    }
}

fn ensure_object(doc: &Value) -> Result<(), BazaarError> {
    if doc.is_object() {
        Ok(())
    } else {
        Err(BazaarError::InvalidQuery(
            "documents must be JSON objects".to_string(),
        ))
    }
}

/// SQL binding for a pushed-down equality. JSON booleans come back from
/// `json_extract` as integers.
fn to_sql(value: &Value) -> Option<SqlValue> {
    match value {
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(SqlValue::Integer(i)),
            None => n.as_f64().map(SqlValue::Real),
        },
        _ => None,
    }
}
