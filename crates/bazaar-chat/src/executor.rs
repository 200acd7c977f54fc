//! Query descriptor validation and execution.
//!
//! Descriptors come from a non-deterministic generator, so nothing in them is
//! trusted. Collection and operation are checked against the closed
//! vocabularies, the filter is parsed (unknown operators rejected), and
//! account-owned collections are pinned to the caller's account before any
//! storage access happens.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use bazaar_core::types::{Collection, Operation, QueryDescriptor};
use bazaar_storage::{Condition, Filter, FindOptions, Projection, SortSpec};

use crate::error::ChatError;
use crate::store::DocumentReader;

/// Raw output of an executed descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultSet {
    Documents(Vec<Value>),
    Document(Option<Value>),
    Count(u64),
}

impl ResultSet {
    /// Number of results: documents returned, or the tally for a count.
    pub fn len(&self) -> usize {
        match self {
            ResultSet::Documents(docs) => docs.len(),
            ResultSet::Document(doc) => usize::from(doc.is_some()),
            ResultSet::Count(n) => *n as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// JSON shape returned to callers: an array, a document or null, or a
    /// number.
    pub fn to_json(&self) -> Value {
        match self {
            ResultSet::Documents(docs) => Value::Array(docs.clone()),
            ResultSet::Document(doc) => doc.clone().unwrap_or(Value::Null),
            ResultSet::Count(n) => json!(n),
        }
    }
}

/// A descriptor that passed validation, ready to run.
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    pub collection: Collection,
    pub operation: Operation,
    pub filter: Filter,
    pub projection: Option<Projection>,
    pub sort: Option<SortSpec>,
    pub limit: Option<usize>,
}

/// Validate a descriptor and pin it to `account_id`.
pub fn validate(descriptor: &QueryDescriptor, account_id: i64) -> Result<ValidatedQuery, ChatError> {
    let collection = Collection::parse(&descriptor.collection).ok_or_else(|| {
        ChatError::UnsupportedOperation(format!("unknown collection '{}'", descriptor.collection))
    })?;
    let operation = Operation::parse(&descriptor.operation).ok_or_else(|| {
        ChatError::UnsupportedOperation(format!("unknown operation '{}'", descriptor.operation))
    })?;
    if operation == Operation::Aggregate {
        return Err(ChatError::UnsupportedOperation(
            "aggregate pipelines are not supported".to_string(),
        ));
    }

    let mut filter = Filter::parse(&descriptor.filter).map_err(invalid_descriptor)?;
    if let Some(owner) = collection.owner_field() {
        check_scope(&filter, owner, account_id)?;
        filter = filter.and(Filter::eq(owner, json!(account_id)));
    }

    let projection = descriptor
        .projection
        .as_ref()
        .map(Projection::parse)
        .transpose()
        .map_err(invalid_descriptor)?;
    let sort = descriptor
        .sort
        .as_ref()
        .map(SortSpec::parse)
        .transpose()
        .map_err(invalid_descriptor)?;
    let limit = descriptor.limit.map(parse_limit).transpose()?.flatten();

    Ok(ValidatedQuery {
        collection,
        operation,
        filter,
        projection,
        sort,
        limit,
    })
}

fn invalid_descriptor(err: bazaar_core::error::BazaarError) -> ChatError {
    ChatError::UnsupportedOperation(err.to_string())
}

/// `0` means no limit.
fn parse_limit(limit: f64) -> Result<Option<usize>, ChatError> {
    if !limit.is_finite() || limit < 0.0 || limit.fract() != 0.0 {
        return Err(ChatError::UnsupportedOperation(format!(
            "limit must be a non-negative integer, got {}",
            limit
        )));
    }
    Ok(match limit as usize {
        0 => None,
        n => Some(n),
    })
}

/// Every condition on the owner field must pin it to `account_id`.
fn check_scope(filter: &Filter, owner: &str, account_id: i64) -> Result<(), ChatError> {
    for condition in filter.conditions_on(owner) {
        if !pins_to(condition, account_id) {
            warn!(owner, account_id, "Descriptor reaches outside the caller's account");
            return Err(ChatError::ScopeViolation(format!(
                "filter on {} does not match the caller's account",
                owner
            )));
        }
    }
    Ok(())
}

fn pins_to(condition: &Condition, account_id: i64) -> bool {
    match condition {
        Condition::Eq(value) => is_account(value, account_id),
        Condition::In(values) => {
            !values.is_empty() && values.iter().all(|v| is_account(v, account_id))
        }
        Condition::All(conditions) => conditions.iter().all(|c| pins_to(c, account_id)),
        _ => false,
    }
}

fn is_account(value: &Value, account_id: i64) -> bool {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i == account_id,
            None => n.as_f64() == Some(account_id as f64),
        },
        _ => false,
    }
}

/// Runs validated descriptors against the document store.
pub struct QueryExecutor {
    reader: Arc<dyn DocumentReader>,
}

impl QueryExecutor {
    pub fn new(reader: Arc<dyn DocumentReader>) -> Self {
        Self { reader }
    }

    /// Validate, scope and run a descriptor. Nothing reaches storage unless
    /// validation passes. No retries.
    pub async fn execute(
        &self,
        descriptor: &QueryDescriptor,
        account_id: i64,
    ) -> Result<ResultSet, ChatError> {
        let query = validate(descriptor, account_id)?;
        debug!(
            collection = %query.collection,
            operation = query.operation.as_str(),
            "Executing query"
        );

        let results = match query.operation {
            Operation::Find => {
                let options = FindOptions {
                    projection: query.projection,
                    sort: query.sort,
                    limit: query.limit,
                };
                ResultSet::Documents(self.reader.find(query.collection, query.filter, options).await?)
            }
            Operation::FindOne => ResultSet::Document(
                self.reader
                    .find_one(query.collection, query.filter, query.projection, query.sort)
                    .await?,
            ),
            Operation::Count => ResultSet::Count(self.reader.count(query.collection, query.filter).await?),
            Operation::Aggregate => {
                return Err(ChatError::UnsupportedOperation(
                    "aggregate pipelines are not supported".to_string(),
                ))
            }
        };
        Ok(results)
    }
}
