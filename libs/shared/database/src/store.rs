// libs/shared/database/src/store.rs
use std::cmp::Ordering;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Field holding the storage id of every document.
pub const ID_FIELD: &str = "id";

// ==============================================================================
// DOCUMENTS AND CURSORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self { id: id.into(), data }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone())
            .with_context(|| format!("Malformed document {}", self.id))
    }

    /// Position of this document in a result set ordered by `field`.
    pub fn cursor(&self, field: &str) -> Cursor {
        Cursor {
            document_id: self.id.clone(),
            order_value: self.get(field).cloned().unwrap_or(Value::Null),
        }
    }
}

/// Resume point for `start_after` pagination: the order-field value and the
/// id of the last document already returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub document_id: String,
    pub order_value: Value,
}

// ==============================================================================
// QUERY MODEL
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn field(&self) -> &str {
        match self {
            Filter::Eq(field, _)
            | Filter::Gt(field, _)
            | Filter::Gte(field, _)
            | Filter::Lt(field, _)
            | Filter::Lte(field, _)
            | Filter::In(field, _) => field,
        }
    }

    /// Evaluates the predicate against a document body. A missing field never
    /// matches, and neither do values of different JSON types.
    pub fn matches(&self, data: &Value) -> bool {
        let Some(actual) = data.get(self.field()) else {
            return false;
        };

        match self {
            Filter::Eq(_, expected) => compare_values(actual, expected) == Some(Ordering::Equal),
            Filter::Gt(_, bound) => compare_values(actual, bound) == Some(Ordering::Greater),
            Filter::Gte(_, bound) => matches!(
                compare_values(actual, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Filter::Lt(_, bound) => compare_values(actual, bound) == Some(Ordering::Less),
            Filter::Lte(_, bound) => matches!(
                compare_values(actual, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Filter::In(_, candidates) => candidates
                .iter()
                .any(|candidate| compare_values(actual, candidate) == Some(Ordering::Equal)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A single-collection query. Results are totally ordered: ties on the order
/// field fall back to the document id in the same direction, and without an
/// explicit order documents come back by ascending id.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
    pub start_after: Option<Cursor>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order: None,
            limit: None,
            start_after: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value.into()));
        self
    }

    pub fn where_gt(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gt(field.to_string(), value.into()));
        self
    }

    pub fn where_gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(field.to_string(), value.into()));
        self
    }

    pub fn where_lt(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lt(field.to_string(), value.into()));
        self
    }

    pub fn where_lte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lte(field.to_string(), value.into()));
        self
    }

    pub fn where_in<V: Into<Value>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filters.push(Filter::In(field.to_string(), values));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, cursor: Option<Cursor>) -> Self {
        self.start_after = cursor;
        self
    }

    pub fn matches(&self, data: &Value) -> bool {
        self.filters.iter().all(|filter| filter.matches(data))
    }

    /// Compares two documents under this query's ordering.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        self.compare_positions(
            a.get(self.order_field()).unwrap_or(&Value::Null),
            &a.id,
            b.get(self.order_field()).unwrap_or(&Value::Null),
            &b.id,
        )
    }

    /// True when `document` sorts strictly after the `start_after` cursor.
    pub fn is_after_cursor(&self, document: &Document) -> bool {
        match &self.start_after {
            None => true,
            Some(cursor) => {
                let value = document.get(self.order_field()).unwrap_or(&Value::Null);
                self.compare_positions(value, &document.id, &cursor.order_value, &cursor.document_id)
                    == Ordering::Greater
            }
        }
    }

    fn order_field(&self) -> &str {
        self.order.as_ref().map(|order| order.field.as_str()).unwrap_or(ID_FIELD)
    }

    fn direction(&self) -> Direction {
        self.order.as_ref().map(|order| order.direction).unwrap_or(Direction::Ascending)
    }

    fn compare_positions(&self, a_value: &Value, a_id: &str, b_value: &Value, b_id: &str) -> Ordering {
        let by_value = if self.order.is_some() {
            compare_values(a_value, b_value).unwrap_or(Ordering::Equal)
        } else {
            Ordering::Equal
        };
        self.direction().apply(by_value.then_with(|| a_id.cmp(b_id)))
    }
}

/// Orders two JSON scalars of the same type. Mixed types are unordered.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        _ => None,
    }
}

// ==============================================================================
// STORE TRAIT
// ==============================================================================

/// A schemaless document store addressed by collection name and document id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts `data` under a freshly generated id and returns that id.
    async fn add(&self, collection: &str, data: Value) -> Result<String>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Replaces the whole document at `id`, creating it if absent.
    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>>;
}
