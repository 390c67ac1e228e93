use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::store::{Cursor, Direction, Document, DocumentStore, Filter, Query, ID_FIELD};

/// PostgREST-backed document store. Every collection is a table whose `id`
/// text column holds the document id; the remaining columns are the fields.
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_key: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    fn get_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.service_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers()?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                _ => anyhow!("API error ({}): {}", status, error_text),
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    fn rows_to_documents(rows: Vec<Value>) -> Result<Vec<Document>> {
        rows.into_iter()
            .map(|row| {
                let id = row
                    .get(ID_FIELD)
                    .and_then(id_to_string)
                    .ok_or_else(|| anyhow!("Row without id column: {}", row))?;
                Ok(Document::new(id, row))
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for SupabaseClient {
    async fn add(&self, collection: &str, data: Value) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let body = with_id(data, &id)?;

        let rows: Vec<Value> = self.request_with_headers(
            Method::POST,
            &format!("/rest/v1/{}", collection),
            Some(body),
            Some(Self::representation_headers()),
        ).await?;

        let created = Self::rows_to_documents(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Insert into {} returned no rows", collection))?;
        Ok(created.id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let path = format!(
            "/rest/v1/{}?id=eq.{}&limit=1",
            collection,
            urlencoding::encode(id)
        );
        let rows: Vec<Value> = self.request(Method::GET, &path, None).await?;
        Ok(Self::rows_to_documents(rows)?.into_iter().next())
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        let path = format!("/rest/v1/{}?id=eq.{}", collection, urlencoding::encode(id));
        let body = with_id(data, id)?;

        let _: Vec<Value> = self.request_with_headers(
            Method::PUT,
            &path,
            Some(body),
            Some(Self::representation_headers()),
        ).await?;
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let path = build_query_path(query);
        let rows: Vec<Value> = self.request(Method::GET, &path, None).await?;
        Self::rows_to_documents(rows)
    }
}

// ==============================================================================
// POSTGREST QUERY ENCODING
// ==============================================================================

pub fn build_query_path(query: &Query) -> String {
    let mut params: Vec<(String, String)> = query
        .filters
        .iter()
        .map(|filter| (filter.field().to_string(), encode_filter(filter)))
        .collect();

    let (order_field, direction) = match &query.order {
        Some(order) => (Some(order.field.as_str()), order.direction),
        None => (None, Direction::Ascending),
    };

    if let Some(cursor) = &query.start_after {
        params.push(encode_cursor(order_field, direction, cursor));
    }

    let suffix = match direction {
        Direction::Ascending => "asc",
        Direction::Descending => "desc",
    };
    let order = match order_field {
        Some(field) => format!("{field}.{suffix},id.{suffix}"),
        None => format!("id.{suffix}"),
    };
    params.push(("order".to_string(), order));

    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }

    let query_string = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    format!("/rest/v1/{}?{}", query.collection, query_string)
}

fn encode_filter(filter: &Filter) -> String {
    match filter {
        Filter::Eq(_, value) => format!("eq.{}", literal(value, false)),
        Filter::Gt(_, value) => format!("gt.{}", literal(value, false)),
        Filter::Gte(_, value) => format!("gte.{}", literal(value, false)),
        Filter::Lt(_, value) => format!("lt.{}", literal(value, false)),
        Filter::Lte(_, value) => format!("lte.{}", literal(value, false)),
        Filter::In(_, values) => {
            let items: Vec<String> = values.iter().map(|value| literal(value, true)).collect();
            format!("in.({})", items.join(","))
        }
    }
}

/// Keyset condition selecting rows strictly after `cursor`.
fn encode_cursor(order_field: Option<&str>, direction: Direction, cursor: &Cursor) -> (String, String) {
    let op = match direction {
        Direction::Ascending => "gt",
        Direction::Descending => "lt",
    };
    let id = literal(&Value::String(cursor.document_id.clone()), true);

    match order_field {
        Some(field) => {
            let value = literal(&cursor.order_value, true);
            (
                "or".to_string(),
                format!("({field}.{op}.{value},and({field}.eq.{value},id.{op}.{id}))"),
            )
        }
        None => ("id".to_string(), format!("{}.{}", op, literal(&Value::String(cursor.document_id.clone()), false))),
    }
}

/// Renders a JSON scalar as a PostgREST literal. Inside lists and logic
/// trees strings are double-quoted so reserved characters survive.
fn literal(value: &Value, quoted: bool) -> String {
    match value {
        Value::String(s) if quoted => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn with_id(data: Value, id: &str) -> Result<Value> {
    match data {
        Value::Object(mut map) => {
            map.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
            Ok(Value::Object(map))
        }
        other => Err(anyhow!("Documents must be JSON objects, got {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_filters_order_and_limit() {
        let query = Query::collection("appointments")
            .where_eq("patient_id", "p1")
            .where_gte("selected_date", 1000)
            .where_in("approval_status", ["approved", "rejected"])
            .order_by("selected_date", Direction::Descending)
            .limit(10);

        let path = build_query_path(&query);
        assert_eq!(
            path,
            "/rest/v1/appointments?patient_id=eq.p1&selected_date=gte.1000\
             &approval_status=in.%28%22approved%22%2C%22rejected%22%29\
             &order=selected_date.desc%2Cid.desc&limit=10"
        );
    }

    #[test]
    fn encodes_cursor_as_keyset_filter() {
        let cursor = Cursor { document_id: "doc-9".into(), order_value: json!(500) };
        let (key, value) = encode_cursor(Some("selected_date"), Direction::Descending, &cursor);

        assert_eq!(key, "or");
        assert_eq!(value, "(selected_date.lt.500,and(selected_date.eq.500,id.lt.\"doc-9\"))");
    }

    #[test]
    fn with_id_rejects_non_objects() {
        assert!(with_id(json!([1, 2]), "x").is_err());
        assert_eq!(with_id(json!({ "a": 1 }), "x").unwrap(), json!({ "a": 1, "id": "x" }));
    }
}
