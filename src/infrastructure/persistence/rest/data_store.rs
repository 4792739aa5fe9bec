//! # REST Data Store
//!
//! [`DataStore`] over a PostgREST-style HTTP API, the interface hosted
//! Postgres backends expose.
//!
//! | Operation | Request                                                  |
//! |-----------|----------------------------------------------------------|
//! | get       | `GET /{table}?id=eq.{id}&limit=1`                        |
//! | query     | `GET /{table}?{field}=eq.{v}&order={f}.desc&limit=..`    |
//! | insert    | `POST /{table}` with `Prefer: return=representation`     |
//! | update    | `PATCH /{table}?id=eq.{id}&version=eq.{n}`               |
//!
//! The backend owns `seq` as an identity column. An update guarded by a
//! version that matches no row is told apart from a missing row by a
//! follow-up read.

use crate::infrastructure::persistence::traits::{
    Condition, DataStore, Filter, FilterValue, RepositoryError, RepositoryResult, Row, SEQ_FIELD,
    Table, VERSION_FIELD, row_version,
};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

/// PostgREST-backed implementation of [`DataStore`].
///
/// # Examples
///
/// ```ignore
/// use dealdesk::infrastructure::persistence::rest::RestDataStore;
///
/// let store = RestDataStore::new("https://db.example.com/rest/v1", Some("anon-key"), 5000)?;
/// ```
#[derive(Debug, Clone)]
pub struct RestDataStore {
    client: Client,
    base_url: String,
    timeout_ms: u64,
}

impl RestDataStore {
    /// Creates a store rooted at `base_url`.
    ///
    /// With an API key, every request carries it both as `apikey` and as a
    /// bearer token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Internal` if the key is not a valid header
    /// value or the client cannot be built.
    pub fn new(base_url: &str, api_key: Option<&str>, timeout_ms: u64) -> RepositoryResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let apikey = HeaderValue::from_str(key)
                .map_err(|e| RepositoryError::internal(format!("invalid api key: {e}")))?;
            let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| RepositoryError::internal(format!("invalid api key: {e}")))?;
            headers.insert("apikey", apikey);
            headers.insert(AUTHORIZATION, bearer);
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                RepositoryError::internal(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms,
        })
    }

    /// Returns the configured timeout in milliseconds.
    #[inline]
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    fn url(&self, table: Table) -> String {
        format!("{}/{}", self.base_url, table)
    }

    /// Checks status and decodes a JSON array of rows.
    async fn handle_rows(&self, table: Table, response: Response) -> RepositoryResult<Vec<Row>> {
        let status = response.status();
        if status.is_success() {
            response.json::<Vec<Row>>().await.map_err(|e| {
                RepositoryError::serialization(format!("Failed to parse response: {}", e))
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(map_status_error(table, status, &body))
        }
    }
}

#[async_trait]
impl DataStore for RestDataStore {
    async fn get(&self, table: Table, id: &str) -> RepositoryResult<Option<Row>> {
        let response = self
            .client
            .get(self.url(table))
            .query(&[("id", format!("eq.{id}")), ("limit", "1".to_string())])
            .send()
            .await
            .map_err(map_reqwest_error)?;

        Ok(self.handle_rows(table, response).await?.into_iter().next())
    }

    async fn query(&self, table: Table, filter: &Filter) -> RepositoryResult<Vec<Row>> {
        let response = self
            .client
            .get(self.url(table))
            .query(&query_params(filter))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        self.handle_rows(table, response).await
    }

    async fn insert(&self, table: Table, mut row: Row) -> RepositoryResult<Row> {
        row.remove(SEQ_FIELD);
        let id = row
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_default();

        let response = self
            .client
            .post(self.url(table))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if response.status() == StatusCode::CONFLICT {
            return Err(RepositoryError::duplicate(table.entity_type(), id));
        }
        self.handle_rows(table, response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RepositoryError::serialization("insert returned no row"))
    }

    async fn update(
        &self,
        table: Table,
        id: &str,
        mut patch: Row,
        expected_version: Option<u64>,
    ) -> RepositoryResult<Row> {
        patch.remove(SEQ_FIELD);
        patch.remove("id");

        let mut params = vec![("id".to_string(), format!("eq.{id}"))];
        if let Some(expected) = expected_version {
            params.push((VERSION_FIELD.to_string(), format!("eq.{expected}")));
        }

        let response = self
            .client
            .patch(self.url(table))
            .query(&params)
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if let Some(row) = self.handle_rows(table, response).await?.into_iter().next() {
            return Ok(row);
        }

        match (self.get(table, id).await?, expected_version) {
            (None, _) => Err(RepositoryError::not_found(table.entity_type(), id)),
            (Some(current), Some(expected)) => Err(RepositoryError::version_conflict(
                table.entity_type(),
                id,
                expected,
                row_version(&current),
            )),
            (Some(_), None) => Err(RepositoryError::internal(format!(
                "update of {table}/{id} matched no row"
            ))),
        }
    }
}

/// Translates a filter into PostgREST query parameters.
fn query_params(filter: &Filter) -> Vec<(String, String)> {
    let mut params = Vec::new();
    for condition in filter.conditions() {
        match condition {
            Condition::Eq { field, value } => {
                params.push((field.clone(), format!("eq.{}", value.to_query_string())));
            }
            Condition::In { field, values } => {
                let list = values
                    .iter()
                    .map(quote_list_item)
                    .collect::<Vec<_>>()
                    .join(",");
                params.push((field.clone(), format!("in.({list})")));
            }
            Condition::Gte { field, value } => {
                params.push((field.clone(), format!("gte.{}", value.to_query_string())));
            }
            Condition::Lte { field, value } => {
                params.push((field.clone(), format!("lte.{}", value.to_query_string())));
            }
            Condition::Search { fields, term } => {
                let term = term.replace([',', '(', ')', '*'], " ");
                let any = fields
                    .iter()
                    .map(|f| format!("{f}.ilike.*{term}*"))
                    .collect::<Vec<_>>()
                    .join(",");
                params.push(("or".to_string(), format!("({any})")));
            }
        }
    }

    let mut order: Vec<String> = filter
        .ordering()
        .iter()
        .map(|(field, dir)| format!("{field}.{}", dir.as_str()))
        .collect();
    order.push(format!("{SEQ_FIELD}.asc"));
    params.push(("order".to_string(), order.join(",")));

    if let Some(limit) = filter.limit_value() {
        params.push(("limit".to_string(), limit.to_string()));
    }
    if let Some(offset) = filter.offset_value() {
        params.push(("offset".to_string(), offset.to_string()));
    }
    params
}

fn quote_list_item(value: &FilterValue) -> String {
    match value {
        FilterValue::Text(s) => format!("\"{}\"", s.replace('"', "\\\"")),
        other => other.to_query_string(),
    }
}

/// Maps a reqwest error to a RepositoryError.
fn map_reqwest_error(error: reqwest::Error) -> RepositoryError {
    if error.is_timeout() {
        RepositoryError::timeout("Request timed out")
    } else if error.is_connect() {
        RepositoryError::connection(format!("Connection failed: {}", error))
    } else if error.is_decode() {
        RepositoryError::serialization(error.to_string())
    } else {
        RepositoryError::connection(format!("HTTP request failed: {}", error))
    }
}

/// Maps an HTTP status code to a RepositoryError.
fn map_status_error(table: Table, status: StatusCode, body: &str) -> RepositoryError {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            RepositoryError::timeout(format!("{table}: {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE => {
            RepositoryError::connection(format!("Server error ({}): {}", status, body))
        }
        _ => RepositoryError::query(format!("HTTP error ({}) on {}: {}", status, table, body)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::traits::SortOrder;
    use serde_json::{Value, json};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => Row::new(),
        }
    }

    async fn store(server: &MockServer) -> RestDataStore {
        RestDataStore::new(&server.uri(), Some("secret"), 2000).unwrap()
    }

    mod params {
        use super::*;

        #[test]
        fn filter_translates_to_postgrest() {
            let filter = Filter::new()
                .eq("artist_id", "artist-1")
                .in_values("status", ["proposed", "negotiating"])
                .gte("proposed_fee", rust_decimal::Decimal::new(500, 0))
                .order_by("created_at", SortOrder::Desc)
                .limit(20)
                .offset(40);
            let params = query_params(&filter);
            assert!(params.contains(&("artist_id".into(), "eq.artist-1".into())));
            assert!(params.contains(&("status".into(), "in.(\"proposed\",\"negotiating\")".into())));
            assert!(params.contains(&("proposed_fee".into(), "gte.500".into())));
            assert!(params.contains(&("order".into(), "created_at.desc,seq.asc".into())));
            assert!(params.contains(&("limit".into(), "20".into())));
            assert!(params.contains(&("offset".into(), "40".into())));
        }

        #[test]
        fn search_uses_or_ilike() {
            let params = query_params(&Filter::new().search(["title", "description"], "late"));
            assert!(params.contains(&(
                "or".into(),
                "(title.ilike.*late*,description.ilike.*late*)".into()
            )));
        }
    }

    mod requests {
        use super::*;

        #[tokio::test]
        async fn get_sends_key_and_returns_first_row() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/deal_negotiations"))
                .and(query_param("id", "eq.d1"))
                .and(header("apikey", "secret"))
                .and(header("authorization", "Bearer secret"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!([{"id": "d1", "seq": 3}])),
                )
                .mount(&server)
                .await;

            let found = store(&server)
                .await
                .get(Table::DealNegotiations, "d1")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(found["seq"], 3);
        }

        #[tokio::test]
        async fn get_missing_is_none() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/deal_messages"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
                .mount(&server)
                .await;

            let found = store(&server)
                .await
                .get(Table::DealMessages, "nope")
                .await
                .unwrap();
            assert!(found.is_none());
        }

        #[tokio::test]
        async fn insert_conflict_is_duplicate() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/deal_messages"))
                .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
                .mount(&server)
                .await;

            let err = store(&server)
                .await
                .insert(Table::DealMessages, row(json!({"id": "m1"})))
                .await
                .unwrap_err();
            assert!(err.is_duplicate());
        }

        #[tokio::test]
        async fn insert_returns_representation() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/deal_messages"))
                .and(header("prefer", "return=representation"))
                .and(body_partial_json(json!({"id": "m1"})))
                .respond_with(
                    ResponseTemplate::new(201).set_body_json(json!([{"id": "m1", "seq": 9}])),
                )
                .mount(&server)
                .await;

            let stored = store(&server)
                .await
                .insert(Table::DealMessages, row(json!({"id": "m1", "seq": 0})))
                .await
                .unwrap();
            assert_eq!(stored["seq"], 9);
        }

        #[tokio::test]
        async fn guarded_update_reports_conflict() {
            let server = MockServer::start().await;
            Mock::given(method("PATCH"))
                .and(path("/deal_negotiations"))
                .and(query_param("version", "eq.1"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/deal_negotiations"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!([{"id": "d1", "version": 2}])),
                )
                .mount(&server)
                .await;

            let err = store(&server)
                .await
                .update(Table::DealNegotiations, "d1", row(json!({"version": 2})), Some(1))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                RepositoryError::VersionConflict {
                    expected: 1,
                    actual: 2,
                    ..
                }
            ));
        }

        #[tokio::test]
        async fn server_errors_are_retryable() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(503))
                .mount(&server)
                .await;

            let err = store(&server)
                .await
                .query(Table::DealNegotiations, &Filter::new())
                .await
                .unwrap_err();
            assert!(err.is_retryable());
        }

        #[tokio::test]
        async fn bad_request_is_not_retryable() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(400).set_body_string("bad column"))
                .mount(&server)
                .await;

            let err = store(&server)
                .await
                .query(Table::DealNegotiations, &Filter::new())
                .await
                .unwrap_err();
            assert!(!err.is_retryable());
            assert!(err.to_string().contains("bad column"));
        }
    }
}
