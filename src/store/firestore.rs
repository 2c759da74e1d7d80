//! # Firestore
//!
//! Production backend, spoken to over the Firestore REST API.
//!
//! ## Requests
//! - append: `POST {documents}/{collection}` with typed `fields`
//! - scan: `GET {documents}/{collection}?pageSize=N&pageToken=T`, one page in flight
//! - count: `POST {documents}:runAggregationQuery` with a `count` aggregation aliased `all`
//!
//! Firestore wraps every stored value in a type tag (`{"stringValue": "..."}`,
//! `{"integerValue": "42"}`, ...). Scalars are unwrapped into plain JSON on the
//! way in; anything else is kept as the raw tagged object and reads as a
//! non-string field.
//!
//! Bearer tokens are taken as configured. Minting or refreshing them happens
//! outside this service.
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{DocumentStore, Fields, Record, RecordId, RecordStream, StoreError, paginate};
use crate::config::FirestoreConfig;

pub const COUNT_ALIAS: &str = "all";

pub struct FirestoreStore {
    client: Client,
    documents_url: String,
    token: Option<String>,
    page_size: u32,
}

#[derive(Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregationReply {
    result: Option<AggregationResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregationResult {
    #[serde(default)]
    aggregate_fields: Map<String, Value>,
}

impl Document {
    fn id(&self) -> RecordId {
        RecordId::new(self.name.rsplit('/').next().unwrap_or(&self.name))
    }

    fn into_record(self) -> Record {
        let id = self.id();
        let fields = self
            .fields
            .iter()
            .map(|(key, value)| (key.clone(), decode_value(value)))
            .collect();

        Record::new(id, fields)
    }
}

impl FirestoreStore {
    pub fn new(client: Client, config: &FirestoreConfig) -> Self {
        let documents_url = format!(
            "{}/projects/{}/databases/{}/documents",
            config.base_url.trim_end_matches('/'),
            config.project_id,
            config.database,
        );

        Self {
            client,
            documents_url,
            token: config.token.clone(),
            page_size: config.page_size,
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{collection}", self.documents_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        authorize(request, self.token.as_deref())
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn append(&self, collection: &str, fields: Fields) -> Result<RecordId, StoreError> {
        let body = json!({ "fields": encode_fields(&fields) });

        let response = self
            .authorized(self.client.post(self.collection_url(collection)))
            .json(&body)
            .send()
            .await?;
        let document: Document = checked(response).await?.json().await?;

        Ok(document.id())
    }

    fn scan_all(&self, collection: &str) -> RecordStream {
        let client = self.client.clone();
        let url = self.collection_url(collection);
        let token = self.token.clone();
        let page_size = self.page_size;

        paginate(None, move |page_token| {
            next_page(client.clone(), url.clone(), token.clone(), page_size, page_token)
        })
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let body = json!({
            "structuredAggregationQuery": {
                "structuredQuery": { "from": [{ "collectionId": collection }] },
                "aggregations": [{ "alias": COUNT_ALIAS, "count": {} }],
            }
        });

        let response = self
            .authorized(
                self.client
                    .post(format!("{}:runAggregationQuery", self.documents_url)),
            )
            .json(&body)
            .send()
            .await?;
        let replies: Vec<AggregationReply> = checked(response).await?.json().await?;

        count_from_replies(replies)
    }
}

async fn next_page(
    client: Client,
    url: String,
    token: Option<String>,
    page_size: u32,
    page_token: Option<String>,
) -> Result<(Vec<Record>, Option<Option<String>>), StoreError> {
    let mut request = client.get(&url).query(&[("pageSize", page_size)]);
    if let Some(page_token) = &page_token {
        request = request.query(&[("pageToken", page_token)]);
    }

    let response = authorize(request, token.as_deref()).send().await?;
    let page: ListPage = checked(response).await?.json().await?;

    debug!("Fetched {} documents from {url}", page.documents.len());

    // an empty token marks the last page as well
    let next = page
        .next_page_token
        .filter(|token| !token.is_empty())
        .map(Some);
    let records = page.documents.into_iter().map(Document::into_record).collect();

    Ok((records, next))
}

fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

async fn checked(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status { status, body })
}

fn count_from_replies(replies: Vec<AggregationReply>) -> Result<u64, StoreError> {
    let count = replies
        .into_iter()
        .filter_map(|reply| reply.result)
        .find_map(|result| result.aggregate_fields.get(COUNT_ALIAS).cloned())
        .ok_or_else(|| StoreError::Decode(format!("no `{COUNT_ALIAS}` alias in count result")))?;

    match decode_value(&count) {
        Value::Number(number) => number
            .as_u64()
            .ok_or_else(|| StoreError::Decode(format!("count is not a natural number: {number}"))),
        other => Err(StoreError::Decode(format!("count is not an integer: {other}"))),
    }
}

pub fn encode_fields(fields: &Fields) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), json!({ "stringValue": value })))
        .collect()
}

pub fn decode_value(value: &Value) -> Value {
    if let Some(text) = value.get("stringValue").and_then(Value::as_str) {
        return Value::String(text.to_string());
    }

    // int64 travels as a decimal string
    if let Some(integer) = value
        .get("integerValue")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<i64>().ok())
    {
        return Value::from(integer);
    }

    if let Some(boolean) = value.get("booleanValue").and_then(Value::as_bool) {
        return Value::Bool(boolean);
    }

    if let Some(double) = value.get("doubleValue").and_then(Value::as_f64) {
        return Value::from(double);
    }

    if value.get("nullValue").is_some() {
        return Value::Null;
    }

    value.clone()
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use axum::{
        Json, Router,
        extract::{Query, State},
        http::{HeaderMap, StatusCode as HttpStatus, header::AUTHORIZATION},
        routing::get,
    };
    use futures::TryStreamExt;
    use tokio::net::TcpListener;

    use super::*;
    use crate::{
        flagged::{BOT_PROFILES, FlaggedStore},
        store::tally,
    };

    const DOCUMENTS: &str = "/v1/projects/bots/databases/stub/documents";

    fn document(id: &str, url: Value) -> Value {
        json!({
            "name": format!("projects/bots/databases/stub/documents/bot-profiles/{id}"),
            "fields": { "url": url }
        })
    }

    /// Three pages of bot-profiles: `a`, nothing, then `b` and `c`.
    async fn list_profiles(
        State(hits): State<Arc<AtomicUsize>>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> Result<Json<Value>, HttpStatus> {
        hits.fetch_add(1, Ordering::SeqCst);

        if headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) != Some("Bearer t0ken") {
            return Err(HttpStatus::UNAUTHORIZED);
        }
        if params.get("pageSize").map(String::as_str) != Some("1") {
            return Err(HttpStatus::BAD_REQUEST);
        }

        let page = match params.get("pageToken").map(String::as_str) {
            None => json!({
                "documents": [document("a", json!({ "stringValue": "http://a.example" }))],
                "nextPageToken": "t1"
            }),
            Some("t1") => json!({ "nextPageToken": "t2" }),
            Some("t2") => json!({
                "documents": [
                    document("b", json!({ "stringValue": "http://b.example" })),
                    document("c", json!({ "integerValue": "42" }))
                ]
            }),
            Some(_) => return Err(HttpStatus::BAD_REQUEST),
        };

        Ok(Json(page))
    }

    async fn create_profile(Json(body): Json<Value>) -> Result<Json<Value>, HttpStatus> {
        if body["fields"]["url"]["stringValue"].as_str().is_none() {
            return Err(HttpStatus::BAD_REQUEST);
        }

        Ok(Json(document("new-id", body["fields"]["url"].clone())))
    }

    async fn count_profiles(Json(body): Json<Value>) -> Result<Json<Value>, HttpStatus> {
        let query = &body["structuredAggregationQuery"];
        if query["structuredQuery"]["from"][0]["collectionId"] != "bot-profiles"
            || query["aggregations"][0]["alias"] != COUNT_ALIAS
        {
            return Err(HttpStatus::BAD_REQUEST);
        }

        Ok(Json(json!([
            { "result": { "aggregateFields": { "all": { "integerValue": "3" } } } }
        ])))
    }

    async fn unavailable() -> (HttpStatus, &'static str) {
        (HttpStatus::SERVICE_UNAVAILABLE, "backend down")
    }

    async fn stub_store() -> (FirestoreStore, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                &format!("{DOCUMENTS}/bot-profiles"),
                get(list_profiles).post(create_profile),
            )
            .route(
                &format!("{DOCUMENTS}:runAggregationQuery"),
                axum::routing::post(count_profiles),
            )
            .route(&format!("{DOCUMENTS}/broken"), get(unavailable))
            .with_state(hits.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let config = FirestoreConfig {
            base_url: format!("http://{addr}/v1"),
            project_id: "bots".to_string(),
            database: "stub".to_string(),
            token: Some("t0ken".to_string()),
            page_size: 1,
        };

        (FirestoreStore::new(Client::new(), &config), hits)
    }

    #[tokio::test]
    async fn test_scan_follows_page_tokens() {
        let (store, hits) = stub_store().await;

        let records: Vec<Record> = store.scan_all("bot-profiles").try_collect().await.unwrap();

        let ids: Vec<&str> = records.iter().map(|record| record.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        // a fresh scan starts over from the first page
        assert_eq!(tally(store.scan_all("bot-profiles")).await.unwrap(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_exists_over_pages() {
        let (store, hits) = stub_store().await;
        let flagged = FlaggedStore::new(Arc::new(store), Duration::from_secs(5));

        assert!(flagged.exists(&BOT_PROFILES, "http://a.example").await.unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(flagged.exists(&BOT_PROFILES, "http://b.example").await.unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 4);

        // `c` holds an integer url and never matches its text form
        assert!(!flagged.exists(&BOT_PROFILES, "42").await.unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_error_status_is_surfaced() {
        let (store, _) = stub_store().await;

        let result = tally(store.scan_all("broken")).await;

        match result {
            Err(StoreError::Status { status, body }) => {
                assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "backend down");
            }
            other => panic!("expected a status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_append_and_count() {
        let (store, _) = stub_store().await;
        let fields = Fields::from([("url".to_string(), "http://d.example".to_string())]);

        assert_eq!(
            store.append("bot-profiles", fields).await.unwrap(),
            RecordId::new("new-id")
        );
        assert_eq!(store.count("bot-profiles").await.unwrap(), 3);
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(
            decode_value(&json!({ "stringValue": "http://bad.example" })),
            json!("http://bad.example")
        );
        assert_eq!(decode_value(&json!({ "integerValue": "42" })), json!(42));
        assert_eq!(decode_value(&json!({ "booleanValue": true })), json!(true));
        assert_eq!(decode_value(&json!({ "doubleValue": 1.5 })), json!(1.5));
        assert_eq!(decode_value(&json!({ "nullValue": null })), Value::Null);
    }

    #[test]
    fn test_decode_keeps_compound_values_tagged() {
        let map = json!({ "mapValue": { "fields": {} } });

        assert_eq!(decode_value(&map), map);
    }

    #[test]
    fn test_encode_fields() {
        let fields = Fields::from([("url".to_string(), "http://bad.example".to_string())]);

        assert_eq!(
            Value::Object(encode_fields(&fields)),
            json!({ "url": { "stringValue": "http://bad.example" } })
        );
    }

    #[test]
    fn test_document_into_record() {
        let document: Document = serde_json::from_value(json!({
            "name": "projects/p/databases/(default)/documents/bot-profiles/abc123",
            "fields": {
                "url": { "stringValue": "http://bad.example" },
                "reason": { "integerValue": "7" }
            },
            "createTime": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        let record = document.into_record();

        assert_eq!(record.id, RecordId::new("abc123"));
        assert_eq!(record.text("url"), Ok("http://bad.example"));
        assert!(record.text("reason").is_err());
    }

    #[test]
    fn test_empty_list_page() {
        let page: ListPage = serde_json::from_value(json!({})).unwrap();

        assert!(page.documents.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn test_count_from_replies() {
        let replies: Vec<AggregationReply> = serde_json::from_value(json!([
            {
                "result": { "aggregateFields": { "all": { "integerValue": "12" } } },
                "readTime": "2024-01-01T00:00:00Z"
            }
        ]))
        .unwrap();

        assert_eq!(count_from_replies(replies).unwrap(), 12);
    }

    #[test]
    fn test_count_without_alias() {
        let replies: Vec<AggregationReply> =
            serde_json::from_value(json!([{ "readTime": "2024-01-01T00:00:00Z" }])).unwrap();

        assert!(matches!(
            count_from_replies(replies),
            Err(StoreError::Decode(_))
        ));
    }

    #[test]
    fn test_documents_url() {
        let config = FirestoreConfig {
            base_url: "http://localhost:8081/v1/".to_string(),
            project_id: "bots".to_string(),
            database: "(default)".to_string(),
            token: None,
            page_size: 50,
        };
        let store = FirestoreStore::new(Client::new(), &config);

        assert_eq!(
            store.collection_url("bot-comments"),
            "http://localhost:8081/v1/projects/bots/databases/(default)/documents/bot-comments"
        );
    }
}
