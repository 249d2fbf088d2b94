//! Firestore REST adapter.
//!
//! Writes go through `documents:commit` so create, merge, and delete share one
//! request shape. The REST surface has no streaming listen, so `watch` polls
//! the collection listing and pushes a snapshot whenever the result set
//! changes.

use std::future::Future;
use std::time::Duration;

use chrono::DateTime;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{
    CollectionPath, Document, DocumentWrite, RemoteStore, StoreError, StoreResult, Subscription,
};
use crate::models::DocumentId;
use crate::util::{compact_text, is_http_url};

const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_DATABASE: &str = "(default)";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const LIST_PAGE_SIZE: u32 = 300;

/// Supplies the bearer token attached to every request.
pub trait TokenSource: Clone + Send + Sync + 'static {
    /// `Ok(None)` sends the request unauthenticated.
    fn bearer_token(&self) -> impl Future<Output = StoreResult<Option<String>>> + Send;
}

#[derive(Clone)]
pub struct FirestoreStore<T: TokenSource> {
    base_url: String,
    documents_root: String,
    client: Client,
    tokens: T,
    poll_interval: Duration,
}

impl<T: TokenSource> FirestoreStore<T> {
    pub fn new(project_id: &str, tokens: T) -> StoreResult<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, project_id, tokens)
    }

    /// Use an alternate API root (e.g. the Firestore emulator).
    pub fn with_base_url(base_url: &str, project_id: &str, tokens: T) -> StoreResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !is_http_url(base_url) {
            return Err(StoreError::Api(
                "Firestore base URL must include http:// or https://".to_string(),
            ));
        }
        let project_id = project_id.trim();
        if project_id.is_empty() || project_id.contains('/') {
            return Err(StoreError::Api(format!(
                "invalid Firestore project id '{project_id}'"
            )));
        }

        Ok(Self {
            base_url: base_url.to_string(),
            documents_root: format!("projects/{project_id}/databases/{DEFAULT_DATABASE}/documents"),
            client: Client::builder().build()?,
            tokens,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(250));
        self
    }

    fn document_name(&self, path: &CollectionPath, id: &DocumentId) -> String {
        format!("{}/{path}/{id}", self.documents_root)
    }

    async fn authorize(&self, request: reqwest::RequestBuilder) -> StoreResult<reqwest::RequestBuilder> {
        Ok(match self.tokens.bearer_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    async fn commit(&self, write: Value) -> StoreResult<()> {
        let url = format!("{}/{}:commit", self.base_url, self.documents_root);
        let request = self.authorize(self.client.post(url)).await?;
        let response = request.json(&json!({ "writes": [write] })).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    async fn list_documents(&self, path: &CollectionPath) -> StoreResult<Vec<Document>> {
        let url = format!("{}/{}/{path}", self.base_url, self.documents_root);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let response = self.authorize(request).await?.send().await?;
            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }

            let page = response.json::<ListDocumentsResponse>().await?;
            for raw in page.documents {
                documents.push(decode_document(raw)?);
            }
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(documents)
    }
}

impl<T: TokenSource> RemoteStore for FirestoreStore<T> {
    async fn create(
        &self,
        path: &CollectionPath,
        id: &DocumentId,
        write: &DocumentWrite,
    ) -> StoreResult<()> {
        let transforms = write
            .server_timestamps
            .iter()
            .map(|field| json!({ "fieldPath": field_path(field), "setToServerValue": "REQUEST_TIME" }))
            .collect::<Vec<_>>();
        self.commit(json!({
            "update": {
                "name": self.document_name(path, id),
                "fields": encode_fields(&write.fields),
            },
            "updateTransforms": transforms,
        }))
        .await
    }

    async fn merge(
        &self,
        path: &CollectionPath,
        id: &DocumentId,
        fields: &Map<String, Value>,
    ) -> StoreResult<()> {
        let mask = fields.keys().map(|key| field_path(key)).collect::<Vec<_>>();
        self.commit(json!({
            "update": {
                "name": self.document_name(path, id),
                "fields": encode_fields(fields),
            },
            "updateMask": { "fieldPaths": mask },
            "currentDocument": { "exists": true },
        }))
        .await
    }

    async fn delete(&self, path: &CollectionPath, id: &DocumentId) -> StoreResult<()> {
        self.commit(json!({ "delete": self.document_name(path, id) }))
            .await
    }

    async fn watch(&self, path: &CollectionPath) -> StoreResult<Subscription> {
        let (sender, subscription) = Subscription::channel(path.clone());
        let store = self.clone();
        let path = path.clone();

        tokio::spawn(async move {
            let mut last_delivered: Option<Vec<Document>> = None;
            loop {
                match store.list_documents(&path).await {
                    Ok(documents) => {
                        if last_delivered.as_ref() != Some(&documents) {
                            if sender.send(Ok(documents.clone())).is_err() {
                                break;
                            }
                            last_delivered = Some(documents);
                        }
                    }
                    Err(error) => {
                        tracing::warn!("Firestore watch on {} failed: {}", path, error);
                        let _ = sender.send(Err(error));
                        break;
                    }
                }

                tokio::select! {
                    () = sender.closed() => break,
                    () = tokio::time::sleep(store.poll_interval) => {}
                }
            }
            tracing::debug!("Firestore watch on {} stopped", path);
        });

        Ok(subscription)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

fn decode_document(raw: RawDocument) -> StoreResult<Document> {
    let id = raw
        .name
        .rsplit('/')
        .next()
        .and_then(|segment| DocumentId::new(segment).ok())
        .ok_or_else(|| StoreError::InvalidDocument(format!("bad document name '{}'", raw.name)))?;
    Ok(Document {
        id,
        fields: decode_fields(&raw.fields)?,
    })
}

/// Quote a field path segment unless it is a plain identifier.
fn field_path(field: &str) -> String {
    let plain = field
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && field.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if plain {
        field.to_string()
    } else {
        format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

fn encode_fields(fields: &Map<String, Value>) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, value)| (key.clone(), encode_value(value)))
            .collect(),
    )
}

/// Plain JSON to a Firestore typed value.
fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(flag) => json!({ "booleanValue": flag }),
        Value::Number(number) => number.as_i64().map_or_else(
            || json!({ "doubleValue": number.as_f64().unwrap_or_default() }),
            |integer| json!({ "integerValue": integer.to_string() }),
        ),
        Value::String(text) => json!({ "stringValue": text }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

fn decode_fields(fields: &Map<String, Value>) -> StoreResult<Map<String, Value>> {
    fields
        .iter()
        .map(|(key, value)| decode_value(value).map(|decoded| (key.clone(), decoded)))
        .collect()
}

/// Firestore typed value to plain JSON. Timestamps become Unix milliseconds.
fn decode_value(value: &Value) -> StoreResult<Value> {
    let invalid = || StoreError::InvalidDocument(format!("unsupported value {value}"));
    let typed = value.as_object().ok_or_else(invalid)?;
    let (kind, inner) = typed.iter().next().ok_or_else(invalid)?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" | "doubleValue" | "stringValue" | "referenceValue" | "bytesValue"
        | "geoPointValue" => Ok(inner.clone()),
        "integerValue" => match inner {
            Value::String(raw) => raw.parse::<i64>().map(Value::from).map_err(|_| invalid()),
            Value::Number(_) => Ok(inner.clone()),
            _ => Err(invalid()),
        },
        "timestampValue" => inner
            .as_str()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|timestamp| Value::from(timestamp.timestamp_millis()))
            .ok_or_else(invalid),
        "arrayValue" => inner
            .get("values")
            .and_then(Value::as_array)
            .map_or_else(|| Ok(Vec::new()), |items| items.iter().map(decode_value).collect())
            .map(Value::Array),
        "mapValue" => inner
            .get("fields")
            .and_then(Value::as_object)
            .map_or_else(|| Ok(Map::new()), decode_fields)
            .map(Value::Object),
        _ => Err(invalid()),
    }
}

#[derive(Debug, Deserialize)]
struct FirestoreErrorResponse {
    error: Option<FirestoreErrorBody>,
}

#[derive(Debug, Deserialize)]
struct FirestoreErrorBody {
    message: Option<String>,
}

async fn error_from_response(response: reqwest::Response) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    classify_error(status, &body)
}

fn classify_error(status: StatusCode, body: &str) -> StoreError {
    let message = serde_json::from_str::<FirestoreErrorResponse>(body)
        .ok()
        .and_then(|payload| payload.error)
        .and_then(|error| error.message)
        .map_or_else(|| compact_text(body), |message| message.trim().to_string());
    let message = if message.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{message} ({})", status.as_u16())
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthenticated(message),
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            StoreError::Unavailable(message)
        }
        _ => StoreError::Api(message),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Clone)]
    struct NoToken;

    impl TokenSource for NoToken {
        async fn bearer_token(&self) -> StoreResult<Option<String>> {
            Ok(None)
        }
    }

    #[test]
    fn encodes_plain_json_as_typed_values() {
        let encoded = encode_value(&json!({ "title": "A", "count": 2, "done": false }));
        assert_eq!(
            encoded,
            json!({ "mapValue": { "fields": {
                "title": { "stringValue": "A" },
                "count": { "integerValue": "2" },
                "done": { "booleanValue": false },
            }}})
        );
    }

    #[test]
    fn decodes_timestamps_to_unix_millis() {
        let decoded = decode_value(&json!({ "timestampValue": "2024-01-02T03:04:05.678Z" })).unwrap();
        assert_eq!(decoded, Value::from(1_704_164_645_678_i64));
    }

    #[test]
    fn decodes_nested_values() {
        let decoded = decode_value(&json!({ "arrayValue": { "values": [
            { "integerValue": "7" },
            { "mapValue": { "fields": { "k": { "nullValue": null } } } },
        ]}}))
        .unwrap();
        assert_eq!(decoded, json!([7, { "k": null }]));
        assert_eq!(decode_value(&json!({ "arrayValue": {} })).unwrap(), json!([]));
    }

    #[test]
    fn rejects_unknown_value_kinds() {
        assert!(decode_value(&json!({ "mysteryValue": 1 })).is_err());
        assert!(decode_value(&json!("bare")).is_err());
    }

    #[test]
    fn decodes_document_id_from_name() {
        let raw: RawDocument = serde_json::from_value(json!({
            "name": "projects/p/databases/(default)/documents/artifacts/app/users/u/journal_entries/abc",
            "fields": { "title": { "stringValue": "A" } },
        }))
        .unwrap();
        let document = decode_document(raw).unwrap();
        assert_eq!(document.id.as_str(), "abc");
        assert_eq!(document.fields["title"], "A");
    }

    #[test]
    fn quotes_non_identifier_field_paths() {
        assert_eq!(field_path("createdAt"), "createdAt");
        assert_eq!(field_path("my-field"), "`my-field`");
    }

    #[test]
    fn classifies_error_statuses() {
        let body = r#"{"error":{"code":403,"message":"Missing or insufficient permissions."}}"#;
        assert!(matches!(
            classify_error(StatusCode::FORBIDDEN, body),
            StoreError::Unauthenticated(message) if message.contains("permissions")
        ));
        assert!(matches!(
            classify_error(StatusCode::SERVICE_UNAVAILABLE, ""),
            StoreError::Unavailable(message) if message == "HTTP 503"
        ));
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, "nope"),
            StoreError::Api(_)
        ));
    }

    #[test]
    fn builds_document_names_under_project_root() {
        let store = FirestoreStore::new("demo-project", NoToken).unwrap();
        let identity = crate::auth::Identity::new("u").unwrap();
        let path = CollectionPath::journal_entries("artifacts", "app", &identity).unwrap();
        let id = DocumentId::new("e1").unwrap();
        assert_eq!(
            store.document_name(&path, &id),
            "projects/demo-project/databases/(default)/documents/artifacts/app/users/u/journal_entries/e1"
        );
        assert!(FirestoreStore::new("", NoToken).is_err());
        assert!(FirestoreStore::with_base_url("localhost:8080", "p", NoToken).is_err());
    }

    async fn spawn_one_shot_server(status_line: &str, body: &str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let address = listener.local_addr().expect("local address");
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut request_buffer = [0_u8; 4096];
                let _ = socket.read(&mut request_buffer).await;
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        format!("http://{address}/v1")
    }

    /// Serves `body` to every request and counts the requests accepted.
    async fn spawn_counting_server(body: String) -> (String, Arc<AtomicUsize>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let address = listener.local_addr().expect("local address");
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let response = response.clone();
                tokio::spawn(async move {
                    let mut request_buffer = [0_u8; 4096];
                    let _ = socket.read(&mut request_buffer).await;
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });

        (format!("http://{address}/v1"), requests)
    }

    fn journal_path() -> CollectionPath {
        let identity = crate::auth::Identity::new("u").unwrap();
        CollectionPath::journal_entries("artifacts", "app", &identity).unwrap()
    }

    #[tokio::test]
    async fn delete_commits_successfully() {
        let base_url = spawn_one_shot_server("200 OK", r#"{"writeResults":[{}]}"#).await;
        let store = FirestoreStore::with_base_url(&base_url, "p", NoToken).unwrap();

        store
            .delete(&journal_path(), &DocumentId::new("e1").unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn merge_on_missing_document_maps_to_not_found() {
        let body = r#"{"error":{"code":404,"message":"No document to update"}}"#;
        let base_url = spawn_one_shot_server("404 Not Found", body).await;
        let store = FirestoreStore::with_base_url(&base_url, "p", NoToken).unwrap();
        let mut fields = Map::new();
        fields.insert("title".to_string(), Value::from("B"));

        let error = store
            .merge(&journal_path(), &DocumentId::new("gone").unwrap(), &fields)
            .await
            .unwrap_err();

        assert_eq!(error, StoreError::NotFound("No document to update (404)".to_string()));
    }

    #[tokio::test]
    async fn watch_delivers_listing_as_first_snapshot() {
        let body = json!({ "documents": [{
            "name": "projects/p/databases/(default)/documents/artifacts/app/users/u/journal_entries/e1",
            "fields": {
                "title": { "stringValue": "Lauds" },
                "createdAt": { "timestampValue": "2024-01-02T03:04:05.678Z" },
            },
        }]})
        .to_string();
        let base_url = spawn_one_shot_server("200 OK", &body).await;
        let store = FirestoreStore::with_base_url(&base_url, "p", NoToken).unwrap();

        let mut subscription = store.watch(&journal_path()).await.unwrap();
        let documents = subscription.next().await.unwrap().unwrap();
        subscription.close();

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id.as_str(), "e1");
        assert_eq!(documents[0].fields["createdAt"], 1_704_164_645_678_i64);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_watch_stops_polling() {
        let (base_url, requests) = spawn_counting_server(json!({ "documents": [] }).to_string()).await;
        let store = FirestoreStore::with_base_url(&base_url, "p", NoToken)
            .unwrap()
            .with_poll_interval(Duration::from_secs(1));

        let mut subscription = store.watch(&journal_path()).await.unwrap();
        assert_eq!(subscription.next().await.unwrap().unwrap(), Vec::new());
        subscription.close();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }
}
