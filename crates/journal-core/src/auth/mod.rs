//! Identity provider contract and the Firebase Identity Toolkit client.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::store::{StoreError, StoreResult, TokenSource};
use crate::util::{is_http_url, normalize_text_option, unix_seconds_now};

const EXPIRY_SKEW_SECONDS: i64 = 60;
const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

/// Stable, opaque user identifier issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> AuthResult<Self> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(AuthError::Api(
                "Identity provider returned an empty user id".to_string(),
            ));
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Identity provider is not configured for this build.")]
    NotConfigured,
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Sign-in handshake the journal controller depends on.
#[allow(async_fn_in_trait)]
pub trait IdentityProvider {
    /// Identity from a previously persisted session, if one is still usable.
    async fn restore(&self) -> AuthResult<Option<Identity>>;

    async fn sign_in_anonymously(&self) -> AuthResult<Identity>;

    /// Sign in with a token minted by the hosting environment.
    async fn sign_in_with_token(&self, token: &str) -> AuthResult<Identity>;

    async fn sign_out(&self) -> AuthResult<()>;
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub id_token: String,
    pub refresh_token: String,
    /// Unix seconds
    pub expires_at: i64,
    pub user_id: String,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_seconds_now() + EXPIRY_SKEW_SECONDS
    }

    pub fn identity(&self) -> AuthResult<Identity> {
        Identity::new(self.user_id.clone())
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("id_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .finish()
    }
}

pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// Session persistence that keeps nothing between runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct EphemeralSessions;

impl SessionPersistence for EphemeralSessions {
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        Ok(None)
    }

    fn save_session(&self, _session: &AuthSession) -> AuthResult<()> {
        Ok(())
    }

    fn clear_session(&self) -> AuthResult<()> {
        Ok(())
    }
}

/// Firebase Identity Toolkit REST client.
///
/// Clones share the active session, so the same client can be handed to the
/// controller as its identity provider and to the Firestore adapter as its
/// bearer token source.
#[derive(Clone)]
pub struct FirebaseAuthClient<S: SessionPersistence> {
    api_key: String,
    identity_url: String,
    secure_token_url: String,
    client: Client,
    store: S,
    session: Arc<RwLock<Option<AuthSession>>>,
}

impl<S: SessionPersistence> FirebaseAuthClient<S> {
    pub fn new(api_key: impl Into<String>, store: S) -> AuthResult<Self> {
        Self::with_endpoints(api_key, DEFAULT_IDENTITY_URL, DEFAULT_SECURE_TOKEN_URL, store)
    }

    /// Point the client at alternate endpoints (e.g. the auth emulator).
    pub fn with_endpoints(
        api_key: impl Into<String>,
        identity_url: &str,
        secure_token_url: &str,
        store: S,
    ) -> AuthResult<Self> {
        let api_key = normalize_text_option(Some(api_key.into()))
            .ok_or(AuthError::InvalidConfiguration("Firebase API key must not be empty"))?;

        Ok(Self {
            api_key,
            identity_url: normalize_endpoint(identity_url)?,
            secure_token_url: normalize_endpoint(secure_token_url)?,
            client: Client::builder().build()?,
            store,
            session: Arc::new(RwLock::new(None)),
        })
    }

    /// Currently active session, if any.
    pub async fn current_session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(stored_session) = self.store.load_session()? else {
            return Ok(None);
        };

        if !stored_session.is_expired() {
            self.activate(stored_session.clone()).await?;
            return Ok(Some(stored_session));
        }

        match self.refresh_session(&stored_session.refresh_token).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(error) => {
                tracing::warn!("Failed to refresh persisted session: {}", error);
                self.store.clear_session()?;
                Ok(None)
            }
        }
    }

    pub async fn sign_up_anonymous(&self) -> AuthResult<AuthSession> {
        let payload = serde_json::json!({ "returnSecureToken": true });
        let response: SignInResponse = self
            .post_json(&format!("{}/accounts:signUp", self.identity_url), &payload)
            .await?;
        let session = response.into_session(None)?;
        self.activate(session.clone()).await?;
        Ok(session)
    }

    pub async fn sign_in_with_custom_token(&self, token: &str) -> AuthResult<AuthSession> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Custom auth token must not be empty",
            ));
        }

        let payload = serde_json::json!({ "token": token, "returnSecureToken": true });
        let response: SignInResponse = self
            .post_json(
                &format!("{}/accounts:signInWithCustomToken", self.identity_url),
                &payload,
            )
            .await?;

        // The custom-token response does not carry the user id.
        let user_id = match response.local_id.clone() {
            Some(user_id) => user_id,
            None => self.lookup_user_id(response.id_token.as_deref()).await?,
        };
        let session = response.into_session(Some(user_id))?;
        self.activate(session.clone()).await?;
        Ok(session)
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token must not be empty",
            ));
        }

        let payload = serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        });
        let response: RefreshResponse = self
            .post_json(&format!("{}/token", self.secure_token_url), &payload)
            .await?;
        let session = response.into_session()?;
        self.activate(session.clone()).await?;
        Ok(session)
    }

    /// A non-expired ID token, refreshing the session when needed.
    pub async fn id_token(&self) -> AuthResult<Option<String>> {
        let Some(session) = self.current_session().await else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session.id_token));
        }
        let refreshed = self.refresh_session(&session.refresh_token).await?;
        Ok(Some(refreshed.id_token))
    }

    pub async fn clear(&self) -> AuthResult<()> {
        *self.session.write().await = None;
        self.store.clear_session()
    }

    async fn activate(&self, session: AuthSession) -> AuthResult<()> {
        self.store.save_session(&session)?;
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn lookup_user_id(&self, id_token: Option<&str>) -> AuthResult<String> {
        let id_token = id_token
            .ok_or_else(|| AuthError::Api("Sign-in response did not include an ID token".into()))?;
        let payload = serde_json::json!({ "idToken": id_token });
        let response: LookupResponse = self
            .post_json(&format!("{}/accounts:lookup", self.identity_url), &payload)
            .await?;
        response
            .users
            .into_iter()
            .find_map(|user| normalize_text_option(user.local_id))
            .ok_or_else(|| AuthError::Api("Account lookup returned no user id".to_string()))
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> AuthResult<T> {
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(payload)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        Ok(response.json::<T>().await?)
    }
}

impl<S: SessionPersistence> IdentityProvider for FirebaseAuthClient<S> {
    async fn restore(&self) -> AuthResult<Option<Identity>> {
        self.restore_session()
            .await?
            .map(|session| session.identity())
            .transpose()
    }

    async fn sign_in_anonymously(&self) -> AuthResult<Identity> {
        self.sign_up_anonymous().await?.identity()
    }

    async fn sign_in_with_token(&self, token: &str) -> AuthResult<Identity> {
        self.sign_in_with_custom_token(token).await?.identity()
    }

    async fn sign_out(&self) -> AuthResult<()> {
        self.clear().await
    }
}

impl<S: SessionPersistence> TokenSource for FirebaseAuthClient<S> {
    fn bearer_token(&self) -> impl Future<Output = StoreResult<Option<String>>> + Send {
        let client = self.clone();
        async move {
            client
                .id_token()
                .await
                .map_err(|error| StoreError::Unauthenticated(error.to_string()))
        }
    }
}

pub fn normalize_endpoint(url: &str) -> AuthResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthError::InvalidConfiguration("Auth endpoint must not be empty"));
    }
    if !is_http_url(trimmed) {
        return Err(AuthError::InvalidConfiguration(
            "Auth endpoint must include http:// or https://",
        ));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
    local_id: Option<String>,
}

impl SignInResponse {
    fn into_session(self, user_id: Option<String>) -> AuthResult<AuthSession> {
        let user_id = normalize_text_option(user_id.or(self.local_id));
        match (self.id_token, self.refresh_token, user_id) {
            (Some(id_token), Some(refresh_token), Some(user_id)) => Ok(AuthSession {
                id_token,
                refresh_token,
                expires_at: expires_at_from(self.expires_in.as_deref())?,
                user_id,
            }),
            _ => Err(AuthError::Api(
                "Sign-in response did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
    user_id: Option<String>,
}

impl RefreshResponse {
    fn into_session(self) -> AuthResult<AuthSession> {
        match (
            self.id_token,
            self.refresh_token,
            normalize_text_option(self.user_id),
        ) {
            (Some(id_token), Some(refresh_token), Some(user_id)) => Ok(AuthSession {
                id_token,
                refresh_token,
                expires_at: expires_at_from(self.expires_in.as_deref())?,
                user_id,
            }),
            _ => Err(AuthError::Api(
                "Refresh response did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: Option<String>,
}

/// Firebase reports lifetimes as a decimal string of seconds.
fn expires_at_from(expires_in: Option<&str>) -> AuthResult<i64> {
    let seconds = expires_in
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .ok_or_else(|| AuthError::Api("Auth response did not include expiresIn".to_string()))?;
    Ok(unix_seconds_now().saturating_add(seconds))
}

#[derive(Debug, Deserialize)]
struct FirebaseErrorResponse {
    error: Option<FirebaseErrorBody>,
}

#[derive(Debug, Deserialize)]
struct FirebaseErrorBody {
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<FirebaseErrorResponse>(body) {
        if let Some(message) = payload.error.and_then(|error| error.message) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rejects_blank_ids() {
        assert!(Identity::new("  ").is_err());
        assert_eq!(Identity::new(" uid ").unwrap().as_str(), "uid");
    }

    #[test]
    fn normalize_endpoint_trims_trailing_slash() {
        assert_eq!(
            normalize_endpoint("http://localhost:9099/identitytoolkit.googleapis.com/v1/")
                .unwrap(),
            "http://localhost:9099/identitytoolkit.googleapis.com/v1"
        );
        assert!(normalize_endpoint("identitytoolkit.googleapis.com").is_err());
    }

    #[test]
    fn client_requires_api_key() {
        assert!(FirebaseAuthClient::new("  ", EphemeralSessions).is_err());
    }

    #[test]
    fn sign_in_response_builds_session() {
        let response: SignInResponse = serde_json::from_str(
            r#"{"idToken":"id","refreshToken":"refresh","expiresIn":"3600","localId":"uid-1"}"#,
        )
        .unwrap();
        let session = response.into_session(None).unwrap();
        assert_eq!(session.user_id, "uid-1");
        assert!(!session.is_expired());
    }

    #[test]
    fn sign_in_response_without_user_id_is_rejected() {
        let response: SignInResponse =
            serde_json::from_str(r#"{"idToken":"id","refreshToken":"r","expiresIn":"3600"}"#)
                .unwrap();
        assert!(response.into_session(None).is_err());
    }

    #[test]
    fn refresh_response_uses_snake_case_fields() {
        let response: RefreshResponse = serde_json::from_str(
            r#"{"id_token":"id","refresh_token":"r2","expires_in":"3600","user_id":"uid-2"}"#,
        )
        .unwrap();
        let session = response.into_session().unwrap();
        assert_eq!(session.refresh_token, "r2");
        assert_eq!(session.identity().unwrap().as_str(), "uid-2");
    }

    #[test]
    fn api_error_prefers_structured_message() {
        let body = r#"{"error":{"code":400,"message":"ADMIN_ONLY_OPERATION"}}"#;
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, body),
            "ADMIN_ONLY_OPERATION (400)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
    }

    #[test]
    fn session_debug_redacts_tokens() {
        let session = AuthSession {
            id_token: "secret-id-token".to_string(),
            refresh_token: "secret-refresh-token".to_string(),
            expires_at: 1_700_000_000,
            user_id: "uid".to_string(),
        };
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-id-token"));
        assert!(!rendered.contains("secret-refresh-token"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(session.is_expired());
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

    #[tokio::test]
    async fn anonymous_sign_up_activates_session() {
        let base_url = spawn_one_shot_server(
            "200 OK",
            r#"{"idToken":"id-1","refreshToken":"r-1","expiresIn":"3600","localId":"anon-1"}"#,
        )
        .await;
        let client =
            FirebaseAuthClient::with_endpoints("key", &base_url, &base_url, EphemeralSessions)
                .unwrap();

        let identity = client.sign_in_anonymously().await.unwrap();

        assert_eq!(identity.as_str(), "anon-1");
        assert_eq!(client.id_token().await.unwrap().as_deref(), Some("id-1"));
    }

    #[tokio::test]
    async fn rejected_sign_up_reports_api_message() {
        let base_url = spawn_one_shot_server(
            "400 Bad Request",
            r#"{"error":{"code":400,"message":"ADMIN_ONLY_OPERATION"}}"#,
        )
        .await;
        let client =
            FirebaseAuthClient::with_endpoints("key", &base_url, &base_url, EphemeralSessions)
                .unwrap();

        let error = client.sign_in_anonymously().await.unwrap_err();

        assert!(matches!(error, AuthError::Api(message) if message == "ADMIN_ONLY_OPERATION (400)"));
        assert!(client.current_session().await.is_none());
    }

    #[tokio::test]
    async fn ephemeral_client_has_no_session_to_restore() {
        let client = FirebaseAuthClient::new("key", EphemeralSessions).unwrap();
        assert!(client.restore().await.unwrap().is_none());
        assert!(client.id_token().await.unwrap().is_none());
    }
}
