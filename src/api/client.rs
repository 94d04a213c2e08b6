//! API client for communicating with the knowledge base service.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! requests against the service's REST endpoints. Every data request flows
//! through two hooks: an outgoing hook that attaches the bearer credential
//! held by the `SessionStore`, and an incoming hook that recovers from an
//! expired access token by exchanging the refresh token exactly once and
//! replaying the original request.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::auth::{SessionStore, TokenPair};
use crate::models::{KnowledgeBase, RecallHit};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Login endpoint, relative to the base URL.
const TOKEN_PATH: &str = "token";

/// Token refresh endpoint, relative to the base URL.
const REFRESH_PATH: &str = "refresh";

// ============================================================================
// Auth events
// ============================================================================

/// Notification emitted when the session stops being usable.
///
/// The client cannot navigate by itself; it reports through this channel and
/// the application routes back to the login view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// The session was cleared after a terminal 401 or a failed refresh.
    SessionExpired,
}

// ============================================================================
// Request context
// ============================================================================

/// One outbound request, carried as a value through the hooks.
///
/// `retried` is the per-request retry state: it starts false, flips to true
/// when the refresh protocol runs for this request, and guards against a
/// second refresh attempt for the same request.
#[derive(Debug, Clone)]
struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    retried: bool,
}

impl ApiRequest {
    fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            retried: false,
        }
    }

    fn with_query(mut self, key: &'static str, value: String) -> Self {
        self.query.push((key, value));
        self
    }
}

/// Token grant returned by the login and refresh endpoints.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

/// API client for the knowledge base service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection
/// pooling, and the session handle and refresh lock are shared by design.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionStore,
    /// Serializes refresh attempts so concurrent 401s share one refresh.
    refresh_lock: Arc<Mutex<()>>,
    auth_events: mpsc::UnboundedSender<AuthEvent>,
}

impl ApiClient {
    /// Create a new API client against `base_url` with a fixed per-request
    /// timeout. The session handle and event sender are injected here; the
    /// client never reaches for ambient state.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        session: SessionStore,
        auth_events: mpsc::UnboundedSender<AuthEvent>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            session,
            refresh_lock: Arc::new(Mutex::new(())),
            auth_events,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Log in with username and password, returning the granted token pair.
    ///
    /// This is the token acquisition itself, so it bypasses the 401 recovery
    /// path: a 401 here means the credentials were rejected. The caller is
    /// responsible for pushing the returned pair into the session store.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let response = self
            .client
            .post(self.url(TOKEN_PATH))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        let response = Self::check_response(response).await?;

        let granted: TokenResponse = response.json().await.map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse token response: {}", e))
        })?;

        Ok(TokenPair {
            access_token: granted.access_token,
            refresh_token: granted.refresh_token,
        })
    }

    /// Exchange the refresh token for a new pair and persist it.
    ///
    /// `stale_token` is the access token the failing request was sent with.
    /// Refreshes are single-flighted: whoever holds the lock refreshes for
    /// everyone, and a waiter that finds the stored token already replaced
    /// skips its own refresh call and goes straight to replay.
    ///
    /// Every failure here is terminal for the session: clear it, tell the
    /// app to show the login view, and surface the refresh failure (not the
    /// original 401) to the caller.
    async fn refresh_session(&self, stale_token: Option<String>) -> Result<(), ApiError> {
        let _guard = self.refresh_lock.lock().await;

        if self.session.access_token().await != stale_token {
            debug!("Token already refreshed by another request");
            return Ok(());
        }

        let Some(refresh_token) = self.session.refresh_token().await else {
            self.expire_session().await;
            return Err(ApiError::RefreshFailed("no refresh token held".to_string()));
        };

        let sent = self
            .client
            .post(self.url(REFRESH_PATH))
            .form(&[("refresh_token", refresh_token.as_str())])
            .send()
            .await;

        let response = match sent {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                let status = response.status();
                self.expire_session().await;
                return Err(ApiError::RefreshFailed(format!(
                    "refresh endpoint returned {}",
                    status
                )));
            }
            Err(e) => {
                self.expire_session().await;
                return Err(ApiError::RefreshFailed(format!(
                    "refresh request failed: {}",
                    e
                )));
            }
        };

        let granted: TokenResponse = match response.json().await {
            Ok(granted) => granted,
            Err(e) => {
                self.expire_session().await;
                return Err(ApiError::RefreshFailed(format!(
                    "could not parse refresh response: {}",
                    e
                )));
            }
        };

        debug!("Session refreshed");
        self.session
            .set_tokens(granted.access_token, granted.refresh_token)
            .await;
        Ok(())
    }

    /// Clear the session and report it, so the app can route to login.
    async fn expire_session(&self) {
        warn!("Session is no longer valid, logging out");
        self.session.clear().await;
        let _ = self.auth_events.send(AuthEvent::SessionExpired);
    }

    // =========================================================================
    // Request pipeline
    // =========================================================================

    /// Outgoing hook: attach the bearer credential when one is held.
    /// A missing token never blocks the request.
    fn authorize(
        builder: reqwest::RequestBuilder,
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Build and send one attempt, without any recovery.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        Ok(Self::authorize(builder, token).send().await?)
    }

    /// Send a request through both interception hooks.
    ///
    /// The first 401 marks the request retried, runs the refresh protocol,
    /// and loops to replay with the refreshed token; the replay's outcome is
    /// what the caller sees. A 401 on an already-retried request is
    /// terminal: the session is cleared, the app is told to show the login
    /// view, and the error propagates. Transport errors and other non-2xx
    /// statuses propagate without recovery.
    async fn execute(&self, mut request: ApiRequest) -> Result<reqwest::Response, ApiError> {
        loop {
            let token = self.session.access_token().await;
            let response = self.dispatch(&request, token.as_deref()).await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return Self::check_response(response).await;
            }

            if request.retried {
                self.expire_session().await;
                return Err(ApiError::Unauthorized);
            }

            request.retried = true;
            self.refresh_session(token).await?;
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let path = request.path.clone();
        let response = self.execute(request).await?;
        response.json().await.map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e))
        })
    }

    // =========================================================================
    // Data endpoints
    // =========================================================================

    /// Fetch the knowledge bases visible to the logged-in user.
    pub async fn fetch_knowledge_bases(&self) -> Result<Vec<KnowledgeBase>, ApiError> {
        self.fetch(ApiRequest::get("knowledge_bases")).await
    }

    /// Run a recall query against one knowledge base.
    pub async fn recall(&self, kb_id: i64, question: &str) -> Result<Vec<RecallHit>, ApiError> {
        self.fetch(
            ApiRequest::get("recall")
                .with_query("kb_id", kb_id.to_string())
                .with_query("question", question.to_string()),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(
        base_url: &str,
    ) -> (
        ApiClient,
        SessionStore,
        mpsc::UnboundedReceiver<AuthEvent>,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionStore::new(dir.path().to_path_buf());
        let (tx, rx) = mpsc::unbounded_channel();
        let client =
            ApiClient::new(base_url, Duration::from_secs(5), session.clone(), tx).unwrap();
        (client, session, rx, dir)
    }

    fn token_body(access: &str, refresh: &str) -> serde_json::Value {
        json!({
            "access_token": access,
            "refresh_token": refresh,
            "token_type": "bearer",
        })
    }

    fn kb_body() -> serde_json::Value {
        json!([{"kb_id": 1, "kb_name": "handbook", "kb_description": "internal docs"}])
    }

    #[tokio::test]
    async fn test_login_returns_granted_pair() {
        let server = MockServer::start().await;
        let (client, session, _rx, _dir) = test_client(&server.uri());

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("username=u"))
            .and(body_string_contains("password=p"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("A1", "R1")))
            .expect(1)
            .mount(&server)
            .await;

        let pair = client.login("u", "p").await.unwrap();
        assert_eq!(pair.access_token, "A1");
        assert_eq!(pair.refresh_token.as_deref(), Some("R1"));

        // Login only returns the pair; the caller pushes it into the store
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_login_rejected_is_unauthorized() {
        let server = MockServer::start().await;
        let (client, session, _rx, _dir) = test_client(&server.uri());

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = client.login("u", "wrong").await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_requests_carry_current_bearer_token() {
        let server = MockServer::start().await;
        let (client, session, _rx, _dir) = test_client(&server.uri());
        session
            .set_tokens("A1".to_string(), Some("R1".to_string()))
            .await;

        Mock::given(method("GET"))
            .and(path("/knowledge_bases"))
            .and(header("authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(kb_body()))
            .expect(1)
            .mount(&server)
            .await;

        let list = client.fetch_knowledge_bases().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].kb_name, "handbook");
    }

    #[tokio::test]
    async fn test_missing_token_sends_unauthenticated_request() {
        let server = MockServer::start().await;
        let (client, _session, _rx, _dir) = test_client(&server.uri());

        Mock::given(method("GET"))
            .and(path("/knowledge_bases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        client.fetch_knowledge_bases().await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_401_refreshes_once_and_replays() {
        let server = MockServer::start().await;
        let (client, session, _rx, _dir) = test_client(&server.uri());
        session
            .set_tokens("A1".to_string(), Some("R1".to_string()))
            .await;

        // Stale token is rejected once
        Mock::given(method("GET"))
            .and(path("/knowledge_bases"))
            .and(header("authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        // Exactly one refresh call, carrying the current refresh token
        Mock::given(method("POST"))
            .and(path("/refresh"))
            .and(body_string_contains("refresh_token=R1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("A2", "R2")))
            .expect(1)
            .mount(&server)
            .await;

        // The replay carries the refreshed token and its response wins
        Mock::given(method("GET"))
            .and(path("/knowledge_bases"))
            .and(header("authorization", "Bearer A2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(kb_body()))
            .expect(1)
            .mount(&server)
            .await;

        let list = client.fetch_knowledge_bases().await.unwrap();
        assert_eq!(list.len(), 1);

        assert_eq!(session.access_token().await.as_deref(), Some("A2"));
        assert_eq!(session.refresh_token().await.as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn test_second_401_is_terminal() {
        let server = MockServer::start().await;
        let (client, session, mut rx, _dir) = test_client(&server.uri());
        session
            .set_tokens("A1".to_string(), Some("R1".to_string()))
            .await;

        // Both the original send and the replay are rejected
        Mock::given(method("GET"))
            .and(path("/knowledge_bases"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        // The refresh itself succeeds, but only one attempt is allowed
        Mock::given(method("POST"))
            .and(path("/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("A2", "R2")))
            .expect(1)
            .mount(&server)
            .await;

        let result = client.fetch_knowledge_bases().await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));

        assert!(!session.is_authenticated().await);
        assert_eq!(rx.try_recv().ok(), Some(AuthEvent::SessionExpired));
    }

    #[tokio::test]
    async fn test_refresh_failure_is_terminal() {
        let server = MockServer::start().await;
        let (client, session, mut rx, _dir) = test_client(&server.uri());
        session
            .set_tokens("A1".to_string(), Some("R1".to_string()))
            .await;

        Mock::given(method("GET"))
            .and(path("/knowledge_bases"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let result = client.fetch_knowledge_bases().await;
        assert!(matches!(result, Err(ApiError::RefreshFailed(_))));

        assert!(!session.is_authenticated().await);
        assert_eq!(rx.try_recv().ok(), Some(AuthEvent::SessionExpired));
    }

    #[tokio::test]
    async fn test_401_without_refresh_token_skips_refresh_call() {
        let server = MockServer::start().await;
        let (client, session, mut rx, _dir) = test_client(&server.uri());
        session.set_tokens("A1".to_string(), None).await;

        Mock::given(method("GET"))
            .and(path("/knowledge_bases"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        // The refresh endpoint must never be hit
        Mock::given(method("POST"))
            .and(path("/refresh"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let result = client.fetch_knowledge_bases().await;
        assert!(matches!(result, Err(ApiError::RefreshFailed(_))));

        assert!(!session.is_authenticated().await);
        assert_eq!(rx.try_recv().ok(), Some(AuthEvent::SessionExpired));
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let server = MockServer::start().await;
        let (client, session, _rx, _dir) = test_client(&server.uri());
        session
            .set_tokens("A1".to_string(), Some("R1".to_string()))
            .await;

        Mock::given(method("GET"))
            .and(path("/knowledge_bases"))
            .and(header("authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("A2", "R2")))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/knowledge_bases"))
            .and(header("authorization", "Bearer A2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(2)
            .mount(&server)
            .await;

        let (first, second) = tokio::join!(
            client.fetch_knowledge_bases(),
            client.fetch_knowledge_bases()
        );
        assert!(first.is_ok());
        assert!(second.is_ok());

        assert_eq!(session.access_token().await.as_deref(), Some("A2"));
    }

    #[tokio::test]
    async fn test_recall_sends_query_parameters() {
        let server = MockServer::start().await;
        let (client, session, _rx, _dir) = test_client(&server.uri());
        session.set_tokens("A1".to_string(), None).await;

        Mock::given(method("GET"))
            .and(path("/recall"))
            .and(wiremock::matchers::query_param("kb_id", "3"))
            .and(wiremock::matchers::query_param("question", "what is rust"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"content": "a systems language", "total_score": 2.9}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let hits = client.recall(3, "what is rust").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "a systems language");
    }

    #[tokio::test]
    async fn test_other_statuses_propagate_without_refresh() {
        let server = MockServer::start().await;
        let (client, session, mut rx, _dir) = test_client(&server.uri());
        session
            .set_tokens("A1".to_string(), Some("R1".to_string()))
            .await;

        Mock::given(method("GET"))
            .and(path("/knowledge_bases"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = client.fetch_knowledge_bases().await;
        assert!(matches!(result, Err(ApiError::ServerError(_))));

        // The session is untouched by non-401 failures
        assert!(session.is_authenticated().await);
        assert!(rx.try_recv().is_err());
    }
}
