//! Application state management for kbterm.
//!
//! This module contains the core `App` struct that owns the session store,
//! the API client, the router, the UI state, and the background task
//! coordination between them.

use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ApiError, AuthEvent};
use crate::auth::SessionStore;
use crate::config::Config;
use crate::models::{KnowledgeBase, RecallHit};
use crate::router::{Route, Router};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the background task message channel.
/// A handful of fetches can be in flight at once; 8 leaves headroom.
const CHANNEL_BUFFER_SIZE: usize = 8;

/// Maximum length for username input.
const MAX_USERNAME_LENGTH: usize = 50;

/// Maximum length for password input.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Maximum length for the recall question input.
const MAX_QUESTION_LENGTH: usize = 200;

// ============================================================================
// UI State Types
// ============================================================================

/// Login form focus state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFocus {
    Username,
    Password,
    Button,
}

/// Focus area within the home view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomeFocus {
    KnowledgeBases,
    Query,
    Results,
}

pub fn can_add_username_char(len: usize) -> bool {
    len < MAX_USERNAME_LENGTH
}

pub fn can_add_password_char(len: usize) -> bool {
    len < MAX_PASSWORD_LENGTH
}

pub fn can_add_question_char(len: usize) -> bool {
    len < MAX_QUESTION_LENGTH
}

// ============================================================================
// Background Task Results
// ============================================================================

/// Result types from background fetch tasks, sent through an MPSC channel
/// back to the main loop.
enum FetchResult {
    /// Knowledge base list fetched successfully
    KnowledgeBases(Vec<KnowledgeBase>),
    /// Recall query completed
    Recall(Vec<RecallHit>),
    /// A fetch failed
    Error(String),
}

// ============================================================================
// Main Application Struct
// ============================================================================

/// Main application state container
pub struct App {
    // Core services
    pub config: Config,
    pub session: SessionStore,
    pub api: ApiClient,
    pub router: Router,

    // Login form state
    pub login_username: String,
    pub login_password: String,
    pub login_focus: LoginFocus,
    pub login_error: Option<String>,

    // Home view state
    pub home_focus: HomeFocus,
    pub knowledge_bases: Vec<KnowledgeBase>,
    pub kb_selection: usize,
    pub question: String,
    pub results: Vec<RecallHit>,
    pub result_selection: usize,
    pub querying: bool,

    // Status message
    pub status_message: Option<String>,

    // Background task channel
    fetch_rx: mpsc::Receiver<FetchResult>,
    fetch_tx: mpsc::Sender<FetchResult>,

    // Session expiry notifications from the API client
    auth_rx: mpsc::UnboundedReceiver<AuthEvent>,
}

impl App {
    /// Create a new application instance, hydrating any persisted session.
    pub async fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };

        let cache_dir = config
            .cache_dir()
            .unwrap_or_else(|_| PathBuf::from("./cache"));
        debug!(?cache_dir, "Cache directory configured");

        let session = SessionStore::new(cache_dir);
        let restored = session.hydrate().await;
        debug!(restored, "Session hydration finished");

        let (auth_tx, auth_rx) = mpsc::unbounded_channel();
        let api = ApiClient::new(
            config.api_url.clone(),
            config.timeout(),
            session.clone(),
            auth_tx,
        )?;

        let router = Router::new(session.clone());

        let (fetch_tx, fetch_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        let login_username = config.last_username.clone().unwrap_or_default();

        Ok(Self {
            config,
            session,
            api,
            router,

            login_username,
            login_password: String::new(),
            login_focus: LoginFocus::Username,
            login_error: None,

            home_focus: HomeFocus::KnowledgeBases,
            knowledge_bases: Vec::new(),
            kb_selection: 0,
            question: String::new(),
            results: Vec::new(),
            result_selection: 0,
            querying: false,

            status_message: None,

            fetch_rx,
            fetch_tx,
            auth_rx,
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn is_authenticated(&self) -> bool {
        self.session.is_authenticated().await
    }

    /// Attempt login with the credentials from the login form.
    ///
    /// On success the granted pair is pushed into the session store, the
    /// router moves to the home view, and the knowledge base list starts
    /// loading in the background.
    pub async fn attempt_login(&mut self) -> Result<()> {
        let username = self.login_username.trim().to_string();
        let password = self.login_password.clone();

        if username.is_empty() || password.is_empty() {
            self.login_error = Some("Username and password required".to_string());
            return Err(anyhow::anyhow!("Username and password required"));
        }

        self.login_error = None;

        match self.api.login(&username, &password).await {
            Ok(pair) => {
                self.session
                    .set_tokens(pair.access_token, pair.refresh_token)
                    .await;

                self.config.last_username = Some(username);
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }

                self.login_password.clear();
                self.router.navigate(Route::Home).await;
                self.refresh_knowledge_bases();
                info!("Login successful");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                self.login_error = Some(Self::login_error_message(&e));
                Err(e.into())
            }
        }
    }

    /// User-facing message for a login failure.
    fn login_error_message(error: &ApiError) -> String {
        match error {
            ApiError::Unauthorized => "Invalid username or password".to_string(),
            ApiError::NetworkError(e) if e.is_timeout() => {
                "Connection timed out. Please try again.".to_string()
            }
            ApiError::NetworkError(_) => {
                "Unable to connect to server. Check your network connection.".to_string()
            }
            other => format!("Login failed: {}", other),
        }
    }

    /// Clear the session and return to the login view.
    pub async fn logout(&mut self) {
        self.session.clear().await;
        self.knowledge_bases.clear();
        self.results.clear();
        self.kb_selection = 0;
        self.result_selection = 0;
        self.status_message = None;
        self.show_login(None).await;
        info!("Logged out");
    }

    /// Route to the login view, optionally with an error banner.
    async fn show_login(&mut self, error: Option<String>) {
        self.login_error = error;
        self.login_focus = if self.login_username.is_empty() {
            LoginFocus::Username
        } else {
            LoginFocus::Password
        };
        self.router.navigate(Route::Login).await;
    }

    // =========================================================================
    // Background Data Fetches
    // =========================================================================

    /// Helper to send fetch results, logging any channel errors
    async fn send_result(tx: &mpsc::Sender<FetchResult>, result: FetchResult) {
        if let Err(e) = tx.send(result).await {
            error!(error = %e, "Failed to send fetch result - channel closed");
        }
    }

    /// Spawn a background task to reload the knowledge base list.
    pub fn refresh_knowledge_bases(&mut self) {
        let api = self.api.clone();
        let tx = self.fetch_tx.clone();
        self.status_message = Some("Loading knowledge bases...".to_string());

        tokio::spawn(async move {
            match api.fetch_knowledge_bases().await {
                Ok(list) => {
                    debug!(count = list.len(), "Knowledge bases fetched");
                    Self::send_result(&tx, FetchResult::KnowledgeBases(list)).await;
                }
                Err(e) => {
                    Self::send_result(&tx, FetchResult::Error(e.to_string())).await;
                }
            }
        });
    }

    /// Run the current question against the selected knowledge base.
    pub fn submit_query(&mut self) {
        let question = self.question.trim().to_string();
        if question.is_empty() || self.querying {
            return;
        }
        let Some(kb) = self.knowledge_bases.get(self.kb_selection) else {
            self.status_message = Some("No knowledge base selected".to_string());
            return;
        };

        let kb_id = kb.kb_id;
        let api = self.api.clone();
        let tx = self.fetch_tx.clone();
        self.querying = true;
        self.status_message = Some(format!("Searching {}...", kb.kb_name));

        tokio::spawn(async move {
            match api.recall(kb_id, &question).await {
                Ok(hits) => {
                    debug!(count = hits.len(), "Recall query finished");
                    Self::send_result(&tx, FetchResult::Recall(hits)).await;
                }
                Err(e) => {
                    Self::send_result(&tx, FetchResult::Error(e.to_string())).await;
                }
            }
        });
    }

    /// Check for completed background tasks and process results
    pub fn check_background_tasks(&mut self) {
        while let Ok(result) = self.fetch_rx.try_recv() {
            self.process_fetch_result(result);
        }
    }

    fn process_fetch_result(&mut self, result: FetchResult) {
        match result {
            FetchResult::KnowledgeBases(list) => {
                self.kb_selection = self
                    .kb_selection
                    .min(list.len().saturating_sub(1));
                self.knowledge_bases = list;
                self.status_message = None;
            }
            FetchResult::Recall(hits) => {
                self.querying = false;
                self.result_selection = 0;
                self.status_message = if hits.is_empty() {
                    Some("No matching paragraphs".to_string())
                } else {
                    None
                };
                self.results = hits;
                if !self.results.is_empty() {
                    self.home_focus = HomeFocus::Results;
                }
            }
            FetchResult::Error(msg) => {
                error!(error = %msg, "Background task error");
                self.querying = false;
                self.status_message = Some(format!("Error: {}", msg));
            }
        }
    }

    /// Drain session notifications from the API client.
    ///
    /// A terminal 401 or failed refresh anywhere clears the session; the
    /// guard takes over from there and the login view comes up with an
    /// explanation.
    pub async fn process_auth_events(&mut self) {
        while let Ok(event) = self.auth_rx.try_recv() {
            match event {
                AuthEvent::SessionExpired => {
                    warn!("Session expired, returning to login");
                    self.querying = false;
                    self.show_login(Some("Session expired. Please log in again.".to_string()))
                        .await;
                }
            }
        }
    }
}
