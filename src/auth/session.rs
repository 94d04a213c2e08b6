use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Session file name in the cache directory
const SESSION_FILE: &str = "session.json";

/// The credential pair granted by the token endpoint.
///
/// The serialized field names are fixed storage keys; a session written by
/// one build must hydrate in the next. An absent `refreshToken` entry means
/// the flow variant that grants no refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "token")]
    pub access_token: String,
    #[serde(
        rename = "refreshToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<String>,
}

/// Shared handle to the current session.
///
/// Single source of truth for the credential pair: the API client and the
/// router hold clones of this handle, never their own copies of the tokens.
/// Mutations are written through to the session file so the session
/// survives restarts; persistence failures are logged and otherwise
/// swallowed, so callers always observe the in-memory state they asked for.
#[derive(Clone)]
pub struct SessionStore {
    tokens: Arc<RwLock<Option<TokenPair>>>,
    session_path: PathBuf,
}

impl SessionStore {
    /// Create an empty (logged-out) store backed by `cache_dir`.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            tokens: Arc::new(RwLock::new(None)),
            session_path: cache_dir.join(SESSION_FILE),
        }
    }

    /// Load a persisted session from disk, if one exists.
    /// Returns true when a session was restored.
    pub async fn hydrate(&self) -> bool {
        let restored = match std::fs::read_to_string(&self.session_path) {
            Ok(contents) => match serde_json::from_str::<TokenPair>(&contents) {
                Ok(pair) => Some(pair),
                Err(e) => {
                    warn!(error = %e, "Ignoring unreadable session file");
                    None
                }
            },
            Err(_) => None,
        };

        if let Some(pair) = restored {
            debug!("Session restored from disk");
            *self.tokens.write().await = Some(pair);
            true
        } else {
            false
        }
    }

    /// Replace the credential pair, in memory and on disk.
    pub async fn set_tokens(&self, access_token: String, refresh_token: Option<String>) {
        let pair = TokenPair {
            access_token,
            refresh_token,
        };
        let mut tokens = self.tokens.write().await;
        if let Err(e) = Self::persist(&self.session_path, &pair) {
            warn!(error = %e, "Failed to persist session");
        }
        *tokens = Some(pair);
    }

    /// Drop the credential pair and remove the session file.
    /// Calling on an already-cleared store is a no-op.
    pub async fn clear(&self) {
        let mut tokens = self.tokens.write().await;
        *tokens = None;
        if self.session_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.session_path) {
                warn!(error = %e, "Failed to remove session file");
            }
        }
    }

    /// True iff an access token is held.
    ///
    /// The refresh token plays no part here: a session with only an access
    /// token counts as authenticated until the server says otherwise.
    pub async fn is_authenticated(&self) -> bool {
        self.tokens
            .read()
            .await
            .as_ref()
            .is_some_and(|pair| !pair.access_token.is_empty())
    }

    /// The access token to attach to outgoing requests, if any.
    pub async fn access_token(&self) -> Option<String> {
        self.tokens
            .read()
            .await
            .as_ref()
            .map(|pair| pair.access_token.clone())
            .filter(|token| !token.is_empty())
    }

    /// The refresh token, if one is held.
    pub async fn refresh_token(&self) -> Option<String> {
        self.tokens
            .read()
            .await
            .as_ref()
            .and_then(|pair| pair.refresh_token.clone())
    }

    fn persist(path: &Path, pair: &TokenPair) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(pair)?;
        std::fs::write(path, contents)
    }
}
