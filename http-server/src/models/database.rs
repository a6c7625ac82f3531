use engine::UserId;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::Session;

// Session directory. Balances live in the engine; this only maps tokens to players.
#[derive(Clone)]
pub struct InMemoryStorage {
    pub sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    // Entries are replaced whole, so a poisoned map is still consistent
    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// hex(sha256(secret ‖ external_id)): stable across logins for the same player
    pub fn session_token(secret: &str, external_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.update(external_id.as_bytes());
        hex::encode(hasher.finalize())
    }

    // Get or create the session for a registered player
    pub fn open_session(
        &self,
        secret: &str,
        user_id: UserId,
        external_id: &str,
        username: Option<&str>,
    ) -> Session {
        let session_id = Self::session_token(secret, external_id);
        let mut sessions = self.sessions();

        let session = sessions
            .entry(session_id.clone())
            .or_insert_with(|| Session {
                session_id,
                user_id,
                external_id: external_id.to_string(),
                username: None,
            });
        // Latest display name wins
        if username.is_some() {
            session.username = username.map(str::to_string);
        }
        session.clone()
    }

    pub fn get_session(&self, session_id: &str) -> Option<Session> {
        self.sessions().get(session_id).cloned()
    }
}
