use engine::UserId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: UserId,
    pub external_id: String,
    pub username: Option<String>,
}

// What handlers see once the bearer token checks out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub external_id: String,
    pub username: Option<String>,
}

impl From<Session> for AuthenticatedUser {
    fn from(session: Session) -> Self {
        Self {
            user_id: session.user_id,
            external_id: session.external_id,
            username: session.username,
        }
    }
}
