use chrono::NaiveDate;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

use crate::types::UserId;

/// Every way an engine operation can be rejected. Operations are all-or-nothing:
/// when one of these is returned no state has changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("multiplier {multiplier} is not an allowed wager (allowed: {allowed:?})")]
    InvalidWager { multiplier: u64, allowed: Vec<u64> },
    #[error("not enough energy: need {required}, have {available}")]
    InsufficientEnergy { required: u64, available: u64 },
    #[error("not enough coins: need {required}, have {available}")]
    InsufficientCoins { required: u64, available: u64 },
    #[error("no wheel tokens left")]
    NoTokens,
    #[error("no free sticker packs left")]
    NoPackTokens,
    #[error("daily reward already claimed for {day}")]
    AlreadyClaimed { day: NaiveDate },
    #[error("reward link is not valid")]
    InvalidToken,
    #[error("reward link has no uses left")]
    Exhausted,
    #[error("reward link already redeemed by user {user_id}")]
    AlreadyRedeemed { user_id: UserId },
    #[error("not enough duplicate stickers: need {required}, have {available}")]
    InsufficientDuplicates { required: u64, available: u64 },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("transaction for user {user_id} conflicted {attempts} times")]
    Conflict { user_id: UserId, attempts: u32 },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable name for the failure
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidWager { .. } => "invalid_wager",
            EngineError::InsufficientEnergy { .. } => "insufficient_energy",
            EngineError::InsufficientCoins { .. } => "insufficient_coins",
            EngineError::NoTokens => "no_tokens",
            EngineError::NoPackTokens => "no_pack_tokens",
            EngineError::AlreadyClaimed { .. } => "already_claimed",
            EngineError::InvalidToken => "invalid_token",
            EngineError::Exhausted => "exhausted",
            EngineError::AlreadyRedeemed { .. } => "already_redeemed",
            EngineError::InsufficientDuplicates { .. } => "insufficient_duplicates",
            EngineError::NotFound { .. } => "not_found",
            EngineError::Conflict { .. } => "conflict",
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::Storage(_) => "storage",
        }
    }

    /// Only `Conflict` can change outcome on retry; the ledger already retries it internally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, EngineError> {
    mutex
        .lock()
        .map_err(|_| EngineError::Storage("lock poisoned".to_string()))
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, EngineError> {
    lock.read()
        .map_err(|_| EngineError::Storage("lock poisoned".to_string()))
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, EngineError> {
    lock.write()
        .map_err(|_| EngineError::Storage("lock poisoned".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflict_is_retryable() {
        assert!(
            EngineError::Conflict {
                user_id: 1,
                attempts: 3
            }
            .is_retryable()
        );
        assert!(!EngineError::NoTokens.is_retryable());
        assert!(!EngineError::Exhausted.is_retryable());
    }

    #[test]
    fn test_messages_are_human_readable() {
        let err = EngineError::InsufficientEnergy {
            required: 5,
            available: 2,
        };
        assert_eq!(err.to_string(), "not enough energy: need 5, have 2");
        assert_eq!(err.kind(), "insufficient_energy");
        assert_eq!(
            EngineError::not_found("album", 9).to_string(),
            "album 9 not found"
        );
    }
}
