use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

use crate::error::EngineError;
use crate::ledger::{Ledger, UserRecord};
use crate::types::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: UserId,
    pub username: Option<String>,
    pub score: u64,
    pub level: u32,
    pub achieved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub user_id: UserId,
    /// None until the user scores this week
    pub rank: Option<u32>,
    pub score: u64,
    pub ranked_players: usize,
}

/// Higher score first, then whoever reached it earlier, then lower id
fn by_rank(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.achieved_at.cmp(&b.achieved_at))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

fn entry(record: &UserRecord, epoch: u64) -> Option<LeaderboardEntry> {
    let score = record.weekly_score(epoch);
    if score == 0 {
        return None;
    }
    Some(LeaderboardEntry {
        rank: 0,
        user_id: record.id,
        username: record.username.clone(),
        score,
        level: record.level,
        achieved_at: record.weekly.achieved_at,
    })
}

/// Every user with a score in the current week, in rank order
pub fn ranked(ledger: &Ledger) -> Result<Vec<LeaderboardEntry>, EngineError> {
    let epoch = ledger.week_epoch();
    let mut entries = ledger.scan(|record| entry(record, epoch))?;
    entries.sort_by(by_rank);
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.rank = u32::try_from(index + 1).unwrap_or(u32::MAX);
    }
    Ok(entries)
}

pub fn top_n(ledger: &Ledger, n: usize) -> Result<Vec<LeaderboardEntry>, EngineError> {
    let mut entries = ranked(ledger)?;
    entries.truncate(n);
    Ok(entries)
}

pub fn standing(ledger: &Ledger, user_id: UserId) -> Result<Standing, EngineError> {
    // Fails with NotFound for unknown users
    let record = ledger.snapshot(user_id)?;
    let entries = ranked(ledger)?;
    let rank = entries
        .iter()
        .find(|entry| entry.user_id == user_id)
        .map(|entry| entry.rank);
    Ok(Standing {
        user_id,
        rank,
        score: record.weekly_score(ledger.week_epoch()),
        ranked_players: entries.len(),
    })
}
