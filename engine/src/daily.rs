use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::ledger::{TxContext, UserRecord};
use crate::types::{Balances, RewardBundle};

/// Per-user daily claim state. Days are calendar days in the server's reference offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStreak {
    pub last_claim_day: Option<NaiveDate>,
    pub streak: u32,
    pub total_claims: u64,
}

impl DailyStreak {
    /// Streak the next claim on `today` would produce
    fn next_streak(&self, today: NaiveDate) -> u32 {
        match self.last_claim_day {
            Some(last) if last.succ_opt() == Some(today) => self.streak.saturating_add(1),
            _ => 1,
        }
    }

    /// Streak as it stands today: zero once a day has been missed
    fn live_streak(&self, today: NaiveDate) -> u32 {
        match self.last_claim_day {
            Some(last) if last == today || last.succ_opt() == Some(today) => self.streak,
            _ => 0,
        }
    }
}

/// Escalating reward table; tier `i` (1-based) pays `tiers[i - 1]`,
/// streaks beyond the last tier keep paying the last tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyConfig {
    pub tiers: Vec<RewardBundle>,
}

impl DailyConfig {
    pub fn max_tier(&self) -> u32 {
        self.tiers.len() as u32
    }

    pub fn reward_for(&self, streak: u32) -> RewardBundle {
        let tier = streak.clamp(1, self.max_tier().max(1)) as usize;
        self.tiers.get(tier - 1).copied().unwrap_or_default()
    }

    /// Stock seven-day table: coins climb 15 per day, day seven adds a bonus chest
    pub fn stock() -> Self {
        let tiers = (1..=7u64)
            .map(|day| {
                let chest = day % 7 == 0;
                RewardBundle {
                    coins: 200 + (day - 1) * 15,
                    energy: 6 + if chest { 25 } else { 0 },
                    wheel_tokens: u64::from(chest),
                    sticker_packs: u64::from(chest),
                }
            })
            .collect();
        DailyConfig { tiers }
    }
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self::stock()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyStatus {
    pub can_claim: bool,
    pub streak: u32,
    pub seconds_until_next: i64,
    pub next_reward: RewardBundle,
    pub day: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyClaim {
    pub reward: RewardBundle,
    pub streak: u32,
    pub day: NaiveDate,
    pub balances: Balances,
}

pub fn reference_day(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Seconds from `now` until the next reference-day boundary
pub fn seconds_until_next_day(now: DateTime<Utc>, offset: FixedOffset) -> i64 {
    let boundary = reference_day(now, offset)
        .succ_opt()
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        .and_then(|midnight| offset.from_local_datetime(&midnight).single());
    match boundary {
        Some(boundary) => (boundary.with_timezone(&Utc) - now).num_seconds().max(0),
        None => 0,
    }
}

pub fn peek(
    record: &UserRecord,
    config: &DailyConfig,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> DailyStatus {
    let today = reference_day(now, offset);
    let daily = &record.daily;
    let can_claim = daily.last_claim_day != Some(today);

    let (seconds_until_next, next_reward) = if can_claim {
        (0, config.reward_for(daily.next_streak(today)))
    } else {
        (
            seconds_until_next_day(now, offset),
            config.reward_for(daily.streak.saturating_add(1)),
        )
    };

    DailyStatus {
        can_claim,
        streak: daily.live_streak(today),
        seconds_until_next,
        next_reward,
        day: today,
    }
}

pub(crate) fn settle_claim(
    record: &mut UserRecord,
    tx: &TxContext,
    config: &DailyConfig,
    offset: FixedOffset,
) -> Result<DailyClaim, EngineError> {
    let today = reference_day(tx.now, offset);
    if record.daily.last_claim_day == Some(today) {
        return Err(EngineError::AlreadyClaimed { day: today });
    }

    let streak = record.daily.next_streak(today);
    let reward = config.reward_for(streak);

    record.daily = DailyStreak {
        last_claim_day: Some(today),
        streak,
        total_claims: record.daily.total_claims.saturating_add(1),
    };
    record.credit(&reward);

    Ok(DailyClaim {
        reward,
        streak,
        day: today,
        balances: record.balances,
    })
}
