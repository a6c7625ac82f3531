use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::daily::DailyStreak;
use crate::error::{EngineError, lock, read, write};
use crate::events::EventProgress;
use crate::types::{AlbumId, Balances, EventId, RewardBundle, RewardGrant, StickerId, UserId};

/// Weekly leaderboard score. A score recorded under an older epoch reads as zero,
/// which is how a leaderboard reset zeroes every user at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WeeklyScore {
    pub score: u64,
    pub epoch: u64,
    /// When the current score was reached; earlier wins ties
    pub achieved_at: Option<DateTime<Utc>>,
}

/// Everything the engine owns for one user. Mutated only through `Ledger::transact`.
#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    pub external_id: String,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub balances: Balances,
    pub xp: u64,
    pub level: u32,
    /// Highest level whose level reward has been credited
    pub level_reward_checkpoint: u32,
    pub lifetime_spins: u64,
    pub lifetime_coins: u64,
    pub wheel_spins: u64,
    pub weekly: WeeklyScore,
    pub daily: DailyStreak,
    pub stickers: BTreeMap<StickerId, u32>,
    pub completed_albums: BTreeSet<AlbumId>,
    pub events: BTreeMap<EventId, EventProgress>,
}

impl UserRecord {
    fn new(
        id: UserId,
        external_id: &str,
        username: Option<&str>,
        starting: Balances,
        now: DateTime<Utc>,
    ) -> Self {
        UserRecord {
            id,
            external_id: external_id.to_string(),
            username: username.map(str::to_string),
            created_at: now,
            balances: starting,
            xp: 0,
            level: 1,
            level_reward_checkpoint: 1,
            lifetime_spins: 0,
            lifetime_coins: 0,
            wheel_spins: 0,
            weekly: WeeklyScore::default(),
            daily: DailyStreak::default(),
            stickers: BTreeMap::new(),
            completed_albums: BTreeSet::new(),
            events: BTreeMap::new(),
        }
    }

    pub fn weekly_score(&self, epoch: u64) -> u64 {
        if self.weekly.epoch == epoch {
            self.weekly.score
        } else {
            0
        }
    }

    /// Credit without counting toward XP or the leaderboard
    pub fn credit(&mut self, bundle: &RewardBundle) {
        self.balances.credit(bundle);
    }

    /// Credit where coins count as earnings: XP, lifetime coins and weekly score
    pub fn credit_earned(&mut self, bundle: &RewardBundle, tx: &TxContext) {
        self.balances.credit(bundle);
        if bundle.coins == 0 {
            return;
        }
        self.xp = self.xp.saturating_add(bundle.coins);
        self.lifetime_coins = self.lifetime_coins.saturating_add(bundle.coins);
        // Weeks only roll forward; a stale context never rewinds a newer week
        if self.weekly.epoch < tx.epoch {
            self.weekly = WeeklyScore {
                score: 0,
                epoch: tx.epoch,
                achieved_at: None,
            };
        }
        self.weekly.score = self.weekly.score.saturating_add(bundle.coins);
        self.weekly.achieved_at = Some(tx.now);
    }

    pub fn credit_grant(
        &mut self,
        grant: &RewardGrant,
        energy_per_spin: u64,
        tx: &TxContext,
    ) -> RewardBundle {
        let bundle = grant.to_bundle(energy_per_spin);
        if grant.is_scored() {
            self.credit_earned(&bundle, tx);
        } else {
            self.credit(&bundle);
        }
        bundle
    }
}

/// Per-attempt context handed to a ledger transaction
#[derive(Debug, Clone, Copy)]
pub struct TxContext {
    pub now: DateTime<Utc>,
    pub epoch: u64,
}

struct Slot {
    version: u64,
    record: UserRecord,
}

/// Single source of truth for balances and per-user progress.
///
/// Transactions are optimistic: the closure runs against a private copy of
/// the user's record and the copy is committed only if no other transaction
/// committed for that user in the meantime. A closure returning `Err`
/// commits nothing.
pub struct Ledger {
    users: RwLock<HashMap<UserId, Arc<Mutex<Slot>>>>,
    directory: RwLock<HashMap<String, UserId>>,
    next_id: AtomicU64,
    week_epoch: AtomicU64,
    max_attempts: u32,
}

impl Ledger {
    pub fn new(max_attempts: u32) -> Self {
        Ledger {
            users: RwLock::new(HashMap::new()),
            directory: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            week_epoch: AtomicU64::new(0),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Get or create the user for an external identity. Returns whether it was created.
    pub fn register(
        &self,
        external_id: &str,
        username: Option<&str>,
        starting: Balances,
        now: DateTime<Utc>,
    ) -> Result<(UserId, bool), EngineError> {
        let mut directory = write(&self.directory)?;
        if let Some(&user_id) = directory.get(external_id) {
            return Ok((user_id, false));
        }

        let user_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let record = UserRecord::new(user_id, external_id, username, starting, now);
        write(&self.users)?.insert(
            user_id,
            Arc::new(Mutex::new(Slot { version: 0, record })),
        );
        directory.insert(external_id.to_string(), user_id);
        Ok((user_id, true))
    }

    pub fn find(&self, external_id: &str) -> Result<Option<UserId>, EngineError> {
        Ok(read(&self.directory)?.get(external_id).copied())
    }

    pub fn len(&self) -> Result<usize, EngineError> {
        Ok(read(&self.users)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, EngineError> {
        Ok(self.len()? == 0)
    }

    fn slot(&self, user_id: UserId) -> Result<Arc<Mutex<Slot>>, EngineError> {
        read(&self.users)?
            .get(&user_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("user", user_id))
    }

    /// Consistent copy of a user's committed state
    pub fn snapshot(&self, user_id: UserId) -> Result<UserRecord, EngineError> {
        let slot = self.slot(user_id)?;
        let guard = lock(&slot)?;
        Ok(guard.record.clone())
    }

    pub fn transact<T, F>(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        mut apply: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut(&mut UserRecord, &TxContext) -> Result<T, EngineError>,
    {
        let slot = self.slot(user_id)?;

        for attempt in 1..=self.max_attempts {
            // Epoch read under the slot lock, after any commit the draft reflects
            let (version, mut draft, tx) = {
                let guard = lock(&slot)?;
                let tx = TxContext {
                    now,
                    epoch: self.week_epoch(),
                };
                (guard.version, guard.record.clone(), tx)
            };

            let outcome = apply(&mut draft, &tx)?;

            let mut guard = lock(&slot)?;
            if guard.version == version {
                guard.record = draft;
                guard.version += 1;
                return Ok(outcome);
            }
            tracing::debug!(user_id, attempt, "ledger transaction raced a commit, retrying");
        }

        tracing::warn!(
            user_id,
            attempts = self.max_attempts,
            "ledger transaction gave up after repeated conflicts"
        );
        Err(EngineError::Conflict {
            user_id,
            attempts: self.max_attempts,
        })
    }

    /// Visit every user's committed record, one short lock at a time.
    /// The result is a point-in-time view per user, not across users.
    pub fn scan<T>(
        &self,
        mut visit: impl FnMut(&UserRecord) -> Option<T>,
    ) -> Result<Vec<T>, EngineError> {
        let slots: Vec<Arc<Mutex<Slot>>> = read(&self.users)?.values().cloned().collect();
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            let guard = lock(&slot)?;
            if let Some(value) = visit(&guard.record) {
                out.push(value);
            }
        }
        Ok(out)
    }

    pub fn week_epoch(&self) -> u64 {
        self.week_epoch.load(Ordering::Acquire)
    }

    /// Start a new leaderboard week; returns the new epoch
    pub fn advance_week_epoch(&self) -> u64 {
        self.week_epoch.fetch_add(1, Ordering::AcqRel) + 1
    }
}
