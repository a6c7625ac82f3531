use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::album::{self, PackOpening, PackPayment, StickerOverview, TradeOutcome, TradeReward};
use crate::catalog::{Catalog, CatalogError, CompiledCatalog};
use crate::clock::{Clock, SystemClock};
use crate::daily::{self, DailyClaim, DailyStatus};
use crate::error::{EngineError, lock, read};
use crate::events::{self, EventView, LiveEventTracker, ProgressTracker};
use crate::leaderboard::{self, LeaderboardEntry, Standing};
use crate::ledger::Ledger;
use crate::levels::LevelProgress;
use crate::links::{LinkRedemption, LinkStore, NewLink, RewardLink};
use crate::shop::{PaymentBook, PurchaseReceipt, ShopItem};
use crate::spin::{self, SpinOutcome};
use crate::types::{AlbumId, Balances, RewardBundle, RewardGrant, UserId};
use crate::wheel::{self, WheelOutcome, WheelReward};

/// Where random draws come from
enum RngSource {
    Thread,
    /// Reproducible draws for tests and load runs
    Seeded(Mutex<StdRng>),
}

impl RngSource {
    fn with<T>(&self, draw: impl FnOnce(&mut dyn RngCore) -> T) -> Result<T, EngineError> {
        match self {
            RngSource::Thread => Ok(draw(&mut rand::thread_rng())),
            RngSource::Seeded(rng) => {
                let mut rng = lock(rng)?;
                Ok(draw(&mut *rng))
            }
        }
    }
}

/// Snapshot of everything the client shows about a player
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub user_id: UserId,
    pub external_id: String,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub balances: Balances,
    pub level: LevelProgress,
    pub lifetime_spins: u64,
    pub lifetime_coins: u64,
    pub wheel_spins: u64,
    pub weekly_score: u64,
    pub daily: DailyStatus,
    pub stickers_owned: u64,
    pub albums_completed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub user_id: UserId,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopReward {
    pub rank: u32,
    pub user_id: UserId,
    pub reward: RewardBundle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopRewardFailure {
    pub rank: u32,
    pub user_id: UserId,
    pub kind: &'static str,
    pub message: String,
}

/// Outcome of paying the top players. One winner failing does not stop the
/// rest, so `paid` is exactly who was credited and a retry can target `failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopRewardReport {
    pub paid: Vec<TopReward>,
    pub failed: Vec<TopRewardFailure>,
}

fn pay_each(
    winners: Vec<LeaderboardEntry>,
    mut pay: impl FnMut(&LeaderboardEntry) -> Result<RewardBundle, EngineError>,
) -> TopRewardReport {
    let mut report = TopRewardReport::default();
    for winner in winners {
        match pay(&winner) {
            Ok(reward) => report.paid.push(TopReward {
                rank: winner.rank,
                user_id: winner.user_id,
                reward,
            }),
            Err(e) => {
                tracing::error!(
                    user_id = winner.user_id,
                    rank = winner.rank,
                    "top reward failed: {}",
                    e
                );
                report.failed.push(TopRewardFailure {
                    rank: winner.rank,
                    user_id: winner.user_id,
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        }
    }
    report
}

pub struct EngineBuilder {
    catalog: Option<Catalog>,
    clock: Option<Arc<dyn Clock>>,
    tracker: Option<Arc<dyn ProgressTracker>>,
    seed: Option<u64>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        EngineBuilder {
            catalog: None,
            clock: None,
            tracker: None,
            seed: None,
        }
    }

    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn tracker(mut self, tracker: Arc<dyn ProgressTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<RewardEngine, CatalogError> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => Catalog::stock(clock.now()),
        };
        let compiled = catalog.compile()?;
        let ledger = Ledger::new(compiled.catalog.economy.max_tx_attempts);

        Ok(RewardEngine {
            ledger,
            catalog: RwLock::new(Arc::new(compiled)),
            links: LinkStore::new(),
            payments: PaymentBook::new(),
            clock,
            tracker: self.tracker.unwrap_or_else(|| Arc::new(LiveEventTracker)),
            rng: match self.seed {
                Some(seed) => RngSource::Seeded(Mutex::new(StdRng::seed_from_u64(seed))),
                None => RngSource::Thread,
            },
        })
    }
}

/// The reward engine: every player-facing and operator operation, each one
/// a single all-or-nothing ledger transaction for the user it concerns.
pub struct RewardEngine {
    ledger: Ledger,
    catalog: RwLock<Arc<CompiledCatalog>>,
    links: LinkStore,
    payments: PaymentBook,
    clock: Arc<dyn Clock>,
    tracker: Arc<dyn ProgressTracker>,
    rng: RngSource,
}

impl RewardEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Engine with the stock catalog and the system clock
    pub fn new() -> Result<Self, CatalogError> {
        EngineBuilder::new().build()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    // Catalog

    /// Current catalog snapshot; stays valid even if the catalog is replaced meanwhile
    pub fn catalog(&self) -> Result<Arc<CompiledCatalog>, EngineError> {
        Ok(Arc::clone(&*read(&self.catalog)?))
    }

    /// Validate and swap in a new catalog. On error the current one stays.
    /// The ledger retry bound is fixed at build time and is not reloaded.
    pub fn replace_catalog(&self, catalog: Catalog) -> Result<Arc<CompiledCatalog>, CatalogError> {
        let compiled = Arc::new(catalog.compile()?);
        // Holds a whole Arc, so poisoning cannot leave it torn
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&compiled);
        tracing::info!(
            symbols = compiled.symbols.len(),
            albums = compiled.albums.len(),
            events = compiled.catalog.events.len(),
            "catalog replaced"
        );
        Ok(compiled)
    }

    pub fn reload_catalog_from(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Arc<CompiledCatalog>, CatalogError> {
        let catalog = Catalog::from_json_file(path)?;
        self.replace_catalog(catalog)
    }

    // Users

    pub fn register(
        &self,
        external_id: &str,
        username: Option<&str>,
    ) -> Result<Registration, EngineError> {
        let external_id = external_id.trim();
        if external_id.is_empty() {
            return Err(EngineError::InvalidRequest(
                "external id must not be empty".to_string(),
            ));
        }
        let starting = self.catalog()?.catalog.economy.starting;
        let (user_id, created) =
            self.ledger
                .register(external_id, username, starting, self.clock.now())?;
        if created {
            tracing::info!(user_id, external_id, "registered new player");
        }
        Ok(Registration { user_id, created })
    }

    pub fn find_user(&self, external_id: &str) -> Result<Option<UserId>, EngineError> {
        self.ledger.find(external_id)
    }

    pub fn profile(&self, user_id: UserId) -> Result<Profile, EngineError> {
        let catalog = self.catalog()?;
        let record = self.ledger.snapshot(user_id)?;
        let now = self.clock.now();

        Ok(Profile {
            user_id: record.id,
            external_id: record.external_id.clone(),
            username: record.username.clone(),
            created_at: record.created_at,
            balances: record.balances,
            level: catalog.catalog.levels.progress(record.xp),
            lifetime_spins: record.lifetime_spins,
            lifetime_coins: record.lifetime_coins,
            wheel_spins: record.wheel_spins,
            weekly_score: record.weekly_score(self.ledger.week_epoch()),
            daily: daily::peek(&record, &catalog.catalog.daily, catalog.daily_offset, now),
            stickers_owned: record.stickers.values().map(|&n| u64::from(n)).sum(),
            albums_completed: record.completed_albums.len(),
        })
    }

    // Slot machine

    pub fn spin(&self, user_id: UserId, multiplier: u64) -> Result<SpinOutcome, EngineError> {
        let catalog = self.catalog()?;
        let tracker = self.tracker.as_ref();
        let outcome = self.ledger.transact(user_id, self.clock.now(), |record, tx| {
            self.rng
                .with(|rng| spin::settle(record, tx, &catalog, tracker, multiplier, rng))?
        })?;

        tracing::debug!(
            user_id,
            multiplier,
            label = %outcome.label,
            coins = outcome.rewards.coins,
            energy = outcome.rewards.energy,
            "spin settled"
        );
        Ok(outcome)
    }

    // Wheel

    pub fn wheel_rewards(&self) -> Result<Vec<WheelReward>, EngineError> {
        let catalog = self.catalog()?;
        Ok(catalog
            .wheel
            .as_ref()
            .map(|table| table.items().to_vec())
            .unwrap_or_default())
    }

    pub fn spin_wheel(&self, user_id: UserId) -> Result<WheelOutcome, EngineError> {
        let catalog = self.catalog()?;
        let tracker = self.tracker.as_ref();
        let outcome = self.ledger.transact(user_id, self.clock.now(), |record, tx| {
            self.rng
                .with(|rng| wheel::settle(record, tx, &catalog, tracker, rng))?
        })?;

        tracing::info!(
            user_id,
            prize = %outcome.reward.label,
            "wheel spun"
        );
        Ok(outcome)
    }

    // Daily

    pub fn peek_daily(&self, user_id: UserId) -> Result<DailyStatus, EngineError> {
        let catalog = self.catalog()?;
        let record = self.ledger.snapshot(user_id)?;
        Ok(daily::peek(
            &record,
            &catalog.catalog.daily,
            catalog.daily_offset,
            self.clock.now(),
        ))
    }

    pub fn claim_daily(&self, user_id: UserId) -> Result<DailyClaim, EngineError> {
        let catalog = self.catalog()?;
        let claim = self.ledger.transact(user_id, self.clock.now(), |record, tx| {
            daily::settle_claim(record, tx, &catalog.catalog.daily, catalog.daily_offset)
        })?;

        tracing::info!(user_id, streak = claim.streak, day = %claim.day, "daily reward claimed");
        Ok(claim)
    }

    // Stickers

    pub fn albums(&self, user_id: UserId) -> Result<StickerOverview, EngineError> {
        let catalog = self.catalog()?;
        let record = self.ledger.snapshot(user_id)?;
        Ok(album::overview(&record, &catalog))
    }

    pub fn open_pack(
        &self,
        user_id: UserId,
        album_id: AlbumId,
        payment: PackPayment,
    ) -> Result<PackOpening, EngineError> {
        let catalog = self.catalog()?;
        let opening = self.ledger.transact(user_id, self.clock.now(), |record, _| {
            self.rng
                .with(|rng| album::settle_open(record, &catalog, album_id, payment, rng))?
        })?;

        if opening.album_completed_now {
            tracing::info!(user_id, album_id, "album completed");
        }
        Ok(opening)
    }

    pub fn trade_duplicates(
        &self,
        user_id: UserId,
        reward_type: TradeReward,
        sets: u64,
    ) -> Result<TradeOutcome, EngineError> {
        let catalog = self.catalog()?;
        let economy = &catalog.catalog.economy;
        let outcome = self.ledger.transact(user_id, self.clock.now(), |record, _| {
            album::settle_trade(record, economy, reward_type, sets)
        })?;

        tracing::info!(user_id, sets, ?reward_type, "duplicates traded");
        Ok(outcome)
    }

    // Reward links

    pub fn create_link(&self, request: NewLink) -> Result<RewardLink, EngineError> {
        let now = self.clock.now();
        let link = self
            .rng
            .with(|rng| self.links.create(request, now, rng))??;
        tracing::info!(
            reward = link.grant.kind.as_str(),
            amount = link.grant.amount,
            uses = link.max_uses,
            "reward link created"
        );
        Ok(link)
    }

    pub fn disable_link(&self, token: &str) -> Result<RewardLink, EngineError> {
        let link = self.links.disable(token)?;
        tracing::info!(title = %link.title, "reward link disabled");
        Ok(link)
    }

    pub fn link(&self, token: &str) -> Result<RewardLink, EngineError> {
        self.links.get(token)
    }

    pub fn links(&self) -> Result<Vec<RewardLink>, EngineError> {
        self.links.list()
    }

    pub fn redeem(&self, user_id: UserId, token: &str) -> Result<LinkRedemption, EngineError> {
        let catalog = self.catalog()?;
        let eps = catalog.catalog.economy.energy_per_spin;
        let now = self.clock.now();

        let ((reward, balances), link) = self.links.redeem(token, user_id, |link| {
            let grant = link.grant;
            self.ledger.transact(user_id, now, |record, _| {
                // Link rewards never count toward the leaderboard
                let reward = grant.to_bundle(eps);
                record.credit(&reward);
                Ok((reward, record.balances))
            })
        })?;

        tracing::info!(
            user_id,
            remaining = link.remaining_uses,
            "reward link redeemed"
        );
        Ok(LinkRedemption {
            token: link.token,
            title: link.title,
            grant: link.grant,
            reward,
            remaining_uses: link.remaining_uses,
            balances,
        })
    }

    // Leaderboard

    /// Top `n` this week; `None` uses the configured board size
    pub fn top_n(&self, n: Option<usize>) -> Result<Vec<LeaderboardEntry>, EngineError> {
        let size = match n {
            Some(n) => n,
            None => self.catalog()?.catalog.economy.leaderboard_size,
        };
        leaderboard::top_n(&self.ledger, size)
    }

    pub fn standing(&self, user_id: UserId) -> Result<Standing, EngineError> {
        leaderboard::standing(&self.ledger, user_id)
    }

    /// Zero every weekly score at once. Lifetime totals are untouched.
    pub fn reset_leaderboard(&self) -> u64 {
        let epoch = self.ledger.advance_week_epoch();
        tracing::info!(epoch, "weekly leaderboard reset");
        epoch
    }

    /// Credit `grant` to each of the current top `n`. Paid unscored so the
    /// payout itself cannot reshuffle the board.
    pub fn reward_top(&self, n: usize, grant: RewardGrant) -> Result<TopRewardReport, EngineError> {
        if grant.amount == 0 {
            return Err(EngineError::InvalidRequest(
                "reward amount must be positive".to_string(),
            ));
        }
        let eps = self.catalog()?.catalog.economy.energy_per_spin;
        let now = self.clock.now();
        let winners = leaderboard::top_n(&self.ledger, n)?;

        let report = pay_each(winners, |winner| {
            self.ledger.transact(winner.user_id, now, |record, _| {
                let reward = grant.to_bundle(eps);
                record.credit(&reward);
                Ok(reward)
            })
        });

        tracing::info!(
            players = report.paid.len(),
            failed = report.failed.len(),
            reward = grant.kind.as_str(),
            "top players rewarded"
        );
        Ok(report)
    }

    // Events

    pub fn events(&self, user_id: UserId) -> Result<Vec<EventView>, EngineError> {
        let catalog = self.catalog()?;
        let record = self.ledger.snapshot(user_id)?;
        Ok(events::overview(
            &catalog.catalog.events,
            &record.events,
            self.clock.now(),
        ))
    }

    // Shop

    pub fn shop_items(&self) -> Result<Vec<ShopItem>, EngineError> {
        Ok(self.catalog()?.active_shop_items())
    }

    /// Credit a star purchase the payment issuer has confirmed.
    /// Replays of the same `payment_ref` return the original receipt.
    pub fn confirm_purchase(
        &self,
        user_id: UserId,
        item_slug: &str,
        payment_ref: &str,
        stars_paid: u64,
    ) -> Result<PurchaseReceipt, EngineError> {
        let catalog = self.catalog()?;
        let item = catalog
            .shop_item(item_slug)
            .ok_or_else(|| EngineError::not_found("shop item", item_slug))?;
        let now = self.clock.now();

        let receipt = self
            .payments
            .settle(payment_ref, user_id, item, stars_paid, now, |reward| {
                self.ledger.transact(user_id, now, |record, _| {
                    record.credit(reward);
                    Ok(record.balances)
                })
            })?;

        if !receipt.replayed {
            tracing::info!(user_id, item = item_slug, payment_ref, "purchase credited");
        }
        Ok(receipt)
    }
}
