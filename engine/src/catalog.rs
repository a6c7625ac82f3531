use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;
use std::path::Path;
use thiserror::Error;

use crate::album::{Album, CompiledAlbum, Rarity, Sticker};
use crate::daily::DailyConfig;
use crate::events::{EventKind, LiveEvent};
use crate::levels::LevelConfig;
use crate::shop::ShopItem;
use crate::spin::{PayoutPolicy, PayoutRule, SlotSymbol};
use crate::types::{AlbumId, Balances, RewardBundle, RewardGrant, RewardKind};
use crate::weighted::{WeightError, WeightedTable};
use crate::wheel::WheelReward;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{table}: {source}")]
    Weights {
        table: String,
        #[source]
        source: WeightError,
    },
    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: String },
    #[error("invalid economy settings: {0}")]
    InvalidEconomy(String),
    #[error("invalid {kind} {id}: {reason}")]
    Invalid {
        kind: &'static str,
        id: String,
        reason: String,
    },
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog: {0}")]
    Json(#[from] serde_json::Error),
}

fn weights(table: impl Into<String>) -> impl FnOnce(WeightError) -> CatalogError {
    let table = table.into();
    move |source| CatalogError::Weights { table, source }
}

fn invalid(kind: &'static str, id: impl Display, reason: impl Into<String>) -> CatalogError {
    CatalogError::Invalid {
        kind,
        id: id.to_string(),
        reason: reason.into(),
    }
}

fn ensure_unique<K, I>(kind: &'static str, ids: I) -> Result<(), CatalogError>
where
    K: Eq + Hash + Display,
    I: IntoIterator<Item = K>,
{
    let mut seen = HashSet::new();
    for id in ids {
        if seen.contains(&id) {
            return Err(CatalogError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
        seen.insert(id);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Balances a new user starts with
    pub starting: Balances,
    pub energy_per_spin: u64,
    pub coin_cost_per_spin: u64,
    pub allowed_multipliers: Vec<u64>,
    pub trade_set_size: u64,
    pub trade_coins_per_set: u64,
    pub trade_energy_per_set: u64,
    pub leaderboard_size: usize,
    /// Offset of the reference timezone that defines a "day" for daily rewards
    pub daily_utc_offset_minutes: i32,
    /// Optimistic retries before a ledger transaction reports `Conflict`
    pub max_tx_attempts: u32,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        EconomyConfig {
            starting: Balances {
                coins: 100,
                energy: 30,
                wheel_tokens: 1,
                sticker_packs: 0,
            },
            energy_per_spin: 1,
            coin_cost_per_spin: 0,
            allowed_multipliers: vec![1, 2, 3, 5, 10],
            trade_set_size: 5,
            trade_coins_per_set: 350,
            trade_energy_per_set: 18,
            leaderboard_size: 25,
            daily_utc_offset_minutes: 0,
            max_tx_attempts: 8,
        }
    }
}

impl EconomyConfig {
    pub fn daily_offset(&self) -> Result<FixedOffset, CatalogError> {
        FixedOffset::east_opt(self.daily_utc_offset_minutes.saturating_mul(60)).ok_or_else(|| {
            CatalogError::InvalidEconomy(format!(
                "daily offset of {} minutes is out of range",
                self.daily_utc_offset_minutes
            ))
        })
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.allowed_multipliers.is_empty() {
            return Err(CatalogError::InvalidEconomy(
                "at least one wager multiplier must be allowed".to_string(),
            ));
        }
        if self.allowed_multipliers.contains(&0) {
            return Err(CatalogError::InvalidEconomy(
                "wager multipliers must be positive".to_string(),
            ));
        }
        if self.energy_per_spin == 0 && self.coin_cost_per_spin == 0 {
            return Err(CatalogError::InvalidEconomy(
                "a spin must cost energy or coins".to_string(),
            ));
        }
        if self.trade_set_size == 0 {
            return Err(CatalogError::InvalidEconomy(
                "trade set size must be positive".to_string(),
            ));
        }
        if self.max_tx_attempts == 0 {
            return Err(CatalogError::InvalidEconomy(
                "max_tx_attempts must be positive".to_string(),
            ));
        }
        self.daily_offset()?;
        Ok(())
    }
}

/// Operator-editable game content. Loaded from JSON, compiled before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub economy: EconomyConfig,
    pub symbols: Vec<SlotSymbol>,
    #[serde(default)]
    pub payout: PayoutPolicy,
    pub wheel: Vec<WheelReward>,
    pub albums: Vec<Album>,
    #[serde(default)]
    pub daily: DailyConfig,
    #[serde(default)]
    pub levels: LevelConfig,
    #[serde(default)]
    pub events: Vec<LiveEvent>,
    #[serde(default)]
    pub shop: Vec<ShopItem>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::stock(Utc::now())
    }
}

fn symbol(
    id: u32,
    glyph: &str,
    name: &str,
    description: &str,
    weight: f64,
    (coins, energy, wheel_tokens): (u64, u64, u64),
) -> SlotSymbol {
    SlotSymbol {
        id,
        glyph: glyph.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        weight,
        reward: RewardBundle {
            coins,
            energy,
            wheel_tokens,
            sticker_packs: 0,
        },
        is_active: true,
        sort_order: id as i32,
    }
}

fn prize(id: u32, label: &str, kind: RewardKind, amount: u64, weight: f64) -> WheelReward {
    WheelReward {
        id,
        label: label.to_string(),
        grant: RewardGrant::new(kind, amount),
        weight,
        is_active: true,
    }
}

fn sticker(id: u32, name: &str, rarity: Rarity, weight: f64) -> Sticker {
    Sticker {
        id,
        name: name.to_string(),
        rarity,
        weight,
    }
}

fn star_pack(
    sort_order: i32,
    slug: &str,
    name: &str,
    (stars, energy, bonus_spins): (u64, u64, u64),
    description: &str,
) -> ShopItem {
    ShopItem {
        slug: slug.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        stars,
        energy,
        bonus_spins,
        sort_order,
        is_active: true,
    }
}

/// Album completion pays `spins` worth of energy plus as many wheel tokens
fn album_reward(spins: u64, energy_per_spin: u64) -> RewardBundle {
    RewardBundle {
        energy: spins * energy_per_spin,
        wheel_tokens: spins,
        ..RewardBundle::default()
    }
}

impl Catalog {
    /// The stock game content. The demo event window is anchored at `now`.
    pub fn stock(now: DateTime<Utc>) -> Self {
        let economy = EconomyConfig::default();
        let eps = economy.energy_per_spin;

        let symbols = vec![
            symbol(1, "🪙", "Coin Burst", "Steady stream of SharkCoins", 1.8, (120, 2, 0)),
            symbol(2, "⚡", "Energy Surge", "Power-up burst that fuels marathon spins", 1.5, (40, 6, 0)),
            symbol(3, "🌀", "Token Typhoon", "Wheel tokens for premium prize wheels", 1.1, (60, 1, 1)),
            symbol(4, "💠", "Prism Vault", "High yield crystal cache with coins", 0.9, (220, 3, 0)),
            symbol(5, "🦈", "Shark Jackpot", "Signature shark pull with all resources", 0.6, (360, 6, 2)),
            symbol(6, "🎁", "Mystery Cache", "Balanced grab bag of goodies", 0.85, (140, 2, 1)),
            symbol(7, "🌊", "Empty Net", "Sometimes the tides are quiet", 1.25, (0, 0, 0)),
        ];

        let wheel = vec![
            prize(1, "250 Coins", RewardKind::Coins, 250, 2.5),
            prize(2, "+1 Spin", RewardKind::Spins, 1, 2.0),
            prize(3, "Mega 1000", RewardKind::Coins, 1000, 0.6),
            prize(4, "Energy Burst", RewardKind::Energy, 50, 1.8),
            prize(5, "Sticker Pack", RewardKind::StickerPack, 1, 2.1),
            prize(6, "Jackpot 5000", RewardKind::Coins, 5000, 0.25),
            prize(7, "Lucky 100", RewardKind::Coins, 100, 3.2),
            prize(8, "+3 Spins", RewardKind::Spins, 3, 0.9),
        ];

        let albums = vec![
            Album {
                id: 1,
                slug: "ocean-legends".to_string(),
                name: "Ocean Legends".to_string(),
                description: "Collect the fiercest predators of the seven seas".to_string(),
                sticker_cost: 40,
                completion_reward: album_reward(3, eps),
                stickers: vec![
                    sticker(1, "Great Hammerhead", Rarity::Rare, 0.8),
                    sticker(2, "Tiger Shark", Rarity::Common, 2.5),
                    sticker(3, "Goblin Shark", Rarity::Epic, 0.35),
                    sticker(4, "Manta Ray", Rarity::Common, 2.0),
                    sticker(5, "Whale Shark", Rarity::Legendary, 0.15),
                ],
                is_active: true,
            },
            Album {
                id: 2,
                slug: "sky-voyagers".to_string(),
                name: "Sky Voyagers".to_string(),
                description: "Fly with aerial aces to earn extra spins".to_string(),
                sticker_cost: 30,
                completion_reward: album_reward(2, eps),
                stickers: vec![
                    sticker(6, "Storm Seagull", Rarity::Common, 2.7),
                    sticker(7, "Jetpack Penguin", Rarity::Rare, 0.9),
                    sticker(8, "Aurora Drake", Rarity::Legendary, 0.2),
                    sticker(9, "Sky Whale", Rarity::Epic, 0.35),
                ],
                is_active: true,
            },
        ];

        let events = vec![LiveEvent {
            id: 1,
            slug: "grand-regatta".to_string(),
            name: "Grand Regatta".to_string(),
            description: "Spin the reels to earn regatta tokens and cash-in spins".to_string(),
            start_at: now - Duration::days(1),
            end_at: now + Duration::days(5),
            target: 150,
            kind: EventKind::Spins,
            reward: RewardGrant::new(RewardKind::Spins, 5),
            is_active: true,
        }];

        let shop = vec![
            star_pack(0, "energy_100", "Coral Splash 100", (50, 100, 1), "Starter burst to keep the reels humming."),
            star_pack(1, "energy_250", "Abyss Diver 250", (120, 250, 3), "Big energy dive plus bonus Wheel Tokens."),
            star_pack(2, "energy_600", "Mega Reef 600", (260, 600, 8), "Legendary boost with neon wheel fireworks."),
            star_pack(3, "energy_1200", "Galactic Tide 1200", (520, 1200, 20), "Whale-sized stash plus stacks of spins."),
            star_pack(4, "energy_2500", "Titan Storm 2500", (980, 2500, 45), "Ultimate marathon kit for leaderboard runs."),
            star_pack(5, "energy_4200", "Aurora Lumina 4200", (1600, 4200, 85), "Festival bundle with radiant sticker showers and mega spins."),
            star_pack(6, "energy_7200", "Orbital Riptide 7200", (2800, 7200, 160), "Championship-grade hoard with cosmic wheel tokens for squads."),
        ];

        Catalog {
            economy,
            symbols,
            payout: PayoutPolicy::default(),
            wheel,
            albums,
            daily: DailyConfig::stock(),
            levels: LevelConfig::default(),
            events,
            shop,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String, CatalogError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn compile(self) -> Result<CompiledCatalog, CatalogError> {
        CompiledCatalog::compile(self)
    }
}

/// A validated catalog with its draw tables built. Immutable once built;
/// hot reload swaps in a whole new one.
#[derive(Debug)]
pub struct CompiledCatalog {
    pub catalog: Catalog,
    pub symbols: WeightedTable<SlotSymbol>,
    pub payout: Box<dyn PayoutRule>,
    /// None when every prize is disabled
    pub wheel: Option<WeightedTable<WheelReward>>,
    /// Active albums only
    pub albums: BTreeMap<AlbumId, CompiledAlbum>,
    pub daily_offset: FixedOffset,
}

impl CompiledCatalog {
    pub fn compile(catalog: Catalog) -> Result<Self, CatalogError> {
        catalog.economy.validate()?;
        let daily_offset = catalog.economy.daily_offset()?;

        ensure_unique("symbol", catalog.symbols.iter().map(|s| s.id))?;
        ensure_unique("wheel reward", catalog.wheel.iter().map(|w| w.id))?;
        ensure_unique("album", catalog.albums.iter().map(|a| a.id))?;
        ensure_unique(
            "sticker",
            catalog
                .albums
                .iter()
                .flat_map(|a| a.stickers.iter().map(|s| s.id)),
        )?;
        ensure_unique("event", catalog.events.iter().map(|e| e.id))?;
        ensure_unique("shop item", catalog.shop.iter().map(|i| i.slug.as_str()))?;

        let mut active_symbols: Vec<&SlotSymbol> =
            catalog.symbols.iter().filter(|s| s.is_active).collect();
        active_symbols.sort_by_key(|s| (s.sort_order, s.id));
        let symbols = WeightedTable::new(active_symbols.into_iter().map(|s| (s.clone(), s.weight)))
            .map_err(weights("slot symbols"))?;

        let active_prizes: Vec<(WheelReward, f64)> = catalog
            .wheel
            .iter()
            .filter(|w| w.is_active)
            .map(|w| (w.clone(), w.weight))
            .collect();
        let wheel = if active_prizes.is_empty() {
            None
        } else {
            Some(WeightedTable::new(active_prizes).map_err(weights("wheel rewards"))?)
        };

        let mut albums = BTreeMap::new();
        for album in catalog.albums.iter().filter(|a| a.is_active) {
            let pool = WeightedTable::new(album.stickers.iter().map(|s| (s.clone(), s.weight)))
                .map_err(weights(format!("album {}", album.slug)))?;
            albums.insert(
                album.id,
                CompiledAlbum {
                    album: album.clone(),
                    pool,
                },
            );
        }

        if catalog.daily.tiers.is_empty() {
            return Err(invalid("daily", "tiers", "at least one reward tier is required"));
        }

        let curve = &catalog.levels.xp_curve;
        if curve.first() != Some(&0) {
            return Err(invalid("levels", "xp_curve", "must start at 0"));
        }
        if curve.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(invalid("levels", "xp_curve", "must be strictly increasing"));
        }
        if catalog.levels.extra_step == 0 {
            return Err(invalid("levels", "extra_step", "must be positive"));
        }

        for event in &catalog.events {
            if event.end_at < event.start_at {
                return Err(invalid("event", &event.slug, "ends before it starts"));
            }
            if event.target == 0 {
                return Err(invalid("event", &event.slug, "target must be positive"));
            }
        }

        let payout = catalog.payout.build();

        Ok(CompiledCatalog {
            catalog,
            symbols,
            payout,
            wheel,
            albums,
            daily_offset,
        })
    }

    pub fn active_shop_items(&self) -> Vec<ShopItem> {
        let mut items: Vec<ShopItem> = self
            .catalog
            .shop
            .iter()
            .filter(|item| item.is_active)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.sort_order);
        items
    }

    pub fn shop_item(&self, slug: &str) -> Option<&ShopItem> {
        self.catalog
            .shop
            .iter()
            .find(|item| item.is_active && item.slug == slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stock() -> Catalog {
        Catalog::stock(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_stock_catalog_compiles() {
        let compiled = stock().compile().unwrap();
        assert_eq!(compiled.symbols.len(), 7);
        assert_eq!(compiled.wheel.as_ref().map(|w| w.len()), Some(8));
        assert_eq!(compiled.albums.len(), 2);
        assert_eq!(compiled.albums[&1].pool.len(), 5);
        assert_eq!(compiled.active_shop_items().len(), 7);
        assert_eq!(compiled.shop_item("energy_250").map(|i| i.stars), Some(120));
        assert_eq!(
            compiled.albums[&1].album.completion_reward,
            RewardBundle {
                coins: 0,
                energy: 3,
                wheel_tokens: 3,
                sticker_packs: 0
            }
        );
    }

    #[test]
    fn test_json_round_trip_keeps_content() {
        let catalog = stock();
        let json = catalog.to_json_pretty().unwrap();
        let parsed = Catalog::from_json_str(&json).unwrap();
        assert_eq!(parsed, catalog);
    }

    #[test]
    fn test_rejects_bad_weights() {
        let mut catalog = stock();
        catalog.symbols[2].weight = 0.0;
        match catalog.compile() {
            Err(CatalogError::Weights { table, source }) => {
                assert_eq!(table, "slot symbols");
                assert_eq!(
                    source,
                    WeightError::InvalidWeight {
                        index: 2,
                        weight: 0.0
                    }
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rejects_wheel_weights_that_overflow() {
        let mut catalog = stock();
        for prize in &mut catalog.wheel {
            prize.weight = f64::MAX;
        }
        assert!(matches!(
            catalog.compile(),
            Err(CatalogError::Weights {
                source: WeightError::NonFiniteTotal { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_all_symbols_disabled() {
        let mut catalog = stock();
        for symbol in &mut catalog.symbols {
            symbol.is_active = false;
        }
        assert!(matches!(
            catalog.compile(),
            Err(CatalogError::Weights {
                source: WeightError::Empty,
                ..
            })
        ));
    }

    #[test]
    fn test_disabled_content_is_hidden() {
        let mut catalog = stock();
        for prize in &mut catalog.wheel {
            prize.is_active = false;
        }
        catalog.albums[1].is_active = false;
        catalog.shop[0].is_active = false;
        let compiled = catalog.compile().unwrap();
        assert!(compiled.wheel.is_none());
        assert_eq!(compiled.albums.len(), 1);
        assert!(compiled.shop_item("energy_100").is_none());
    }

    #[test]
    fn test_rejects_duplicates_and_bad_economy() {
        let mut catalog = stock();
        catalog.albums[1].stickers[0].id = 1;
        assert!(matches!(
            catalog.compile(),
            Err(CatalogError::DuplicateId { kind: "sticker", .. })
        ));

        let mut catalog = stock();
        catalog.economy.allowed_multipliers = vec![1, 0];
        assert!(matches!(
            catalog.compile(),
            Err(CatalogError::InvalidEconomy(_))
        ));

        let mut catalog = stock();
        catalog.economy.daily_utc_offset_minutes = 25 * 60;
        assert!(matches!(
            catalog.compile(),
            Err(CatalogError::InvalidEconomy(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "symbols": [
                {"id": 1, "glyph": "🪙", "name": "Coin", "weight": 1.0, "reward": {"coins": 10}}
            ],
            "wheel": [],
            "albums": []
        }"#;
        let compiled = Catalog::from_json_str(json).unwrap().compile().unwrap();
        assert_eq!(compiled.symbols.len(), 1);
        assert!(compiled.wheel.is_none());
        assert_eq!(compiled.catalog.economy, EconomyConfig::default());
        assert_eq!(compiled.catalog.daily.max_tier(), 7);
    }
}
