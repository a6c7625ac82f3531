use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BinaryHeap};

use crate::catalog::{CompiledCatalog, EconomyConfig};
use crate::error::EngineError;
use crate::ledger::UserRecord;
use crate::types::{AlbumId, Balances, RewardBundle, StickerId};
use crate::weighted::WeightedTable;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sticker {
    /// Unique across all albums
    pub id: StickerId,
    pub name: String,
    pub rarity: Rarity,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: AlbumId,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Coin price of one pack when no free pack token is used
    pub sticker_cost: u64,
    /// Credited once, the first time every sticker is owned
    pub completion_reward: RewardBundle,
    pub stickers: Vec<Sticker>,
    #[serde(default = "enabled")]
    pub is_active: bool,
}

fn enabled() -> bool {
    true
}

impl Album {
    pub fn is_complete(&self, owned: &BTreeMap<StickerId, u32>) -> bool {
        self.stickers
            .iter()
            .all(|sticker| owned.get(&sticker.id).copied().unwrap_or(0) >= 1)
    }
}

/// An album with its rarity-weighted draw table
#[derive(Debug, Clone)]
pub struct CompiledAlbum {
    pub album: Album,
    pub pool: WeightedTable<Sticker>,
}

/// How the player wants to pay for a pack
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackPayment {
    /// Free pack token if one is held, coins otherwise
    #[default]
    Auto,
    Coins,
    Token,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", content = "amount", rename_all = "snake_case")]
pub enum PackCharge {
    Token,
    Coins(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackOpening {
    pub album_id: AlbumId,
    pub sticker: Sticker,
    /// Owned count of the drawn sticker after this pack
    pub quantity: u32,
    pub charge: PackCharge,
    pub album_completed_now: bool,
    pub completion_reward: Option<RewardBundle>,
    pub balances: Balances,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeReward {
    Coins,
    Energy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeOutcome {
    pub reward_type: TradeReward,
    pub sets: u64,
    pub stickers_consumed: u64,
    pub reward: RewardBundle,
    pub balances: Balances,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StickerView {
    #[serde(flatten)]
    pub sticker: Sticker,
    pub owned: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumView {
    pub id: AlbumId,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub sticker_cost: u64,
    pub completion_reward: RewardBundle,
    pub stickers: Vec<StickerView>,
    pub owned_unique: usize,
    pub completed: bool,
    pub reward_claimed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StickerOverview {
    pub albums: Vec<AlbumView>,
    pub free_packs: u64,
    pub duplicates: u64,
    pub set_size: u64,
    pub sets_available: u64,
    pub trade_coins: u64,
    pub trade_energy: u64,
}

/// Owned copies beyond the first, across every sticker
pub fn duplicate_count(owned: &BTreeMap<StickerId, u32>) -> u64 {
    owned
        .values()
        .map(|&count| u64::from(count.saturating_sub(1)))
        .sum()
}

pub fn overview(record: &UserRecord, catalog: &CompiledCatalog) -> StickerOverview {
    let economy = &catalog.catalog.economy;
    let albums = catalog
        .albums
        .values()
        .map(|compiled| {
            let album = &compiled.album;
            let stickers: Vec<StickerView> = album
                .stickers
                .iter()
                .map(|sticker| StickerView {
                    sticker: sticker.clone(),
                    owned: record.stickers.get(&sticker.id).copied().unwrap_or(0),
                })
                .collect();
            AlbumView {
                id: album.id,
                slug: album.slug.clone(),
                name: album.name.clone(),
                description: album.description.clone(),
                sticker_cost: album.sticker_cost,
                completion_reward: album.completion_reward,
                owned_unique: stickers.iter().filter(|view| view.owned > 0).count(),
                completed: album.is_complete(&record.stickers),
                reward_claimed: record.completed_albums.contains(&album.id),
                stickers,
            }
        })
        .collect();

    let duplicates = duplicate_count(&record.stickers);
    StickerOverview {
        albums,
        free_packs: record.balances.sticker_packs,
        duplicates,
        set_size: economy.trade_set_size,
        sets_available: duplicates / economy.trade_set_size.max(1),
        trade_coins: economy.trade_coins_per_set,
        trade_energy: economy.trade_energy_per_set,
    }
}

fn charge_for_pack(
    balances: &mut Balances,
    payment: PackPayment,
    cost: u64,
) -> Result<PackCharge, EngineError> {
    match payment {
        PackPayment::Token => {
            balances.debit_sticker_pack()?;
            Ok(PackCharge::Token)
        }
        PackPayment::Coins => {
            balances.debit_coins(cost)?;
            Ok(PackCharge::Coins(cost))
        }
        PackPayment::Auto if balances.sticker_packs > 0 => {
            balances.debit_sticker_pack()?;
            Ok(PackCharge::Token)
        }
        PackPayment::Auto => {
            balances.debit_coins(cost)?;
            Ok(PackCharge::Coins(cost))
        }
    }
}

/// Pay for a pack, draw a sticker and credit the album reward if this pack completed it.
pub(crate) fn settle_open<R: Rng + ?Sized>(
    record: &mut UserRecord,
    catalog: &CompiledCatalog,
    album_id: AlbumId,
    payment: PackPayment,
    rng: &mut R,
) -> Result<PackOpening, EngineError> {
    let compiled = catalog
        .albums
        .get(&album_id)
        .ok_or_else(|| EngineError::not_found("album", album_id))?;
    let album = &compiled.album;

    let charge = charge_for_pack(&mut record.balances, payment, album.sticker_cost)?;

    let sticker = compiled.pool.draw(rng).clone();
    let owned = record.stickers.entry(sticker.id).or_insert(0);
    *owned = owned.saturating_add(1);
    let quantity = *owned;

    let album_completed_now =
        !record.completed_albums.contains(&album.id) && album.is_complete(&record.stickers);
    let completion_reward = if album_completed_now {
        record.completed_albums.insert(album.id);
        record.credit(&album.completion_reward);
        Some(album.completion_reward)
    } else {
        None
    };

    Ok(PackOpening {
        album_id: album.id,
        sticker,
        quantity,
        charge,
        album_completed_now,
        completion_reward,
        balances: record.balances,
    })
}

/// Remove `count` duplicates, always from the sticker with the most spare copies.
/// No sticker drops below one owned copy.
fn consume_duplicates(owned: &mut BTreeMap<StickerId, u32>, count: u64) {
    let mut heap: BinaryHeap<(u32, StickerId)> = owned
        .iter()
        .filter(|(_, quantity)| **quantity > 1)
        .map(|(&id, &quantity)| (quantity - 1, id))
        .collect();

    let mut remaining = count;
    while remaining > 0 {
        let Some((spare, id)) = heap.pop() else {
            break;
        };
        if let Some(quantity) = owned.get_mut(&id) {
            *quantity -= 1;
        }
        remaining -= 1;
        if spare > 1 {
            heap.push((spare - 1, id));
        }
    }
}

pub(crate) fn settle_trade(
    record: &mut UserRecord,
    economy: &EconomyConfig,
    reward_type: TradeReward,
    sets: u64,
) -> Result<TradeOutcome, EngineError> {
    if sets == 0 {
        return Err(EngineError::InvalidRequest(
            "sets must be at least 1".to_string(),
        ));
    }

    let required = sets.saturating_mul(economy.trade_set_size);
    let available = duplicate_count(&record.stickers);
    if available < required {
        return Err(EngineError::InsufficientDuplicates {
            required,
            available,
        });
    }

    consume_duplicates(&mut record.stickers, required);

    let reward = match reward_type {
        TradeReward::Coins => RewardBundle::coins(sets.saturating_mul(economy.trade_coins_per_set)),
        TradeReward::Energy => RewardBundle {
            energy: sets.saturating_mul(economy.trade_energy_per_set),
            ..RewardBundle::default()
        },
    };
    record.credit(&reward);

    Ok(TradeOutcome {
        reward_type,
        sets,
        stickers_consumed: required,
        reward,
        balances: record.balances,
    })
}
