use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub type UserId = u64;
pub type SymbolId = u32;
pub type WheelRewardId = u32;
pub type AlbumId = u32;
pub type StickerId = u32;
pub type EventId = u32;

/// What a single reward grant pays out in
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    Coins,
    Energy,
    WheelTokens,
    /// Free spins, paid out as `amount * energy_per_spin` energy
    Spins,
    StickerPack,
    /// Coins that do not count toward XP or the weekly leaderboard
    Bonus,
}

impl RewardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardKind::Coins => "coins",
            RewardKind::Energy => "energy",
            RewardKind::WheelTokens => "wheel_tokens",
            RewardKind::Spins => "spins",
            RewardKind::StickerPack => "sticker_pack",
            RewardKind::Bonus => "bonus",
        }
    }
}

/// A single typed reward, as configured on wheel prizes, links, events and levels
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardGrant {
    #[serde(rename = "reward_type")]
    pub kind: RewardKind,
    pub amount: u64,
}

impl RewardGrant {
    pub fn new(kind: RewardKind, amount: u64) -> Self {
        Self { kind, amount }
    }

    pub fn to_bundle(&self, energy_per_spin: u64) -> RewardBundle {
        let mut bundle = RewardBundle::default();
        match self.kind {
            RewardKind::Coins | RewardKind::Bonus => bundle.coins = self.amount,
            RewardKind::Energy => bundle.energy = self.amount,
            RewardKind::WheelTokens => bundle.wheel_tokens = self.amount,
            RewardKind::Spins => bundle.energy = self.amount.saturating_mul(energy_per_spin),
            RewardKind::StickerPack => bundle.sticker_packs = self.amount,
        }
        bundle
    }

    /// Whether coins from this grant count as earnings (XP, lifetime, weekly score)
    pub fn is_scored(&self) -> bool {
        self.kind == RewardKind::Coins
    }
}

/// A multi-currency amount credited in one step
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardBundle {
    #[serde(default)]
    pub coins: u64,
    #[serde(default)]
    pub energy: u64,
    #[serde(default)]
    pub wheel_tokens: u64,
    #[serde(default)]
    pub sticker_packs: u64,
}

impl RewardBundle {
    pub fn coins(coins: u64) -> Self {
        Self {
            coins,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.coins == 0 && self.energy == 0 && self.wheel_tokens == 0 && self.sticker_packs == 0
    }

    pub fn total(&self) -> u64 {
        self.coins
            .saturating_add(self.energy)
            .saturating_add(self.wheel_tokens)
            .saturating_add(self.sticker_packs)
    }

    pub fn saturating_add(&self, other: &RewardBundle) -> RewardBundle {
        RewardBundle {
            coins: self.coins.saturating_add(other.coins),
            energy: self.energy.saturating_add(other.energy),
            wheel_tokens: self.wheel_tokens.saturating_add(other.wheel_tokens),
            sticker_packs: self.sticker_packs.saturating_add(other.sticker_packs),
        }
    }

    pub fn scaled(&self, factor: u64) -> RewardBundle {
        RewardBundle {
            coins: self.coins.saturating_mul(factor),
            energy: self.energy.saturating_mul(factor),
            wheel_tokens: self.wheel_tokens.saturating_mul(factor),
            sticker_packs: self.sticker_packs.saturating_mul(factor),
        }
    }

    /// Scale by a factor in basis points (10_000 = 1x), truncating
    pub fn scaled_bp(&self, basis_points: u64) -> RewardBundle {
        let scale = |value: u64| -> u64 {
            let scaled = (value as u128 * basis_points as u128) / 10_000;
            u64::try_from(scaled).unwrap_or(u64::MAX)
        };
        RewardBundle {
            coins: scale(self.coins),
            energy: scale(self.energy),
            wheel_tokens: scale(self.wheel_tokens),
            sticker_packs: scale(self.sticker_packs),
        }
    }
}

/// Spendable per-user balances. Unsigned, so never negative; debits check first.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub coins: u64,
    pub energy: u64,
    pub wheel_tokens: u64,
    /// Free sticker-pack tokens
    pub sticker_packs: u64,
}

impl Balances {
    pub fn credit(&mut self, bundle: &RewardBundle) {
        self.coins = self.coins.saturating_add(bundle.coins);
        self.energy = self.energy.saturating_add(bundle.energy);
        self.wheel_tokens = self.wheel_tokens.saturating_add(bundle.wheel_tokens);
        self.sticker_packs = self.sticker_packs.saturating_add(bundle.sticker_packs);
    }

    pub fn debit_coins(&mut self, amount: u64) -> Result<(), EngineError> {
        self.coins = self
            .coins
            .checked_sub(amount)
            .ok_or(EngineError::InsufficientCoins {
                required: amount,
                available: self.coins,
            })?;
        Ok(())
    }

    pub fn debit_energy(&mut self, amount: u64) -> Result<(), EngineError> {
        self.energy = self
            .energy
            .checked_sub(amount)
            .ok_or(EngineError::InsufficientEnergy {
                required: amount,
                available: self.energy,
            })?;
        Ok(())
    }

    pub fn debit_wheel_token(&mut self) -> Result<(), EngineError> {
        self.wheel_tokens = self.wheel_tokens.checked_sub(1).ok_or(EngineError::NoTokens)?;
        Ok(())
    }

    pub fn debit_sticker_pack(&mut self) -> Result<(), EngineError> {
        self.sticker_packs = self
            .sticker_packs
            .checked_sub(1)
            .ok_or(EngineError::NoPackTokens)?;
        Ok(())
    }
}
