use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ledger::UserRecord;
use crate::types::{RewardBundle, RewardGrant, RewardKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelConfig {
    /// XP needed to leave level `i`; `xp_curve[0]` must be 0
    pub xp_curve: Vec<u64>,
    /// XP per level once past the end of the curve
    pub extra_step: u64,
    /// One-time rewards for reaching a level
    #[serde(default)]
    pub rewards: BTreeMap<u32, RewardGrant>,
}

impl Default for LevelConfig {
    fn default() -> Self {
        let rewards = [
            (2, RewardGrant::new(RewardKind::Coins, 400)),
            (3, RewardGrant::new(RewardKind::Energy, 30)),
            (4, RewardGrant::new(RewardKind::WheelTokens, 2)),
            (5, RewardGrant::new(RewardKind::StickerPack, 1)),
            (6, RewardGrant::new(RewardKind::Coins, 1200)),
            (7, RewardGrant::new(RewardKind::Energy, 50)),
            (8, RewardGrant::new(RewardKind::Spins, 3)),
            (9, RewardGrant::new(RewardKind::Coins, 2500)),
            (10, RewardGrant::new(RewardKind::StickerPack, 3)),
        ]
        .into_iter()
        .collect();

        LevelConfig {
            xp_curve: vec![0, 100, 250, 450, 700, 1000, 1400, 1850, 2350, 2900],
            extra_step: 600,
            rewards,
        }
    }
}

impl LevelConfig {
    pub fn threshold(&self, level_index: u32) -> u64 {
        let Some(&last) = self.xp_curve.last() else {
            return 0;
        };
        let index = level_index as usize;
        if index < self.xp_curve.len() {
            return self.xp_curve[index];
        }
        let extra = (index - (self.xp_curve.len() - 1)) as u64;
        last.saturating_add(extra.saturating_mul(self.extra_step.max(1)))
    }

    /// Smallest level `L >= 1` with `xp < threshold(L)`
    pub fn level_for_xp(&self, xp: u64) -> u32 {
        let Some(&last) = self.xp_curve.last() else {
            return 1;
        };
        if xp < last {
            let index = self
                .xp_curve
                .iter()
                .skip(1)
                .position(|&threshold| xp < threshold)
                .map_or(self.xp_curve.len() - 1, |i| i + 1);
            return index as u32;
        }
        let past_curve = (xp - last) / self.extra_step.max(1);
        let level = (self.xp_curve.len() as u64 - 1) + past_curve + 1;
        u32::try_from(level).unwrap_or(u32::MAX)
    }

    pub fn progress(&self, xp: u64) -> LevelProgress {
        let level = self.level_for_xp(xp);
        let floor = self.threshold(level.saturating_sub(1));
        let next = self.threshold(level);
        let span = next.saturating_sub(floor);
        let ratio = if span == 0 {
            1.0
        } else {
            (xp.saturating_sub(floor)) as f64 / span as f64
        };
        LevelProgress {
            level,
            xp,
            level_floor_xp: floor,
            next_level_xp: next,
            progress: ratio.clamp(0.0, 1.0),
            next_reward: self.rewards.get(&(level + 1)).copied(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelProgress {
    pub level: u32,
    pub xp: u64,
    pub level_floor_xp: u64,
    pub next_level_xp: u64,
    pub progress: f64,
    pub next_reward: Option<RewardGrant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelUp {
    pub level: u32,
    pub reward: Option<RewardGrant>,
    pub credited: RewardBundle,
}

/// Bring `record.level` in line with its XP and credit level rewards not yet paid.
/// Level rewards never add XP, so this cannot cascade.
pub(crate) fn apply(
    record: &mut UserRecord,
    config: &LevelConfig,
    energy_per_spin: u64,
) -> Vec<LevelUp> {
    let level = config.level_for_xp(record.xp);
    if level <= record.level_reward_checkpoint {
        record.level = record.level.max(level);
        return Vec::new();
    }

    let mut ups = Vec::new();
    for reached in (record.level_reward_checkpoint + 1)..=level {
        let reward = config.rewards.get(&reached).copied();
        let credited = reward
            .map(|grant| grant.to_bundle(energy_per_spin))
            .unwrap_or_default();
        record.credit(&credited);
        ups.push(LevelUp {
            level: reached,
            reward,
            credited,
        });
    }
    record.level = level;
    record.level_reward_checkpoint = level;
    ups
}
