use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::CompiledCatalog;
use crate::error::EngineError;
use crate::events::{Activity, EventCompletion, EventKind, ProgressTracker};
use crate::ledger::{TxContext, UserRecord};
use crate::levels::{self, LevelUp};
use crate::types::{Balances, RewardBundle, SymbolId};

pub const REELS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSymbol {
    pub id: SymbolId,
    /// Display glyph, e.g. "🦈"
    pub glyph: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub weight: f64,
    /// Paid per occurrence on the line, before the wager multiplier
    pub reward: RewardBundle,
    #[serde(default = "enabled")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i32,
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolView {
    pub id: SymbolId,
    pub glyph: String,
    pub name: String,
}

impl From<&SlotSymbol> for SymbolView {
    fn from(symbol: &SlotSymbol) -> Self {
        SymbolView {
            id: symbol.id,
            glyph: symbol.glyph.clone(),
            name: symbol.name.clone(),
        }
    }
}

/// Shape of the drawn line, used to pick a bonus factor
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    Triple,
    Pair,
    Featured,
    Mixed,
}

impl Pattern {
    pub fn of(reels: &[&SlotSymbol; REELS], featured_glyph: Option<&str>) -> Pattern {
        let [a, b, c] = reels;
        if a.id == b.id && b.id == c.id {
            Pattern::Triple
        } else if a.id == b.id || b.id == c.id || a.id == c.id {
            Pattern::Pair
        } else if featured_glyph.is_some_and(|glyph| reels.iter().any(|s| s.glyph == glyph)) {
            Pattern::Featured
        } else {
            Pattern::Mixed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub pattern: Pattern,
    pub label: String,
    pub rewards: RewardBundle,
}

/// Turns a drawn line and wager into a reward bundle
pub trait PayoutRule: Send + Sync + fmt::Debug {
    fn evaluate(&self, reels: &[&SlotSymbol; REELS], multiplier: u64) -> Payout;
}

fn base_rewards(reels: &[&SlotSymbol; REELS]) -> RewardBundle {
    reels
        .iter()
        .fold(RewardBundle::default(), |sum, symbol| sum.saturating_add(&symbol.reward))
}

/// Each symbol pays its own bundle, scaled by the multiplier, summed. No line bonus.
#[derive(Debug, Default, Clone, Copy)]
pub struct IndependentSum;

impl PayoutRule for IndependentSum {
    fn evaluate(&self, reels: &[&SlotSymbol; REELS], multiplier: u64) -> Payout {
        let rewards = base_rewards(reels).scaled(multiplier);
        let label = if rewards.is_empty() { "Empty Net" } else { "Cascade" };
        Payout {
            pattern: Pattern::of(reels, None),
            label: label.to_string(),
            rewards,
        }
    }
}

/// Independent sum, then multiplied by a factor keyed by the line's pattern.
/// Factors are basis points (10_000 = 1x).
#[derive(Debug, Clone)]
pub struct MatchBonus {
    pub triple_bp: u64,
    pub pair_bp: u64,
    pub featured_glyph: Option<String>,
    pub featured_bp: u64,
    pub featured_label: String,
}

impl MatchBonus {
    fn factor_bp(&self, pattern: Pattern) -> u64 {
        match pattern {
            Pattern::Triple => self.triple_bp,
            Pattern::Pair => self.pair_bp,
            Pattern::Featured => self.featured_bp,
            Pattern::Mixed => 10_000,
        }
    }
}

impl PayoutRule for MatchBonus {
    fn evaluate(&self, reels: &[&SlotSymbol; REELS], multiplier: u64) -> Payout {
        let pattern = Pattern::of(reels, self.featured_glyph.as_deref());
        let rewards = base_rewards(reels)
            .scaled(multiplier)
            .scaled_bp(self.factor_bp(pattern));

        let label = if rewards.is_empty() {
            "Empty Net".to_string()
        } else {
            match pattern {
                Pattern::Triple => format!("Triple {}", reels[0].name),
                Pattern::Pair => {
                    let pair = if reels[0].id == reels[1].id || reels[0].id == reels[2].id {
                        reels[0]
                    } else {
                        reels[1]
                    };
                    format!("Twin {}", pair.name)
                }
                Pattern::Featured => self.featured_label.clone(),
                Pattern::Mixed => "Cascade".to_string(),
            }
        };

        Payout {
            pattern,
            label,
            rewards,
        }
    }
}

/// Operator-selectable payout policy, stored in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PayoutPolicy {
    IndependentSum,
    MatchBonus {
        triple_bp: u64,
        pair_bp: u64,
        #[serde(default)]
        featured_glyph: Option<String>,
        #[serde(default = "unit_bp")]
        featured_bp: u64,
        #[serde(default = "resonance")]
        featured_label: String,
    },
}

fn unit_bp() -> u64 {
    10_000
}

fn resonance() -> String {
    "Shark Resonance".to_string()
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        PayoutPolicy::MatchBonus {
            triple_bp: 30_000,
            pair_bp: 20_000,
            featured_glyph: Some("🦈".to_string()),
            featured_bp: 15_000,
            featured_label: resonance(),
        }
    }
}

impl PayoutPolicy {
    pub fn build(&self) -> Box<dyn PayoutRule> {
        match self {
            PayoutPolicy::IndependentSum => Box::new(IndependentSum),
            PayoutPolicy::MatchBonus {
                triple_bp,
                pair_bp,
                featured_glyph,
                featured_bp,
                featured_label,
            } => Box::new(MatchBonus {
                triple_bp: *triple_bp,
                pair_bp: *pair_bp,
                featured_glyph: featured_glyph.clone(),
                featured_bp: *featured_bp,
                featured_label: featured_label.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpinOutcome {
    pub multiplier: u64,
    pub symbols: Vec<SymbolView>,
    pub pattern: Pattern,
    pub label: String,
    pub rewards: RewardBundle,
    pub coin_cost: u64,
    pub energy_spent: u64,
    /// Reward coins minus coin cost
    pub net_coins: i64,
    pub balances: Balances,
    pub level_ups: Vec<LevelUp>,
    pub events_completed: Vec<EventCompletion>,
}

/// Debit the wager, draw the line, credit the payout and side rewards.
/// Runs inside a ledger transaction, so any error discards every change.
pub(crate) fn settle<R: Rng + ?Sized>(
    record: &mut UserRecord,
    tx: &TxContext,
    catalog: &CompiledCatalog,
    tracker: &dyn ProgressTracker,
    multiplier: u64,
    rng: &mut R,
) -> Result<SpinOutcome, EngineError> {
    let economy = &catalog.catalog.economy;
    if !economy.allowed_multipliers.contains(&multiplier) {
        return Err(EngineError::InvalidWager {
            multiplier,
            allowed: economy.allowed_multipliers.clone(),
        });
    }

    let energy_cost = multiplier.saturating_mul(economy.energy_per_spin);
    let coin_cost = multiplier.saturating_mul(economy.coin_cost_per_spin);
    record.balances.debit_energy(energy_cost)?;
    record.balances.debit_coins(coin_cost)?;

    let table = &catalog.symbols;
    let reels: [&SlotSymbol; REELS] = [table.draw(rng), table.draw(rng), table.draw(rng)];
    let payout = catalog.payout.evaluate(&reels, multiplier);

    record.credit_earned(&payout.rewards, tx);
    record.lifetime_spins = record.lifetime_spins.saturating_add(1);

    let events_completed = tracker.advance(
        &catalog.catalog.events,
        &mut record.events,
        Activity {
            kind: EventKind::Spins,
            count: multiplier,
        },
        tx.now,
    );
    for completion in &events_completed {
        record.credit_grant(&completion.reward, economy.energy_per_spin, tx);
    }

    let level_ups = levels::apply(record, &catalog.catalog.levels, economy.energy_per_spin);

    let reward_coins = i64::try_from(payout.rewards.coins).unwrap_or(i64::MAX);
    let cost_coins = i64::try_from(coin_cost).unwrap_or(i64::MAX);

    Ok(SpinOutcome {
        multiplier,
        symbols: reels.iter().map(|symbol| SymbolView::from(*symbol)).collect(),
        pattern: payout.pattern,
        label: payout.label,
        rewards: payout.rewards,
        coin_cost,
        energy_spent: energy_cost,
        net_coins: reward_coins.saturating_sub(cost_coins),
        balances: record.balances,
        level_ups,
        events_completed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(id: SymbolId, glyph: &str, coins: u64) -> SlotSymbol {
        SlotSymbol {
            id,
            glyph: glyph.to_string(),
            name: format!("Symbol {id}"),
            description: String::new(),
            weight: 1.0,
            reward: RewardBundle {
                coins,
                energy: 1,
                wheel_tokens: 0,
                sticker_packs: 0,
            },
            is_active: true,
            sort_order: 0,
        }
    }

    fn match_bonus() -> MatchBonus {
        MatchBonus {
            triple_bp: 30_000,
            pair_bp: 20_000,
            featured_glyph: Some("🦈".to_string()),
            featured_bp: 15_000,
            featured_label: "Shark Resonance".to_string(),
        }
    }

    #[test]
    fn test_pattern_detection() {
        let a = symbol(1, "🪙", 10);
        let b = symbol(2, "⚡", 10);
        let shark = symbol(3, "🦈", 10);
        assert_eq!(Pattern::of(&[&a, &a, &a], None), Pattern::Triple);
        assert_eq!(Pattern::of(&[&a, &b, &a], None), Pattern::Pair);
        assert_eq!(Pattern::of(&[&a, &b, &shark], Some("🦈")), Pattern::Featured);
        assert_eq!(Pattern::of(&[&a, &b, &shark], None), Pattern::Mixed);
    }

    #[test]
    fn test_independent_sum_scales_by_multiplier() {
        let a = symbol(1, "🪙", 10);
        let b = symbol(2, "⚡", 20);
        let payout = IndependentSum.evaluate(&[&a, &a, &b], 3);
        assert_eq!(payout.rewards.coins, 120);
        assert_eq!(payout.rewards.energy, 9);
        assert_eq!(payout.label, "Cascade");
    }

    #[test]
    fn test_match_bonus_factors() {
        let rule = match_bonus();
        let a = symbol(1, "🪙", 10);
        let b = symbol(2, "⚡", 20);
        let c = symbol(4, "💠", 30);
        let shark = symbol(3, "🦈", 40);

        let triple = rule.evaluate(&[&a, &a, &a], 2);
        assert_eq!(triple.rewards.coins, 30 * 2 * 3);
        assert_eq!(triple.label, "Triple Symbol 1");

        let pair = rule.evaluate(&[&b, &a, &a], 1);
        assert_eq!(pair.rewards.coins, 40 * 2);
        assert_eq!(pair.label, "Twin Symbol 1");

        let featured = rule.evaluate(&[&a, &b, &shark], 1);
        assert_eq!(featured.rewards.coins, 70 * 3 / 2);
        assert_eq!(featured.pattern, Pattern::Featured);
        assert_eq!(featured.label, "Shark Resonance");

        let mixed = rule.evaluate(&[&a, &b, &c], 1);
        assert_eq!(mixed.rewards.coins, 60);
        assert_eq!(mixed.label, "Cascade");
    }

    #[test]
    fn test_empty_line_label() {
        let mut empty = symbol(9, "🌊", 0);
        empty.reward = RewardBundle::default();
        let payout = match_bonus().evaluate(&[&empty, &empty, &empty], 5);
        assert!(payout.rewards.is_empty());
        assert_eq!(payout.label, "Empty Net");
    }

    #[test]
    fn test_policy_round_trips_through_json() {
        let json = r#"{"policy":"match_bonus","triple_bp":50000,"pair_bp":15000}"#;
        let policy: PayoutPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(
            policy,
            PayoutPolicy::MatchBonus {
                triple_bp: 50_000,
                pair_bp: 15_000,
                featured_glyph: None,
                featured_bp: 10_000,
                featured_label: "Shark Resonance".to_string(),
            }
        );
        let independent: PayoutPolicy =
            serde_json::from_str(r#"{"policy":"independent_sum"}"#).unwrap();
        assert_eq!(independent, PayoutPolicy::IndependentSum);
    }
}
