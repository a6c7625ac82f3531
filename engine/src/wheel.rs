use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::CompiledCatalog;
use crate::error::EngineError;
use crate::events::{Activity, EventCompletion, EventKind, ProgressTracker};
use crate::ledger::{TxContext, UserRecord};
use crate::levels::{self, LevelUp};
use crate::types::{Balances, RewardBundle, RewardGrant, WheelRewardId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelReward {
    pub id: WheelRewardId,
    pub label: String,
    #[serde(flatten)]
    pub grant: RewardGrant,
    pub weight: f64,
    #[serde(default = "enabled")]
    pub is_active: bool,
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WheelOutcome {
    pub reward: WheelReward,
    /// Index of the prize among the active wheel segments
    pub segment: usize,
    pub credited: RewardBundle,
    pub balances: Balances,
    pub level_ups: Vec<LevelUp>,
    pub events_completed: Vec<EventCompletion>,
}

pub(crate) fn settle<R: Rng + ?Sized>(
    record: &mut UserRecord,
    tx: &TxContext,
    catalog: &CompiledCatalog,
    tracker: &dyn ProgressTracker,
    rng: &mut R,
) -> Result<WheelOutcome, EngineError> {
    let Some(table) = catalog.wheel.as_ref() else {
        return Err(EngineError::not_found("wheel", "rewards"));
    };
    record.balances.debit_wheel_token()?;

    let segment = table.draw_index(rng);
    let reward = table.items()[segment].clone();
    let eps = catalog.catalog.economy.energy_per_spin;
    let credited = record.credit_grant(&reward.grant, eps, tx);
    record.wheel_spins = record.wheel_spins.saturating_add(1);

    let events_completed = tracker.advance(
        &catalog.catalog.events,
        &mut record.events,
        Activity {
            kind: EventKind::WheelSpins,
            count: 1,
        },
        tx.now,
    );
    for completion in &events_completed {
        record.credit_grant(&completion.reward, eps, tx);
    }

    let level_ups = levels::apply(record, &catalog.catalog.levels, eps);

    Ok(WheelOutcome {
        reward,
        segment,
        credited,
        balances: record.balances,
        level_ups,
        events_completed,
    })
}
