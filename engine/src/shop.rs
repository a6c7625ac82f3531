use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{EngineError, lock};
use crate::types::{Balances, RewardBundle, UserId};

/// A star-priced energy bundle. Payment happens outside the engine; the
/// engine only credits once the payment issuer has confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopItem {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub stars: u64,
    pub energy: u64,
    /// Paid as wheel tokens
    #[serde(default)]
    pub bonus_spins: u64,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "enabled")]
    pub is_active: bool,
}

fn enabled() -> bool {
    true
}

impl ShopItem {
    pub fn reward(&self) -> RewardBundle {
        RewardBundle {
            energy: self.energy,
            wheel_tokens: self.bonus_spins,
            ..RewardBundle::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    pub payment_ref: String,
    pub user_id: UserId,
    pub item_slug: String,
    pub stars: u64,
    pub reward: RewardBundle,
    pub balances: Balances,
    pub confirmed_at: DateTime<Utc>,
    /// True when this confirmation was a replay of an already settled payment
    pub replayed: bool,
}

/// Settled payments by external reference
#[derive(Default)]
pub struct PaymentBook {
    receipts: Mutex<HashMap<String, PurchaseReceipt>>,
}

impl PaymentBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, EngineError> {
        Ok(lock(&self.receipts)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, EngineError> {
        Ok(self.len()? == 0)
    }

    /// Credit `item` for a confirmed payment exactly once per `payment_ref`.
    /// The book stays locked while `credit` runs, so a replay racing the
    /// first confirmation waits and then sees its receipt.
    pub fn settle(
        &self,
        payment_ref: &str,
        user_id: UserId,
        item: &ShopItem,
        stars_paid: u64,
        now: DateTime<Utc>,
        credit: impl FnOnce(&RewardBundle) -> Result<Balances, EngineError>,
    ) -> Result<PurchaseReceipt, EngineError> {
        if payment_ref.trim().is_empty() {
            return Err(EngineError::InvalidRequest(
                "payment reference is required".to_string(),
            ));
        }

        let mut receipts = lock(&self.receipts)?;
        if let Some(existing) = receipts.get(payment_ref) {
            if existing.user_id != user_id || existing.item_slug != item.slug {
                return Err(EngineError::InvalidRequest(format!(
                    "payment {payment_ref} was already settled for another purchase"
                )));
            }
            return Ok(PurchaseReceipt {
                replayed: true,
                ..existing.clone()
            });
        }

        if stars_paid < item.stars {
            return Err(EngineError::InvalidRequest(format!(
                "{} costs {} stars, payment covered {}",
                item.slug, item.stars, stars_paid
            )));
        }

        let reward = item.reward();
        let balances = credit(&reward)?;
        let receipt = PurchaseReceipt {
            payment_ref: payment_ref.to_string(),
            user_id,
            item_slug: item.slug.clone(),
            stars: stars_paid,
            reward,
            balances,
            confirmed_at: now,
            replayed: false,
        };
        receipts.insert(payment_ref.to_string(), receipt.clone());
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::Cell;

    fn item() -> ShopItem {
        ShopItem {
            slug: "energy_250".to_string(),
            name: "Abyss Diver 250".to_string(),
            description: String::new(),
            stars: 120,
            energy: 250,
            bonus_spins: 3,
            sort_order: 1,
            is_active: true,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 2, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_replay_does_not_credit_twice() {
        let book = PaymentBook::new();
        let credits = Cell::new(0);
        let credit = |reward: &RewardBundle| {
            credits.set(credits.get() + 1);
            Ok(Balances {
                energy: reward.energy,
                wheel_tokens: reward.wheel_tokens,
                ..Balances::default()
            })
        };

        let first = book.settle("inv-1", 1, &item(), 120, now(), credit).unwrap();
        assert!(!first.replayed);
        assert_eq!(first.reward.energy, 250);
        assert_eq!(first.reward.wheel_tokens, 3);

        let replay = book.settle("inv-1", 1, &item(), 120, now(), credit).unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.balances, first.balances);
        assert_eq!(credits.get(), 1);
        assert_eq!(book.len().unwrap(), 1);
    }

    #[test]
    fn test_rejects_bad_confirmations() {
        let book = PaymentBook::new();
        let ok = |_: &RewardBundle| Ok(Balances::default());

        assert!(matches!(
            book.settle("inv-2", 1, &item(), 119, now(), ok),
            Err(EngineError::InvalidRequest(_))
        ));
        assert!(matches!(
            book.settle("  ", 1, &item(), 120, now(), ok),
            Err(EngineError::InvalidRequest(_))
        ));

        book.settle("inv-2", 1, &item(), 120, now(), ok).unwrap();
        assert!(matches!(
            book.settle("inv-2", 2, &item(), 120, now(), ok),
            Err(EngineError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_failed_credit_records_nothing() {
        let book = PaymentBook::new();
        let result = book.settle("inv-3", 9, &item(), 120, now(), |_| {
            Err(EngineError::not_found("user", 9))
        });
        assert!(result.is_err());
        assert!(book.is_empty().unwrap());
    }
}
