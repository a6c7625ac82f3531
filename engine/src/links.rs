use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{EngineError, lock, read, write};
use crate::types::{Balances, RewardBundle, RewardGrant, UserId};

pub const TOKEN_LENGTH: usize = 32;

/// Shareable capped-use reward token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardLink {
    pub token: String,
    pub title: String,
    pub note: Option<String>,
    #[serde(flatten)]
    pub grant: RewardGrant,
    pub max_uses: u32,
    pub remaining_uses: u32,
    pub redeemed_by: BTreeSet<UserId>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Operator request for a new link
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewLink {
    #[serde(flatten)]
    pub grant: RewardGrant,
    #[serde(default = "single_use")]
    pub uses: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

fn single_use() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRedemption {
    pub token: String,
    pub title: String,
    pub grant: RewardGrant,
    pub reward: RewardBundle,
    pub remaining_uses: u32,
    pub balances: Balances,
}

/// Reward links keyed by token. Each link has its own lock, held across the
/// redeeming user's ledger transaction, so racing redemptions of one link
/// are serialized while different links proceed in parallel.
#[derive(Default)]
pub struct LinkStore {
    links: RwLock<HashMap<String, Arc<Mutex<RewardLink>>>>,
}

impl LinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create<R: Rng + ?Sized>(
        &self,
        request: NewLink,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<RewardLink, EngineError> {
        if request.uses == 0 {
            return Err(EngineError::InvalidRequest(
                "a reward link needs at least one use".to_string(),
            ));
        }
        if request.grant.amount == 0 {
            return Err(EngineError::InvalidRequest(
                "a reward link must grant a positive amount".to_string(),
            ));
        }

        let mut links = write(&self.links)?;
        let token = loop {
            let candidate: String = (0..TOKEN_LENGTH)
                .map(|_| char::from(rng.sample(Alphanumeric)))
                .collect();
            if !links.contains_key(&candidate) {
                break candidate;
            }
        };

        let title = if request.title.trim().is_empty() {
            format!("{} {}", request.grant.amount, request.grant.kind.as_str())
        } else {
            request.title
        };
        let link = RewardLink {
            token: token.clone(),
            title,
            note: request.note,
            grant: request.grant,
            max_uses: request.uses,
            remaining_uses: request.uses,
            redeemed_by: BTreeSet::new(),
            created_by: request.created_by,
            created_at: now,
            is_active: true,
        };
        links.insert(token, Arc::new(Mutex::new(link.clone())));
        Ok(link)
    }

    fn entry(&self, token: &str) -> Result<Arc<Mutex<RewardLink>>, EngineError> {
        read(&self.links)?
            .get(token)
            .cloned()
            .ok_or(EngineError::InvalidToken)
    }

    pub fn get(&self, token: &str) -> Result<RewardLink, EngineError> {
        let entry = self.entry(token)?;
        let link = lock(&entry)?;
        Ok(link.clone())
    }

    pub fn list(&self) -> Result<Vec<RewardLink>, EngineError> {
        let entries: Vec<_> = read(&self.links)?.values().cloned().collect();
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            out.push(lock(&entry)?.clone());
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    /// Soft-delete; later redemptions fail with `Exhausted`
    pub fn disable(&self, token: &str) -> Result<RewardLink, EngineError> {
        let entry = self.entry(token)?;
        let mut link = lock(&entry)?;
        link.is_active = false;
        Ok(link.clone())
    }

    /// Check the link, run `credit` and only then consume a use for `user_id`.
    /// If `credit` fails the link is untouched.
    pub fn redeem<T>(
        &self,
        token: &str,
        user_id: UserId,
        credit: impl FnOnce(&RewardLink) -> Result<T, EngineError>,
    ) -> Result<(T, RewardLink), EngineError> {
        let entry = self.entry(token)?;
        let mut link = lock(&entry)?;

        if link.redeemed_by.contains(&user_id) {
            return Err(EngineError::AlreadyRedeemed { user_id });
        }
        if !link.is_active || link.remaining_uses == 0 {
            return Err(EngineError::Exhausted);
        }

        let outcome = credit(&link)?;

        link.remaining_uses -= 1;
        link.redeemed_by.insert(user_id);
        Ok((outcome, link.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RewardKind;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn request(uses: u32) -> NewLink {
        NewLink {
            grant: RewardGrant::new(RewardKind::Coins, 500),
            uses,
            title: String::new(),
            note: None,
            created_by: Some("ops".to_string()),
        }
    }

    #[test]
    fn test_create_mints_unique_tokens() {
        let store = LinkStore::new();
        let mut rng = StdRng::seed_from_u64(7);
        let first = store.create(request(2), now(), &mut rng).unwrap();
        let second = store.create(request(2), now(), &mut rng).unwrap();
        assert_eq!(first.token.len(), TOKEN_LENGTH);
        assert!(first.token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(first.token, second.token);
        assert_eq!(first.title, "500 coins");
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_create_rejects_zero_uses() {
        let store = LinkStore::new();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(matches!(
            store.create(request(0), now(), &mut rng),
            Err(EngineError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_redeem_rules() {
        let store = LinkStore::new();
        let mut rng = StdRng::seed_from_u64(1);
        let link = store.create(request(2), now(), &mut rng).unwrap();

        assert_eq!(
            store.redeem("nope", 1, |_| Ok(())).unwrap_err(),
            EngineError::InvalidToken
        );

        let ((), after) = store.redeem(&link.token, 1, |_| Ok(())).unwrap();
        assert_eq!(after.remaining_uses, 1);

        // Same user again, even with uses left
        assert_eq!(
            store.redeem(&link.token, 1, |_| Ok(())).unwrap_err(),
            EngineError::AlreadyRedeemed { user_id: 1 }
        );

        store.redeem(&link.token, 2, |_| Ok(())).unwrap();
        assert_eq!(
            store.redeem(&link.token, 3, |_| Ok(())).unwrap_err(),
            EngineError::Exhausted
        );
        // Still AlreadyRedeemed for a past redeemer once exhausted
        assert_eq!(
            store.redeem(&link.token, 2, |_| Ok(())).unwrap_err(),
            EngineError::AlreadyRedeemed { user_id: 2 }
        );
    }

    #[test]
    fn test_failed_credit_consumes_nothing() {
        let store = LinkStore::new();
        let mut rng = StdRng::seed_from_u64(1);
        let link = store.create(request(1), now(), &mut rng).unwrap();

        let failed: Result<((), RewardLink), _> = store.redeem(&link.token, 1, |_| {
            Err(EngineError::not_found("user", 1))
        });
        assert!(failed.is_err());
        let current = store.get(&link.token).unwrap();
        assert_eq!(current.remaining_uses, 1);
        assert!(current.redeemed_by.is_empty());
    }

    #[test]
    fn test_disabled_link_is_exhausted() {
        let store = LinkStore::new();
        let mut rng = StdRng::seed_from_u64(1);
        let link = store.create(request(5), now(), &mut rng).unwrap();
        store.disable(&link.token).unwrap();
        assert_eq!(
            store.redeem(&link.token, 1, |_| Ok(())).unwrap_err(),
            EngineError::Exhausted
        );
    }

    #[test]
    fn test_last_use_goes_to_exactly_one_racer() {
        let store = Arc::new(LinkStore::new());
        let mut rng = StdRng::seed_from_u64(3);
        let token = store.create(request(1), now(), &mut rng).unwrap().token;
        let credited = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (1..=16u64)
            .map(|user_id| {
                let store = Arc::clone(&store);
                let token = token.clone();
                let credited = Arc::clone(&credited);
                thread::spawn(move || {
                    store.redeem(&token, user_id, |_| {
                        credited.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| *e == EngineError::Exhausted)
        );
        assert_eq!(credited.load(Ordering::SeqCst), 1);
    }
}
