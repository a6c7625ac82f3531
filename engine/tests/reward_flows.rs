use chrono::{DateTime, Duration, TimeZone, Utc};
use engine::album::{Album, PackPayment, Rarity, Sticker, TradeReward};
use engine::catalog::Catalog;
use engine::events::{EventKind, LiveEvent};
use engine::links::NewLink;
use engine::{
    EngineError, ManualClock, RewardBundle, RewardEngine, RewardGrant, RewardKind, UserId,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap()
}

/// Stock content without level rewards or events, so balance arithmetic is exact
fn plain_catalog() -> Catalog {
    let mut catalog = Catalog::stock(start());
    catalog.levels.rewards = BTreeMap::new();
    catalog.events.clear();
    catalog
}

fn build(catalog: Catalog) -> (Arc<RewardEngine>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let engine = RewardEngine::builder()
        .catalog(catalog)
        .clock(clock.clone())
        .seed(2024)
        .build()
        .unwrap();
    (Arc::new(engine), clock)
}

fn player(engine: &RewardEngine, name: &str) -> UserId {
    engine.register(name, Some(name)).unwrap().user_id
}

#[test]
fn spin_debits_exact_wager_in_one_step() {
    let mut catalog = plain_catalog();
    catalog.economy.coin_cost_per_spin = 7;
    let (engine, _) = build(catalog);
    let user = player(&engine, "wager");

    for _ in 0..10 {
        let before = engine.profile(user).unwrap().balances;
        let outcome = engine.spin(user, 2).unwrap();
        assert_eq!(outcome.energy_spent, 2);
        assert_eq!(outcome.coin_cost, 14);
        assert_eq!(
            outcome.net_coins,
            outcome.rewards.coins as i64 - 14
        );
        assert_eq!(
            outcome.balances.coins,
            before.coins - 14 + outcome.rewards.coins
        );
        assert_eq!(
            outcome.balances.energy,
            before.energy - 2 + outcome.rewards.energy
        );
        assert_eq!(
            outcome.balances.wheel_tokens,
            before.wheel_tokens + outcome.rewards.wheel_tokens
        );
    }
}

#[test]
fn insufficient_balances_leave_state_untouched() {
    let mut catalog = plain_catalog();
    catalog.economy.starting.energy = 3;
    catalog.economy.starting.coins = 0;
    catalog.economy.starting.wheel_tokens = 0;
    let (engine, _) = build(catalog);
    let user = player(&engine, "broke");
    let before = engine.profile(user).unwrap();

    assert_eq!(
        engine.spin(user, 5).unwrap_err(),
        EngineError::InsufficientEnergy {
            required: 5,
            available: 3
        }
    );
    assert_eq!(engine.spin_wheel(user).unwrap_err(), EngineError::NoTokens);
    assert!(matches!(
        engine.open_pack(user, 1, PackPayment::Auto),
        Err(EngineError::InsufficientCoins { .. })
    ));
    assert_eq!(
        engine.open_pack(user, 1, PackPayment::Token).unwrap_err(),
        EngineError::NoPackTokens
    );
    assert_eq!(
        engine.trade_duplicates(user, TradeReward::Coins, 1).unwrap_err(),
        EngineError::InsufficientDuplicates {
            required: 5,
            available: 0
        }
    );

    let after = engine.profile(user).unwrap();
    assert_eq!(after.balances, before.balances);
    assert_eq!(after.lifetime_spins, 0);
    assert_eq!(after.stickers_owned, 0);
}

#[test]
fn daily_streak_follows_calendar_days() {
    let (engine, clock) = build(plain_catalog());
    let user = player(&engine, "daily");

    let first = engine.claim_daily(user).unwrap();
    assert_eq!(first.streak, 1);
    let status = engine.peek_daily(user).unwrap();
    assert!(!status.can_claim);
    assert_eq!(status.seconds_until_next, 12 * 3600);

    assert!(matches!(
        engine.claim_daily(user),
        Err(EngineError::AlreadyClaimed { .. })
    ));
    assert_eq!(engine.peek_daily(user).unwrap().streak, 1);

    // Day two, just after midnight, counts as consecutive
    clock.set(start() + Duration::hours(12) + Duration::minutes(1));
    let second = engine.claim_daily(user).unwrap();
    assert_eq!(second.streak, 2);
    assert_eq!(second.reward.coins, 215);

    // Skip to day five
    clock.advance(Duration::days(3));
    let after_gap = engine.claim_daily(user).unwrap();
    assert_eq!(after_gap.streak, 1);
    assert_eq!(after_gap.reward.coins, 200);
}

#[test]
fn seven_day_streak_pays_the_chest_then_holds() {
    let (engine, clock) = build(plain_catalog());
    let user = player(&engine, "loyal");

    let mut rewards = Vec::new();
    for _ in 0..9 {
        rewards.push(engine.claim_daily(user).unwrap());
        clock.advance(Duration::days(1));
    }
    assert_eq!(rewards[6].streak, 7);
    assert_eq!(rewards[6].reward.wheel_tokens, 1);
    assert_eq!(rewards[6].reward.sticker_packs, 1);
    assert_eq!(rewards[8].streak, 9);
    assert_eq!(rewards[8].reward, rewards[6].reward);
}

fn tiny_album_catalog() -> Catalog {
    let mut catalog = plain_catalog();
    catalog.economy.starting.coins = 1_000_000;
    catalog.albums = vec![Album {
        id: 9,
        slug: "tide-pool".to_string(),
        name: "Tide Pool".to_string(),
        description: String::new(),
        sticker_cost: 10,
        completion_reward: RewardBundle {
            coins: 0,
            energy: 40,
            wheel_tokens: 4,
            sticker_packs: 0,
        },
        stickers: vec![
            Sticker {
                id: 90,
                name: "Crab".to_string(),
                rarity: Rarity::Common,
                weight: 3.0,
            },
            Sticker {
                id: 91,
                name: "Starfish".to_string(),
                rarity: Rarity::Rare,
                weight: 1.0,
            },
            Sticker {
                id: 92,
                name: "Octopus".to_string(),
                rarity: Rarity::Legendary,
                weight: 0.5,
            },
        ],
        is_active: true,
    }];
    catalog
}

#[test]
fn album_completion_credits_exactly_once() {
    let (engine, _) = build(tiny_album_catalog());
    let user = player(&engine, "collector");
    let starting = engine.profile(user).unwrap().balances;

    let mut completions = 0;
    let mut packs = 0u64;
    while !engine.albums(user).unwrap().albums[0].completed {
        let opening = engine.open_pack(user, 9, PackPayment::Coins).unwrap();
        packs += 1;
        if opening.album_completed_now {
            completions += 1;
            assert_eq!(opening.completion_reward.map(|r| r.wheel_tokens), Some(4));
        }
        assert!(packs < 10_000, "album never completed");
    }
    for _ in 0..50 {
        let opening = engine.open_pack(user, 9, PackPayment::Coins).unwrap();
        packs += 1;
        assert!(!opening.album_completed_now);
        assert_eq!(opening.completion_reward, None);
    }

    assert_eq!(completions, 1);
    let profile = engine.profile(user).unwrap();
    assert_eq!(profile.albums_completed, 1);
    assert_eq!(profile.balances.energy, starting.energy + 40);
    assert_eq!(profile.balances.wheel_tokens, starting.wheel_tokens + 4);
    assert_eq!(profile.balances.coins, starting.coins - packs * 10);
    assert_eq!(profile.stickers_owned, packs);

    let view = engine.albums(user).unwrap();
    assert!(view.albums[0].reward_claimed);
    assert_eq!(view.duplicates, packs - 3);
}

#[test]
fn trading_duplicates_keeps_one_of_each() {
    let (engine, _) = build(tiny_album_catalog());
    let user = player(&engine, "trader");
    for _ in 0..60 {
        engine.open_pack(user, 9, PackPayment::Coins).unwrap();
    }
    let before = engine.albums(user).unwrap();
    let coins_before = engine.profile(user).unwrap().balances.coins;
    let sets = before.sets_available;
    assert!(sets >= 2);

    let outcome = engine.trade_duplicates(user, TradeReward::Coins, sets).unwrap();
    assert_eq!(outcome.stickers_consumed, sets * 5);
    assert_eq!(outcome.reward.coins, sets * 350);
    assert_eq!(outcome.balances.coins, coins_before + sets * 350);

    let after = engine.albums(user).unwrap();
    assert_eq!(after.duplicates, before.duplicates - sets * 5);
    assert_eq!(after.sets_available, 0);
    for sticker in &after.albums[0].stickers {
        let owned_before = before.albums[0]
            .stickers
            .iter()
            .find(|s| s.sticker.id == sticker.sticker.id)
            .map(|s| s.owned)
            .unwrap();
        assert_eq!(sticker.owned >= 1, owned_before >= 1);
    }

    assert!(matches!(
        engine.trade_duplicates(user, TradeReward::Energy, 0),
        Err(EngineError::InvalidRequest(_))
    ));
}

#[test]
fn single_use_link_has_one_winner_under_contention() {
    let (engine, _) = build(plain_catalog());
    let users: Vec<UserId> = (0..32).map(|i| player(&engine, &format!("u{i}"))).collect();
    let link = engine
        .create_link(NewLink {
            grant: RewardGrant::new(RewardKind::Coins, 777),
            uses: 1,
            title: "First come".to_string(),
            note: None,
            created_by: Some("ops".to_string()),
        })
        .unwrap();

    let handles: Vec<_> = users
        .iter()
        .map(|&user| {
            let engine = Arc::clone(&engine);
            let token = link.token.clone();
            thread::spawn(move || (user, engine.redeem(user, &token)))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<UserId> = results
        .iter()
        .filter(|(_, r)| r.is_ok())
        .map(|(user, _)| *user)
        .collect();
    assert_eq!(winners.len(), 1);
    for (_, result) in &results {
        if let Err(e) = result {
            assert_eq!(*e, EngineError::Exhausted);
        }
    }

    let paid: u64 = users
        .iter()
        .map(|&user| engine.profile(user).unwrap().balances.coins - 100)
        .sum();
    assert_eq!(paid, 777);

    // The winner asking again is told it already redeemed, not that it ran out
    assert_eq!(
        engine.redeem(winners[0], &link.token).unwrap_err(),
        EngineError::AlreadyRedeemed {
            user_id: winners[0]
        }
    );
}

#[test]
fn leaderboard_reset_only_clears_the_week() {
    let (engine, _) = build(plain_catalog());
    let users: Vec<UserId> = (0..5).map(|i| player(&engine, &format!("s{i}"))).collect();
    for &user in &users {
        for _ in 0..10 {
            engine.spin(user, 1).unwrap();
        }
    }

    let board = engine.top_n(None).unwrap();
    for pair in board.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    let lifetime: Vec<u64> = users
        .iter()
        .map(|&u| engine.profile(u).unwrap().lifetime_coins)
        .collect();

    engine.reset_leaderboard();
    assert!(engine.top_n(None).unwrap().is_empty());
    for (&user, &coins) in users.iter().zip(&lifetime) {
        let profile = engine.profile(user).unwrap();
        assert_eq!(profile.weekly_score, 0);
        assert_eq!(profile.lifetime_coins, coins);
    }

    // Only post-reset activity counts
    let mut earned = 0;
    while earned == 0 {
        earned = engine.spin(users[3], 1).unwrap().rewards.coins;
    }
    let board = engine.top_n(None).unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].user_id, users[3]);
    assert_eq!(board[0].score, earned);
    assert_eq!(engine.standing(users[3]).unwrap().rank, Some(1));
}

#[test]
fn concurrent_spins_on_one_user_lose_nothing() {
    let mut catalog = plain_catalog();
    catalog.economy.starting.energy = 10_000;
    catalog.economy.max_tx_attempts = 10_000;
    let (engine, _) = build(catalog);
    let user = player(&engine, "double-tap");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut energy_won = 0u64;
                for _ in 0..100 {
                    energy_won += engine.spin(user, 1).unwrap().rewards.energy;
                }
                energy_won
            })
        })
        .collect();
    let energy_won: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    let profile = engine.profile(user).unwrap();
    assert_eq!(profile.lifetime_spins, 800);
    assert_eq!(profile.balances.energy, 10_000 - 800 + energy_won);
}

#[test]
fn live_event_completes_once_and_scores_coin_rewards() {
    let mut catalog = plain_catalog();
    catalog.events = vec![LiveEvent {
        id: 4,
        slug: "sprint".to_string(),
        name: "Sprint".to_string(),
        description: String::new(),
        start_at: start() - Duration::hours(1),
        end_at: start() + Duration::hours(1),
        target: 6,
        kind: EventKind::Spins,
        reward: RewardGrant::new(RewardKind::Coins, 1_000),
        is_active: true,
    }];
    let (engine, clock) = build(catalog);
    let user = player(&engine, "racer");

    assert!(engine.spin(user, 5).unwrap().events_completed.is_empty());
    let done = engine.spin(user, 1).unwrap();
    assert_eq!(done.events_completed.len(), 1);
    assert_eq!(done.events_completed[0].slug, "sprint");
    assert!(engine.spin(user, 1).unwrap().events_completed.is_empty());

    let profile = engine.profile(user).unwrap();
    assert!(profile.weekly_score >= 1_000);
    let events = engine.events(user).unwrap();
    assert_eq!(events[0].progress, 7);
    assert!(events[0].claimed);

    // Spins after the window closes are not counted
    clock.advance(Duration::hours(2));
    engine.spin(user, 1).unwrap();
    assert_eq!(engine.events(user).unwrap()[0].progress, 7);
}

#[test]
fn level_rewards_are_paid_once_per_level() {
    let mut catalog = Catalog::stock(start());
    catalog.events.clear();
    catalog.wheel = vec![engine::wheel::WheelReward {
        id: 1,
        label: "Whale".to_string(),
        grant: RewardGrant::new(RewardKind::Coins, 500),
        weight: 1.0,
        is_active: true,
    }];
    let (engine, _) = build(catalog);
    let user = player(&engine, "climber");

    // 500 XP crosses levels 2 to 4
    let outcome = engine.spin_wheel(user).unwrap();
    let levels: Vec<u32> = outcome.level_ups.iter().map(|up| up.level).collect();
    assert_eq!(levels, vec![2, 3, 4]);

    let profile = engine.profile(user).unwrap();
    assert_eq!(profile.level.level, 4);
    assert_eq!(profile.balances.coins, 100 + 500 + 400);
    assert_eq!(profile.balances.energy, 30 + 30);
    // Token spent, two back from level 4
    assert_eq!(profile.balances.wheel_tokens, 2);
    // Level coins are not earnings
    assert_eq!(profile.weekly_score, 500);
    assert_eq!(profile.level.xp, 500);
}

#[test]
fn catalog_hot_reload_applies_to_the_next_operation() {
    let (engine, _) = build(plain_catalog());
    let user = player(&engine, "reload");

    assert!(matches!(
        engine.spin(user, 7),
        Err(EngineError::InvalidWager { .. })
    ));

    let mut catalog = plain_catalog();
    catalog.economy.allowed_multipliers = vec![7];
    engine.replace_catalog(catalog).unwrap();
    assert_eq!(engine.spin(user, 7).unwrap().energy_spent, 7);
    assert!(matches!(
        engine.spin(user, 1),
        Err(EngineError::InvalidWager { .. })
    ));
}
