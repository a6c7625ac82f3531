use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{EventId, RewardGrant};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Progress counts slot spins, weighted by wager multiplier
    Spins,
    WheelSpins,
}

/// Operator-defined time-boxed challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    pub id: EventId,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub target: u64,
    pub kind: EventKind,
    pub reward: RewardGrant,
    #[serde(default = "enabled")]
    pub is_active: bool,
}

fn enabled() -> bool {
    true
}

impl LiveEvent {
    pub fn status(&self, now: DateTime<Utc>) -> EventStatus {
        if now < self.start_at {
            EventStatus::Upcoming
        } else if now <= self.end_at {
            EventStatus::Live
        } else {
            EventStatus::Ended
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Upcoming,
    Live,
    Ended,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventProgress {
    pub progress: u64,
    pub claimed: bool,
}

/// Something a player did that events may count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activity {
    pub kind: EventKind,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventCompletion {
    pub event_id: EventId,
    pub slug: String,
    pub name: String,
    pub reward: RewardGrant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: LiveEvent,
    pub status: EventStatus,
    pub progress: u64,
    pub claimed: bool,
}

/// Advances per-user event progress. Completions returned here are credited
/// by the caller inside the same ledger transaction.
pub trait ProgressTracker: Send + Sync {
    fn advance(
        &self,
        events: &[LiveEvent],
        progress: &mut BTreeMap<EventId, EventProgress>,
        activity: Activity,
        now: DateTime<Utc>,
    ) -> Vec<EventCompletion>;
}

/// Counts activity toward every active, live event of the matching kind and
/// completes each one at most once.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveEventTracker;

impl ProgressTracker for LiveEventTracker {
    fn advance(
        &self,
        events: &[LiveEvent],
        progress: &mut BTreeMap<EventId, EventProgress>,
        activity: Activity,
        now: DateTime<Utc>,
    ) -> Vec<EventCompletion> {
        let mut completions = Vec::new();

        for event in events {
            if !event.is_active
                || event.kind != activity.kind
                || event.status(now) != EventStatus::Live
            {
                continue;
            }

            let entry = progress.entry(event.id).or_default();
            entry.progress = entry.progress.saturating_add(activity.count);

            if entry.progress >= event.target && !entry.claimed {
                entry.claimed = true;
                completions.push(EventCompletion {
                    event_id: event.id,
                    slug: event.slug.clone(),
                    name: event.name.clone(),
                    reward: event.reward,
                });
            }
        }

        completions
    }
}

pub fn overview(
    events: &[LiveEvent],
    progress: &BTreeMap<EventId, EventProgress>,
    now: DateTime<Utc>,
) -> Vec<EventView> {
    let mut views: Vec<EventView> = events
        .iter()
        .filter(|event| event.is_active)
        .map(|event| {
            let entry = progress.get(&event.id).copied().unwrap_or_default();
            EventView {
                event: event.clone(),
                status: event.status(now),
                progress: entry.progress,
                claimed: entry.claimed,
            }
        })
        .collect();
    views.sort_by_key(|view| view.event.start_at);
    views
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RewardKind;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
    }

    fn event(id: EventId, kind: EventKind, target: u64) -> LiveEvent {
        LiveEvent {
            id,
            slug: format!("event-{id}"),
            name: format!("Event {id}"),
            description: String::new(),
            start_at: now() - Duration::days(1),
            end_at: now() + Duration::days(1),
            target,
            kind,
            reward: RewardGrant::new(RewardKind::Spins, 5),
            is_active: true,
        }
    }

    #[test]
    fn test_completes_once() {
        let events = vec![event(1, EventKind::Spins, 10)];
        let mut progress = BTreeMap::new();
        let tracker = LiveEventTracker;
        let spins = Activity {
            kind: EventKind::Spins,
            count: 6,
        };

        assert!(tracker.advance(&events, &mut progress, spins, now()).is_empty());
        let done = tracker.advance(&events, &mut progress, spins, now());
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].slug, "event-1");
        assert!(tracker.advance(&events, &mut progress, spins, now()).is_empty());
        assert_eq!(progress[&1].progress, 18);
        assert!(progress[&1].claimed);
    }

    #[test]
    fn test_ignores_other_kinds_and_closed_windows() {
        let mut ended = event(2, EventKind::Spins, 1);
        ended.end_at = now() - Duration::hours(1);
        let mut disabled = event(3, EventKind::Spins, 1);
        disabled.is_active = false;
        let events = vec![event(1, EventKind::WheelSpins, 1), ended, disabled];
        let mut progress = BTreeMap::new();

        let done = LiveEventTracker.advance(
            &events,
            &mut progress,
            Activity {
                kind: EventKind::Spins,
                count: 3,
            },
            now(),
        );
        assert!(done.is_empty());
        assert!(progress.is_empty());
    }

    #[test]
    fn test_status_and_overview() {
        let mut upcoming = event(2, EventKind::Spins, 1);
        upcoming.start_at = now() + Duration::days(2);
        upcoming.end_at = now() + Duration::days(3);
        let events = vec![upcoming, event(1, EventKind::Spins, 4)];
        let mut progress = BTreeMap::new();
        progress.insert(
            1,
            EventProgress {
                progress: 2,
                claimed: false,
            },
        );

        let views = overview(&events, &progress, now());
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].event.id, 1);
        assert_eq!(views[0].status, EventStatus::Live);
        assert_eq!(views[0].progress, 2);
        assert_eq!(views[1].status, EventStatus::Upcoming);
        assert_eq!(views[1].progress, 0);
    }
}
