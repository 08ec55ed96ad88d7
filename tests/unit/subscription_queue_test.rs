use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use fithub::models::{expiry_after, Placement, Promotion, Subscription, SubscriptionStep};

#[derive(Debug, Clone)]
enum Event {
    Grant(i32),
    Advance(i64),
    Refresh,
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (1..60i32).prop_map(Event::Grant),
        (0..90i64).prop_map(Event::Advance),
        Just(Event::Refresh),
    ]
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

/// In-memory stand-in for one coach's subscription rows.
struct Queue {
    rows: Vec<Subscription>,
    now: DateTime<Utc>,
}

impl Queue {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            now: epoch(),
        }
    }

    fn active_count(&self) -> usize {
        self.rows.iter().filter(|s| s.step == SubscriptionStep::Active).count()
    }

    fn grant(&mut self, count: i32) {
        let has_active = self
            .rows
            .iter()
            .any(|s| s.step == SubscriptionStep::Active && s.expired_at.is_none());
        let placement = Placement::decide(has_active, count, self.now).unwrap();
        let (active_at, expect_expired_at) = match placement {
            Placement::Queued => (None, None),
            Placement::ActiveNow {
                active_at,
                expect_expired_at,
            } => (Some(active_at), Some(expect_expired_at)),
        };
        self.rows.push(Subscription {
            id: self.rows.len() as i64 + 1,
            coach_id: 1,
            subscription_plan_id: 1,
            step: placement.step(),
            count,
            reason: "test".to_string(),
            active_at,
            expect_expired_at,
            expired_at: None,
            created_at: self.now,
        });
    }

    fn refresh(&mut self) {
        let promotion = Promotion::plan(&self.rows, self.now);
        let now = self.now;
        if let Some(id) = promotion.expire {
            let row = self.rows.iter_mut().find(|s| s.id == id).unwrap();
            row.step = SubscriptionStep::Expired;
            row.expired_at = Some(now);
        }
        if let Some(id) = promotion.activate {
            let row = self.rows.iter_mut().find(|s| s.id == id).unwrap();
            row.step = SubscriptionStep::Active;
            row.active_at = Some(now);
            row.expect_expired_at = Some(expiry_after(now, row.count).unwrap());
        }
    }
}

proptest! {
    #[test]
    fn test_never_more_than_one_active(events in prop::collection::vec(event(), 1..60)) {
        let mut queue = Queue::new();
        for event in events {
            match event {
                Event::Grant(days) => queue.grant(days),
                Event::Advance(days) => queue.now += Duration::days(days),
                Event::Refresh => queue.refresh(),
            }
            prop_assert!(queue.active_count() <= 1);
        }
    }

    #[test]
    fn test_pending_rows_activate_in_id_order(counts in prop::collection::vec(1..30i32, 2..8)) {
        let mut queue = Queue::new();
        for count in &counts {
            queue.grant(*count);
        }

        let mut activated = vec![1];
        for _ in 1..counts.len() {
            queue.now += Duration::days(31);
            queue.refresh();
            let active = queue.rows.iter().find(|s| s.step == SubscriptionStep::Active).unwrap();
            activated.push(active.id);
        }
        let expected: Vec<i64> = (1..=counts.len() as i64).collect();
        prop_assert_eq!(activated, expected);
    }
}

#[test]
fn test_refresh_waits_for_expected_expiry() {
    let mut queue = Queue::new();
    queue.grant(30);
    queue.grant(15);

    queue.now += Duration::days(29);
    queue.refresh();
    assert_eq!(queue.rows[0].step, SubscriptionStep::Active);
    assert_eq!(queue.rows[1].step, SubscriptionStep::Pending);

    queue.now += Duration::days(1);
    queue.refresh();
    assert_eq!(queue.rows[0].step, SubscriptionStep::Expired);
    assert_eq!(queue.rows[1].step, SubscriptionStep::Active);
    assert_eq!(queue.rows[1].expect_expired_at, Some(queue.now + Duration::days(15)));
}
