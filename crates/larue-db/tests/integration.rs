//! Integration tests for the `larue-db` SQLite adapter.
//!
//! Every test runs the real services of `larue-core` against a migrated
//! SQLite database: a private in-memory one by default, or a file in a
//! temp dir shared by several connections when writers must contend.

// Integration tests use unwrap/panic extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::items_after_statements,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use larue_core::config::LarueConfig;
use larue_core::context::GameContext;
use larue_core::economy::StartOutcome;
use larue_core::error::CoreError;
use larue_core::respect::RespectOutcome;
use larue_core::scheduler::{PublishError, Published, Publisher};
use larue_core::scratch::ScratchOutcome;
use larue_core::shop::PurchaseOutcome;
use larue_core::store::{GameStore, StoreError};
use larue_core::time::{ManualTime, TimeSource};
use larue_db::{RetryPolicy, SqliteConfig, SqlitePool, SqliteStore};
use larue_ledger::IdempotencyKey;
use larue_types::{BroadcastRecord, CredRow, EventStatus, QuotaDenial, ScheduledEvent, UserId};
use tempfile::TempDir;

/// 2026-10-17 12:00 in Paris, four hours after the daily reset.
const START_SECS: i64 = 1_792_231_200;

const DAY: i64 = 86_400;

// =============================================================================
// Helpers
// =============================================================================

/// Records every event it is asked to post.
#[derive(Default)]
struct RecordingPublisher {
    posted: Mutex<Vec<String>>,
}

impl RecordingPublisher {
    fn posted(&self) -> Vec<String> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, event: &ScheduledEvent) -> Result<Published, PublishError> {
        self.posted.lock().unwrap().push(event.id.clone());
        Ok(Published {
            destination: "feed".to_owned(),
            message_id: format!("msg-{}", event.id),
            jump_url: format!("https://chat.example/feed/{}", event.id),
        })
    }
}

/// Collects formatted log output.
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct Harness {
    ctx: GameContext,
    pool: SqlitePool,
    store: Arc<SqliteStore>,
    time: Arc<ManualTime>,
    publisher: Arc<RecordingPublisher>,
}

impl Harness {
    fn time_now(&self) -> DateTime<Utc> {
        self.time.now()
    }
}

async fn harness(pool: SqlitePool) -> Harness {
    pool.run_migrations()
        .await
        .expect("Failed to run migrations");

    let store = Arc::new(pool.store());
    let time = Arc::new(ManualTime::new(
        DateTime::from_timestamp(START_SECS, 0).unwrap(),
    ));
    let publisher = Arc::new(RecordingPublisher::default());
    let shared_store: Arc<dyn GameStore> = store.clone();
    let shared_time: Arc<dyn TimeSource> = time.clone();
    let shared_publisher: Arc<dyn Publisher> = publisher.clone();
    let ctx = GameContext::new(
        shared_store,
        shared_time,
        shared_publisher,
        &LarueConfig::default(),
    )
    .unwrap();

    Harness {
        ctx,
        pool,
        store,
        time,
        publisher,
    }
}

async fn setup() -> Harness {
    let pool = SqlitePool::in_memory()
        .await
        .expect("Failed to open in-memory SQLite");
    harness(pool).await
}

/// A WAL file database in `dir` with eight pooled connections.
async fn setup_file(dir: &TempDir, tune: impl FnOnce(SqliteConfig) -> SqliteConfig) -> Harness {
    let url = format!("sqlite://{}", dir.path().join("larue.db").display());
    let config = tune(SqliteConfig::new(&url).with_max_connections(8));
    let pool = SqlitePool::connect(&config)
        .await
        .expect("Failed to open file SQLite");
    harness(pool).await
}

fn key(raw: &str) -> IdempotencyKey {
    IdempotencyKey::parse(raw).unwrap()
}

fn event(id: &str, starts_at: DateTime<Utc>) -> ScheduledEvent {
    ScheduledEvent {
        id: id.to_owned(),
        kind: "street_market".to_owned(),
        title: "Street market".to_owned(),
        starts_at,
        ends_at: None,
        payload: serde_json::json!({ "desc": "Stalls open on the corner." }),
        status: EventStatus::Scheduled,
        jump_url: String::new(),
    }
}

// =============================================================================
// Ledger
// =============================================================================

#[tokio::test]
async fn retried_credit_is_applied_once() {
    let h = setup().await;
    let user = UserId::new(1);
    let gift = key("start:gift");

    let first = h.ctx.economy.credit_once(user, 100, "start-gift", &gift).await.unwrap();
    let second = h.ctx.economy.credit_once(user, 100, "start-gift", &gift).await.unwrap();

    assert_eq!(first, 100);
    assert_eq!(second, 100);
    assert_eq!(h.ctx.economy.balance(user).await.unwrap(), 100);
    assert_eq!(h.ctx.economy.history(user, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn ledger_does_not_check_funds() {
    let h = setup().await;
    let user = UserId::new(2);
    h.ctx.economy.credit_once(user, 30, "seed", &key("seed:1")).await.unwrap();

    // Funds are the caller's check: a debit past zero still lands.
    let balance = h.ctx.economy.debit_once(user, 50, "shop:x", &key("shop:123:x")).await.unwrap();
    assert_eq!(balance, -20);
}

#[tokio::test]
async fn balance_is_order_independent_and_mirrored() {
    let h = setup().await;
    let (a, b) = (UserId::new(10), UserId::new(11));
    let deltas = [(a, 40, "k1"), (a, -15, "k2"), (a, 25, "k3")];

    for (user, delta, k) in deltas {
        h.ctx.economy.apply_once(user, delta, "test", &key(k)).await.unwrap();
    }
    for (_, delta, k) in deltas.iter().rev() {
        h.ctx.economy.apply_once(b, *delta, "test", &key(k)).await.unwrap();
    }

    assert_eq!(h.ctx.economy.balance(a).await.unwrap(), 50);
    assert_eq!(h.ctx.economy.balance(b).await.unwrap(), 50);
    let mirror = h.ctx.economy.player(a).await.unwrap().unwrap();
    assert_eq!(mirror.legacy_money, 50);
    assert!(!mirror.has_started);
}

#[tokio::test]
async fn concurrent_duplicates_apply_once() {
    let h = setup().await;
    let user = UserId::new(3);
    let k = key("evt-77:beg:gain");

    let attempts = (0..8).map(|_| {
        let economy = h.ctx.economy.clone();
        let k = k.clone();
        tokio::spawn(async move { economy.apply_once(user, 25, "hustle.beg", &k).await })
    });
    let mut applied = 0;
    for attempt in attempts.collect::<Vec<_>>() {
        let result = attempt.await.unwrap().unwrap();
        assert_eq!(result.balance, 25);
        if result.applied {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(h.ctx.economy.balance(user).await.unwrap(), 25);
}

#[tokio::test]
async fn leaderboard_breaks_ties_by_user_id() {
    let h = setup().await;
    for (id, amount) in [(5, 300), (4, 300), (9, 50), (2, 700)] {
        h.ctx
            .economy
            .credit_once(UserId::new(id), amount, "seed", &key("seed"))
            .await
            .unwrap();
    }

    let top = h.ctx.economy.top_richest(3).await.unwrap();
    let order: Vec<u64> = top.iter().map(|row| row.user_id.into_inner()).collect();
    assert_eq!(order, vec![2, 4, 5]);
    assert_eq!(h.ctx.economy.count_players().await.unwrap(), 4);
}

#[tokio::test]
async fn history_is_newest_first() {
    let h = setup().await;
    let user = UserId::new(6);
    h.ctx.economy.credit_once(user, 10, "first", &key("h1")).await.unwrap();
    h.time.advance(60);
    h.ctx.economy.credit_once(user, 20, "second", &key("h2")).await.unwrap();

    let history = h.ctx.economy.history(user, 10).await.unwrap();
    assert_eq!(history[0].reason, "second");
    assert_eq!(history[1].reason, "first");
}

#[tokio::test]
async fn start_gift_is_paid_once() {
    let h = setup().await;
    let user = UserId::new(8);

    let first = h.ctx.economy.start_player(user).await.unwrap();
    let again = h.ctx.economy.start_player(user).await.unwrap();

    assert_eq!(first, StartOutcome::Started { gift: 100, balance: 100 });
    assert_eq!(again, StartOutcome::AlreadyStarted { balance: 100 });
    assert!(h.ctx.economy.has_started(user).await.unwrap());
}

// =============================================================================
// Quota
// =============================================================================

#[tokio::test]
async fn daily_cap_admits_exactly_n_per_day() {
    let h = setup().await;
    let user = UserId::new(20);

    for call in 1..=10_u32 {
        let decision = h.ctx.quota.check_and_consume(user, "beg", 900, 10).await.unwrap();
        assert!(decision.admitted, "call {call} should be admitted");
        assert_eq!(decision.remaining_today, 10 - call);
        h.time.advance(900);
    }

    let denied = h.ctx.quota.check_and_consume(user, "beg", 900, 10).await.unwrap();
    assert!(!denied.admitted);
    assert_eq!(denied.remaining_today, 0);
    assert_eq!(denied.wait_seconds, 0);
    assert_eq!(denied.denial, Some(QuotaDenial::DailyCapReached));

    h.time.advance(DAY);
    let next_day = h.ctx.quota.check_and_consume(user, "beg", 900, 10).await.unwrap();
    assert!(next_day.admitted);
    assert_eq!(next_day.remaining_today, 9);
}

#[tokio::test]
async fn cooldown_boundary_is_inclusive() {
    let h = setup().await;
    let user = UserId::new(21);

    assert!(h.ctx.quota.check_and_consume(user, "scavenge", 60, 100).await.unwrap().admitted);

    h.time.advance(59);
    let early = h.ctx.quota.check_and_consume(user, "scavenge", 60, 100).await.unwrap();
    assert!(!early.admitted);
    assert_eq!(early.wait_seconds, 1);
    assert_eq!(early.denial, Some(QuotaDenial::CoolingDown));

    h.time.advance(1);
    assert!(h.ctx.quota.check_and_consume(user, "scavenge", 60, 100).await.unwrap().admitted);

    let state = h.ctx.quota.peek_state(user, "scavenge").await.unwrap();
    assert_eq!(state.count_today, 2);
}

#[tokio::test]
async fn quota_reset_clears_one_user() {
    let h = setup().await;
    let (a, b) = (UserId::new(22), UserId::new(23));
    h.ctx.quota.check(a, "beg").await.unwrap();
    h.ctx.quota.check(b, "beg").await.unwrap();

    assert_eq!(h.ctx.quota.reset(Some(a)).await.unwrap(), 1);
    assert_eq!(h.ctx.quota.peek_state(a, "beg").await.unwrap().count_today, 0);
    assert_eq!(h.ctx.quota.peek_state(b, "beg").await.unwrap().count_today, 1);
}

// =============================================================================
// Recycler
// =============================================================================

#[tokio::test]
async fn first_claim_is_free() {
    let h = setup().await;
    let user = UserId::new(30);
    h.ctx.recycler.add_raw_units(user, 100).await.unwrap();

    let (outcome, state) = h.ctx.recycler.pack(user, None).await.unwrap();
    assert_eq!(outcome.packages_made, 2);
    assert_eq!(outcome.raw_consumed, 100);
    assert_eq!(state.packaged_units, 2);
    assert_eq!(state.raw_units, 0);

    let receipt = h.ctx.recycler.claim(user, 1, "claim-1").await.unwrap();
    assert_eq!(receipt.days_claimed(), 1);
    assert_eq!(receipt.total_payout, 120);
    assert!(receipt.credit.unwrap().applied);
    assert_eq!(h.ctx.economy.balance(user).await.unwrap(), 120);
    assert_eq!(h.ctx.recycler.claim_log(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn streak_builds_then_breaks() {
    let h = setup().await;
    let user = UserId::new(31);
    h.ctx.recycler.add_raw_units(user, 150).await.unwrap();
    h.ctx.recycler.pack(user, None).await.unwrap();

    let day1 = h.ctx.recycler.claim(user, 1, "c1").await.unwrap();
    assert_eq!(day1.total_payout, 120);
    assert_eq!(day1.state.streak_days, 1);

    h.time.advance(DAY);
    let day2 = h.ctx.recycler.claim(user, 1, "c2").await.unwrap();
    assert_eq!(day2.total_payout, 130);
    assert_eq!(day2.state.streak_days, 2);

    h.time.advance(3 * DAY);
    let day5 = h.ctx.recycler.claim(user, 1, "c5").await.unwrap();
    assert_eq!(day5.total_payout, 120);
    assert_eq!(day5.state.streak_days, 1);
    assert_eq!(h.ctx.economy.balance(user).await.unwrap(), 370);
}

#[tokio::test]
async fn backlog_is_capped_and_pays_oldest_days() {
    let h = setup().await;
    let user = UserId::new(32);
    h.ctx.recycler.add_raw_units(user, 300).await.unwrap();
    h.ctx.recycler.pack(user, None).await.unwrap();
    h.ctx.recycler.claim(user, 1, "first").await.unwrap();
    let claimed_on = h.ctx.clock.logical_day(h.time_now());

    h.time.advance(8 * DAY);
    assert_eq!(h.ctx.recycler.pending_days(user).await.unwrap(), 3);

    let receipt = h.ctx.recycler.claim(user, 10, "backlog").await.unwrap();
    let days: Vec<_> = receipt.days.iter().map(|paid| paid.day).collect();
    assert_eq!(
        days,
        vec![
            claimed_on + Duration::days(1),
            claimed_on + Duration::days(2),
            claimed_on + Duration::days(3),
        ]
    );
    assert_eq!(receipt.total_payout, 120 + 130 + 139);
    assert_eq!(receipt.state.packaged_units, 2);

    // Replaying the same claim finds nothing left to pay.
    let replay = h.ctx.recycler.claim(user, 10, "backlog").await.unwrap();
    assert_eq!(replay.days_claimed(), 0);
    assert_eq!(h.ctx.economy.balance(user).await.unwrap(), 120 + 389);
    assert_eq!(h.ctx.recycler.claim_log(user).await.unwrap().len(), 4);
}

#[tokio::test]
async fn claim_without_packages_is_a_no_op() {
    let h = setup().await;
    let user = UserId::new(33);

    let receipt = h.ctx.recycler.claim(user, 1, "empty").await.unwrap();
    assert_eq!(receipt.days_claimed(), 0);
    assert!(receipt.credit.is_none());

    let status = h.ctx.recycler.status(user).await.unwrap();
    assert_eq!(status.state.packaged_units, 0);
    assert_eq!(status.pending_days, 1);
}

#[tokio::test]
async fn recycler_reset_keeps_claim_log() {
    let h = setup().await;
    let user = UserId::new(34);
    h.ctx.recycler.add_raw_units(user, 50).await.unwrap();
    h.ctx.recycler.pack(user, None).await.unwrap();
    h.ctx.recycler.claim(user, 1, "once").await.unwrap();

    assert_eq!(h.ctx.recycler.reset(Some(user)).await.unwrap(), 1);
    assert_eq!(h.ctx.recycler.get_state(user).await.unwrap().streak_days, 0);
    assert_eq!(h.ctx.recycler.claim_log(user).await.unwrap().len(), 1);
}

// =============================================================================
// Shop, hustle and scratch
// =============================================================================

#[tokio::test]
async fn purchase_checks_unlocks_and_caps() {
    let h = setup().await;
    let user = UserId::new(40);
    h.ctx.economy.start_player(user).await.unwrap();
    h.ctx.economy.credit_once(user, 200, "seed", &key("seed")).await.unwrap();

    let locked = h.ctx.shop.buy(user, "cup", "buy-1").await.unwrap();
    let PurchaseOutcome::Locked { missing } = locked else {
        panic!("expected locked, got {locked:?}");
    };
    assert_eq!(missing.get("beg_count"), Some(&5));

    h.store.increment_stat(user, "beg_count", 5).await.unwrap();
    let bought = h.ctx.shop.buy(user, "cup", "buy-2").await.unwrap();
    assert_eq!(bought, PurchaseOutcome::Bought { quantity: 1, balance: 150 });

    let again = h.ctx.shop.buy(user, "cup", "buy-2").await.unwrap();
    assert_eq!(again, PurchaseOutcome::AlreadyOwned { quantity: 1 });
    assert_eq!(h.ctx.economy.balance(user).await.unwrap(), 150);
    assert_eq!(h.store.inventory(user).await.unwrap().get("cup"), Some(&1));
}

#[tokio::test]
async fn purchase_without_funds_changes_nothing() {
    let h = setup().await;
    let user = UserId::new(41);
    h.ctx.economy.start_player(user).await.unwrap();
    h.store.increment_stat(user, "beg_count", 20).await.unwrap();

    let outcome = h.ctx.shop.buy(user, "sign", "buy-sign").await.unwrap();
    assert_eq!(outcome, PurchaseOutcome::InsufficientFunds { needed: 500 });
    assert!(h.store.inventory(user).await.unwrap().is_empty());
    assert_eq!(h.ctx.economy.balance(user).await.unwrap(), 100);
}

#[tokio::test]
async fn beg_credits_and_counts() {
    let h = setup().await;
    let user = UserId::new(42);
    h.ctx.economy.start_player(user).await.unwrap();

    h.ctx.hustle.beg(user, "beg-evt").await.unwrap();
    let balance = h.ctx.economy.balance(user).await.unwrap();
    assert!(balance > 100);
    assert_eq!(h.store.stats(user).await.unwrap().get("beg_count"), Some(&1));

    // A retry of the same interaction is throttled and pays nothing more.
    h.ctx.hustle.beg(user, "beg-evt").await.unwrap();
    assert_eq!(h.ctx.economy.balance(user).await.unwrap(), balance);
}

#[tokio::test]
async fn scratch_retry_replays_the_same_ticket() {
    let h = setup().await;
    let user = UserId::new(43);
    h.ctx.economy.start_player(user).await.unwrap();

    let first = h.ctx.scratch.play(user, "micro", "scratch-1").await.unwrap();
    let ScratchOutcome::Played { price, prize, balance } = first else {
        panic!("expected a played ticket, got {first:?}");
    };
    assert_eq!(price, 50);
    assert_eq!(balance, 100 - 50 + prize);

    h.time.advance(10);
    let replay = h.ctx.scratch.play(user, "micro", "scratch-1").await.unwrap();
    assert_eq!(replay, first);
    assert_eq!(h.ctx.economy.balance(user).await.unwrap(), balance);
    assert_eq!(h.store.stats(user).await.unwrap().get("scratch_count"), Some(&1));
}

// =============================================================================
// Respect and admin resets
// =============================================================================

#[tokio::test]
async fn respect_is_daily_per_pair_and_ranked() {
    let h = setup().await;
    let (giver, receiver, rival) = (UserId::new(50), UserId::new(51), UserId::new(52));
    h.ctx.economy.start_player(receiver).await.unwrap();
    h.ctx.economy.start_player(rival).await.unwrap();

    assert_eq!(
        h.ctx.respect.give(giver, receiver).await.unwrap(),
        RespectOutcome::Given { cred: 1 }
    );
    assert_eq!(
        h.ctx.respect.give(giver, receiver).await.unwrap(),
        RespectOutcome::AlreadyGivenToday
    );
    assert_eq!(
        h.ctx.respect.give(giver, giver).await.unwrap(),
        RespectOutcome::SelfTarget
    );

    h.time.advance(DAY);
    assert_eq!(
        h.ctx.respect.give(giver, receiver).await.unwrap(),
        RespectOutcome::Given { cred: 2 }
    );
    h.ctx.respect.give(receiver, rival).await.unwrap();

    let top = h.ctx.respect.top_by_cred(10).await.unwrap();
    assert_eq!(
        top,
        vec![
            CredRow { user_id: receiver, cred: 2 },
            CredRow { user_id: rival, cred: 1 },
        ]
    );
    assert_eq!(h.ctx.respect.cred(giver).await.unwrap(), 0);
    assert_eq!(h.ctx.economy.count_players().await.unwrap(), 2);
}

#[tokio::test]
async fn admin_reset_clears_items_and_stats_but_keeps_money() {
    let h = setup().await;
    let user = UserId::new(53);
    h.ctx.economy.start_player(user).await.unwrap();
    h.ctx.economy.credit_once(user, 200, "seed", &key("seed")).await.unwrap();
    h.store.increment_stat(user, "beg_count", 5).await.unwrap();
    h.ctx.shop.buy(user, "cup", "buy-53").await.unwrap();

    assert_eq!(h.ctx.shop.reset(Some(user)).await.unwrap(), 1);
    assert_eq!(h.ctx.hustle.reset_stats(Some(user)).await.unwrap(), 1);

    assert!(h.store.inventory(user).await.unwrap().is_empty());
    assert!(h.store.stats(user).await.unwrap().is_empty());
    assert_eq!(h.ctx.economy.balance(user).await.unwrap(), 250);
    assert_eq!(h.ctx.economy.history(user, 10).await.unwrap().len(), 3);
}

// =============================================================================
// Contention on a shared file database
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_quota_calls_respect_the_cap() {
    let dir = TempDir::new().unwrap();
    let h = setup_file(&dir, |config| config).await;
    let user = UserId::new(60);

    let calls: Vec<_> = (0..24)
        .map(|_| {
            let quota = h.ctx.quota.clone();
            tokio::spawn(async move { quota.check_and_consume(user, "beg", 0, 3).await })
        })
        .collect();
    let mut admitted = 0;
    for call in calls {
        if call.await.unwrap().unwrap().admitted {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 3);
    assert_eq!(h.ctx.quota.peek_state(user, "beg").await.unwrap().count_today, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_duplicate_entries_apply_once() {
    let dir = TempDir::new().unwrap();
    let h = setup_file(&dir, |config| config).await;
    let user = UserId::new(61);
    let k = key("evt-61:beg:gain");

    let calls: Vec<_> = (0..24)
        .map(|_| {
            let economy = h.ctx.economy.clone();
            let k = k.clone();
            tokio::spawn(async move { economy.apply_once(user, 25, "hustle.beg", &k).await })
        })
        .collect();
    let mut applied = 0;
    for call in calls {
        let result = call.await.unwrap().unwrap();
        assert_eq!(result.balance, 25);
        if result.applied {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(h.ctx.economy.history(user, 10).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_claims_pay_the_day_once() {
    let dir = TempDir::new().unwrap();
    let h = setup_file(&dir, |config| config).await;
    let user = UserId::new(62);
    h.ctx.recycler.add_raw_units(user, 50).await.unwrap();
    h.ctx.recycler.pack(user, None).await.unwrap();

    let calls: Vec<_> = (0..24)
        .map(|n| {
            let recycler = h.ctx.recycler.clone();
            tokio::spawn(async move { recycler.claim(user, 1, &format!("claim-{n}")).await })
        })
        .collect();
    let mut days = 0;
    for call in calls {
        days += call.await.unwrap().unwrap().days_claimed();
    }

    assert_eq!(days, 1);
    assert_eq!(h.ctx.economy.balance(user).await.unwrap(), 120);
    assert_eq!(h.ctx.recycler.claim_log(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn held_write_lock_exhausts_retries_and_logs_context() {
    let dir = TempDir::new().unwrap();
    let h = setup_file(&dir, |config| {
        config
            .with_busy_timeout(StdDuration::from_millis(50))
            .with_retry(RetryPolicy::new(2, StdDuration::from_millis(10)))
    })
    .await;
    let logs = LogCapture::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut blocker = h.pool.pool().acquire().await.unwrap();
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *blocker).await.unwrap();

    let user = UserId::new(77);
    let result = h.ctx.quota.check_and_consume(user, "beg", 900, 10).await;
    assert!(
        matches!(
            result,
            Err(CoreError::Store(StoreError::Busy {
                operation: "check_and_consume",
                attempts: 3,
            }))
        ),
        "unexpected result {result:?}"
    );

    let output = logs.contents();
    let gave_up = output
        .lines()
        .find(|line| line.contains("Database busy, giving up"))
        .unwrap();
    assert!(gave_up.contains("user=77"), "{gave_up}");
    assert!(gave_up.contains("action=\"beg\""), "{gave_up}");
    assert_eq!(output.matches("Database busy, retrying").count(), 2);

    sqlx::query("ROLLBACK").execute(&mut *blocker).await.unwrap();
    drop(blocker);
    assert!(h.ctx.quota.check_and_consume(user, "beg", 900, 10).await.unwrap().admitted);
}

// =============================================================================
// Scheduled events
// =============================================================================

#[tokio::test]
async fn due_events_are_broadcast_once() {
    let h = setup().await;
    let now = h.time_now();
    h.ctx.scheduler.schedule(event("market:1", now - Duration::minutes(5))).await.unwrap();
    h.ctx.scheduler.schedule(event("market:2", now + Duration::hours(2))).await.unwrap();

    let report = h.ctx.scheduler.broadcast_pass().await.unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(h.publisher.posted(), vec!["market:1".to_owned()]);

    let again = h.ctx.scheduler.broadcast_pass().await.unwrap();
    assert_eq!(again.published, 0);

    let stored = h.store.event("market:1").await.unwrap().unwrap();
    assert_eq!(stored.status, EventStatus::Published);
    assert_eq!(stored.jump_url, "https://chat.example/feed/market:1");
    let recent = h.ctx.scheduler.recent(10).await.unwrap();
    assert_eq!(recent.len(), 1);
}

#[tokio::test]
async fn rescheduling_keeps_status() {
    let h = setup().await;
    let now = h.time_now();
    h.ctx.scheduler.schedule(event("market:3", now)).await.unwrap();
    h.ctx.scheduler.broadcast_pass().await.unwrap();

    let mut refreshed = event("market:3", now);
    refreshed.title = "Street market (moved)".to_owned();
    let stored = h.ctx.scheduler.schedule(refreshed).await.unwrap();

    assert_eq!(stored.status, EventStatus::Published);
    assert_eq!(stored.title, "Street market (moved)");
    assert_eq!(stored.payload["desc"], "Stalls open on the corner.");
}

#[tokio::test]
async fn posted_but_unmarked_event_is_recovered() {
    let h = setup().await;
    h.ctx.scheduler.schedule(event("market:4", h.time_now())).await.unwrap();
    let record = BroadcastRecord {
        event_key: "market:4".to_owned(),
        destination: "feed".to_owned(),
        message_id: "m-4".to_owned(),
        jump_url: "https://chat.example/feed/m-4".to_owned(),
    };
    assert!(h.store.record_broadcast(record.clone()).await.unwrap());
    assert!(!h.store.record_broadcast(record).await.unwrap());

    let report = h.ctx.scheduler.broadcast_pass().await.unwrap();
    assert_eq!(report.recovered, 1);
    assert!(h.publisher.posted().is_empty());
    let stored = h.store.event("market:4").await.unwrap().unwrap();
    assert_eq!(stored.jump_url, "https://chat.example/feed/m-4");
}

#[tokio::test]
async fn hourly_event_becomes_due_next_hour() {
    let h = setup().await;
    let planned = h.ctx.scheduler.plan_next_hour().await.unwrap();
    assert!(planned.id.starts_with("hourly:"));
    assert!(planned.starts_at > h.time_now());

    assert_eq!(h.ctx.scheduler.broadcast_pass().await.unwrap().published, 0);
    h.time.advance(3_600);
    assert_eq!(h.ctx.scheduler.broadcast_pass().await.unwrap().published, 1);
    assert_eq!(h.publisher.posted(), vec![planned.id]);
}

