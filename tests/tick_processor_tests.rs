use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::Rng;

use price_excursion::error::{StoreError, StoreErrorKind, TickError};
use price_excursion::model::price_point::PricePoint;
use price_excursion::model::regime::Regime;
use price_excursion::model::simulation::SimulationState;
use price_excursion::price_source::PriceSource;
use price_excursion::price_store::{MemoryStore, PriceStore};
use price_excursion::tick_processor::TickProcessor;
use price_excursion::trajectory::{noise_from_seed, ScriptedNoise, TrajectoryParams};

#[derive(Default)]
struct StubSource {
    price: Option<f64>,
    calls: AtomicUsize,
}

impl StubSource {
    fn live(price: f64) -> Arc<Self> {
        Arc::new(Self {
            price: Some(price),
            calls: AtomicUsize::new(0),
        })
    }

    fn down() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PriceSource for StubSource {
    async fn fetch_real_price(&self, _symbol: &str) -> Option<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.price
    }
}

/// Store whose writes always fail with a non-schema error.
struct FlakyStore;

impl PriceStore for FlakyStore {
    async fn provision(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn append(&self, _point: &PricePoint) -> Result<(), StoreError> {
        Err(StoreError::Task("connection reset".to_string()))
    }

    async fn history(&self, _symbol: &str, _limit: usize) -> Result<Vec<PricePoint>, StoreError> {
        Ok(Vec::new())
    }

    fn schema(&self) -> String {
        String::new()
    }
}

fn t0() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
}

fn processor(
    source: Arc<StubSource>,
    store: MemoryStore,
    draws: &[f64],
) -> TickProcessor<Arc<StubSource>, MemoryStore, ScriptedNoise> {
    TickProcessor::new(
        source,
        store,
        ScriptedNoise::new(draws.to_vec()),
        TrajectoryParams::default(),
    )
}

fn active(start: f64, target: f64, duration: f64) -> SimulationState {
    SimulationState::idle()
        .start_excursion(start, target, duration, t0())
        .unwrap()
}

fn recovering() -> SimulationState {
    active(100.0, 150.0, 30.0).stop_excursion().unwrap()
}

/// Verifies an excursion drifts toward the target and lands on it exactly
/// when the duration runs out.
#[tokio::test]
async fn excursion_reaches_target_at_deadline() {
    let source = StubSource::live(100.0);
    let store = MemoryStore::new();
    let mut p = processor(source.clone(), store.clone(), &[1.0]);
    let state = active(100.0, 120.0, 30.0);

    let mid = p
        .process_at("BTCUSDT", 100.0, &state, t0() + Duration::seconds(10))
        .await
        .unwrap();
    assert_eq!(mid.next_status, Regime::Active);
    assert!(mid.is_simulated);
    assert_eq!(mid.next_price, 101.0);

    let end = p
        .process_at("BTCUSDT", mid.next_price, &state, t0() + Duration::seconds(30))
        .await
        .unwrap();
    assert_eq!(end.next_status, Regime::Recovering);
    assert!(end.is_simulated);
    assert_eq!(end.next_price, 120.0);

    // Active ticks never consult the real feed.
    assert_eq!(source.calls(), 0);
    assert_eq!(store.len("BTCUSDT"), 2);
}

/// Verifies a recovering price within 0.1% of the real price snaps to it and
/// the feed returns to idle.
#[test]
fn recovery_snaps_on_convergence() {
    tokio_test::block_on(async {
        let mut p = processor(StubSource::live(100.0), MemoryStore::new(), &[0.5]);
        let out = p
            .process_at("BTCUSDT", 100.05, &recovering(), t0())
            .await
            .unwrap();
        assert_eq!(out.next_status, Regime::Idle);
        assert_eq!(out.next_price, 100.0);
        assert!(out.is_simulated);
    });
}

/// Verifies a recovery tick far from the real price moves 10% of the gap.
#[tokio::test]
async fn recovery_steps_toward_real_price() {
    let mut p = processor(StubSource::live(100.0), MemoryStore::new(), &[0.5]);
    let out = p
        .process_at("BTCUSDT", 150.0, &recovering(), t0())
        .await
        .unwrap();
    assert_eq!(out.next_status, Regime::Recovering);
    assert!((out.next_price - 145.0).abs() < 1e-9);
    assert!(out.is_simulated);
}

/// Verifies recovery holds its price when the real feed is unavailable.
#[tokio::test]
async fn recovery_holds_when_source_is_down() {
    let source = StubSource::down();
    let mut p = processor(source.clone(), MemoryStore::new(), &[0.5]);
    let out = p
        .process_at("BTCUSDT", 150.0, &recovering(), t0())
        .await
        .unwrap();
    assert_eq!(out.next_status, Regime::Recovering);
    assert_eq!(out.next_price, 150.0);
    assert!(out.is_simulated);
    assert_eq!(source.calls(), 1);
}

/// Verifies idle ticks pass the real price through unmodified.
#[tokio::test]
async fn idle_tracks_real_price() {
    let store = MemoryStore::new();
    let mut p = processor(StubSource::live(64_000.5), store.clone(), &[]);
    let out = p
        .process_at("BTCUSDT", 63_000.0, &SimulationState::idle(), t0())
        .await
        .unwrap();
    assert_eq!(out.next_status, Regime::Idle);
    assert_eq!(out.next_price, 64_000.5);
    assert!(!out.is_simulated);

    let stored = store.history("BTCUSDT", 10).await.unwrap();
    assert_eq!(stored, vec![out.point]);
}

/// Verifies idle falls back to the last price, or the placeholder when no
/// price has been observed yet.
#[tokio::test]
async fn idle_falls_back_when_source_is_down() {
    let mut p = processor(StubSource::down(), MemoryStore::new(), &[]);
    let out = p
        .process_at("BTCUSDT", 0.0, &SimulationState::idle(), t0())
        .await
        .unwrap();
    assert_eq!(out.next_price, 1000.0);
    assert_eq!(out.next_status, Regime::Idle);
    assert!(!out.is_simulated);

    let out = p
        .process_at("BTCUSDT", 42.0, &SimulationState::idle(), t0())
        .await
        .unwrap();
    assert_eq!(out.next_price, 42.0);
}

/// Verifies non-positive real prices count as unavailable.
#[tokio::test]
async fn non_positive_real_price_is_ignored() {
    let mut p = processor(StubSource::live(0.0), MemoryStore::new(), &[]);
    let out = p
        .process_at("BTCUSDT", 55.0, &SimulationState::idle(), t0())
        .await
        .unwrap();
    assert_eq!(out.next_price, 55.0);
}

/// Verifies stopping an excursion makes the very next tick a recovery tick.
#[tokio::test]
async fn stop_forces_recovery_on_next_tick() {
    let mut p = processor(StubSource::live(100.0), MemoryStore::new(), &[0.5]);
    let stopped = active(100.0, 200.0, 60.0).stop_excursion().unwrap();
    let out = p
        .process_at("BTCUSDT", 150.0, &stopped, t0() + Duration::seconds(2))
        .await
        .unwrap();
    assert_eq!(out.next_status, Regime::Recovering);
    assert!((out.next_price - 145.0).abs() < 1e-9);
}

/// Verifies a missing table is reported on the outcome without losing the
/// computed price.
#[tokio::test]
async fn missing_table_reports_not_initialized() {
    let store = MemoryStore::unprovisioned();
    let mut p = processor(StubSource::live(100.0), store, &[]);
    let out = p
        .process_at("BTCUSDT", 0.0, &SimulationState::idle(), t0())
        .await
        .unwrap();
    assert_eq!(out.store_error, Some(StoreErrorKind::NotInitialized));
    assert!(out.store_not_initialized());
    assert_eq!(out.next_price, 100.0);
}

/// Verifies other persistence failures are transient and do not block the tick.
#[tokio::test]
async fn write_failure_is_transient() {
    let mut p = TickProcessor::new(
        StubSource::live(100.0),
        FlakyStore,
        ScriptedNoise::new([0.5]),
        TrajectoryParams::default(),
    );
    let out = p
        .process_at("BTCUSDT", 150.0, &recovering(), t0())
        .await
        .unwrap();
    assert_eq!(out.store_error, Some(StoreErrorKind::Transient));
    assert!(!out.store_not_initialized());
    assert_eq!(out.next_status, Regime::Recovering);
}

/// Verifies malformed inputs are rejected before anything is persisted.
#[tokio::test]
async fn invalid_inputs_are_rejected() {
    let store = MemoryStore::new();
    let mut p = processor(StubSource::live(100.0), store.clone(), &[]);
    let idle = SimulationState::idle();

    for bad in [f64::NAN, f64::INFINITY, -1.0] {
        assert!(matches!(
            p.process_at("BTCUSDT", bad, &idle, t0()).await,
            Err(TickError::InvalidInput(_))
        ));
    }

    let broken = SimulationState {
        duration_secs: 0.0,
        ..active(100.0, 120.0, 30.0)
    };
    assert!(matches!(
        p.process_at("BTCUSDT", 100.0, &broken, t0()).await,
        Err(TickError::Simulation(_))
    ));
    assert_eq!(store.len("BTCUSDT"), 0);
}

/// Verifies no tick ever emits a non-positive price, across random excursions
/// and recoveries.
#[tokio::test]
async fn prices_stay_positive() {
    let mut rng = noise_from_seed(Some(11));
    let store = MemoryStore::new();
    let mut p = TickProcessor::new(
        StubSource::live(0.5),
        store.clone(),
        noise_from_seed(Some(12)),
        TrajectoryParams::default(),
    );

    for _ in 0..300 {
        let current = rng.gen_range(0.0..1_000.0);
        let target = rng.gen_range(0.000_01..1_000.0);
        let duration = rng.gen_range(1.0..60.0);
        let elapsed_ms = rng.gen_range(0..90_000);
        let state = SimulationState::idle()
            .start_excursion(current, target, duration, t0())
            .unwrap();
        let now = t0() + Duration::milliseconds(elapsed_ms);

        let out = p.process_at("SOLUSDT", current, &state, now).await.unwrap();
        assert!(out.next_price > 0.0, "active produced {}", out.next_price);

        let stopped = state.stop_excursion().unwrap();
        let out = p.process_at("SOLUSDT", current, &stopped, now).await.unwrap();
        assert!(out.next_price > 0.0, "recovery produced {}", out.next_price);
    }
    assert_eq!(store.len("SOLUSDT"), 600);
}

/// Verifies a recovery tick is floored even when the parameters were never
/// validated.
#[tokio::test]
async fn recovery_is_floored_for_unvalidated_params() {
    let params = TrajectoryParams {
        recovery_noise: 0.5,
        ..TrajectoryParams::default()
    };
    let mut p = TickProcessor::new(
        StubSource::live(100.0),
        MemoryStore::new(),
        ScriptedNoise::new([0.0]),
        params,
    );
    let out = p
        .process_at("BTCUSDT", 0.01, &recovering(), t0())
        .await
        .unwrap();
    assert_eq!(out.next_status, Regime::Recovering);
    assert_eq!(out.next_price, params.price_floor);
    assert!(out.next_price > 0.0);
}

/// Verifies the convenience entry point stamps points with the wall clock.
#[tokio::test]
async fn process_uses_wall_clock() {
    let mut p = processor(StubSource::live(10.0), MemoryStore::new(), &[]);
    let before = Utc::now();
    let out = p
        .process("ETHUSDT", 9.0, &SimulationState::idle())
        .await
        .unwrap();
    assert!(out.point.timestamp >= before);
    assert_eq!(out.point.symbol, "ETHUSDT");
}
