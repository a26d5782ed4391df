use price_excursion::trajectory::{
    noise_from_seed, standard_normal, NoiseSource, ScriptedNoise, TrajectoryParams,
};

// u = e^-0.5 makes sqrt(-2 ln u) == 1; v = 0.5 makes cos(2*pi*v) == -1.
fn unit_negative_draws() -> ScriptedNoise {
    ScriptedNoise::new([(-0.5f64).exp(), 0.5])
}

/// Verifies the excursion step returns the target exactly once time is up.
#[test]
fn excursion_step_returns_target_when_time_is_up() {
    let params = TrajectoryParams::default();
    let mut noise = noise_from_seed(Some(7));
    for time_left in [0.0, -0.001, -5.0, -3600.0] {
        assert_eq!(params.excursion_step(100.0, 123.45, time_left, &mut noise), 123.45);
    }
}

/// Verifies drift closes the gap linearly when the noise draw is zero.
#[test]
fn excursion_step_applies_linear_drift() {
    let params = TrajectoryParams::default();
    // u = 1.0 yields z == 0 exactly.
    let mut noise = ScriptedNoise::new([1.0]);
    assert_eq!(params.excursion_step(100.0, 130.0, 30.0, &mut noise), 101.0);
    assert_eq!(params.excursion_step(100.0, 70.0, 10.0, &mut noise), 97.0);
}

/// Verifies the noise term scales with the current price and volatility/10.
#[test]
fn excursion_step_noise_scales_with_price() {
    let params = TrajectoryParams::default();
    let mut noise = unit_negative_draws();
    // drift 1.0, noise 100 * 0.002 * -1 = -0.2
    let next = params.excursion_step(100.0, 130.0, 30.0, &mut noise);
    assert!((next - 100.8).abs() < 1e-9, "got {}", next);

    let mut noise = unit_negative_draws();
    let next = params.excursion_step(1000.0, 1000.0, 5.0, &mut noise);
    assert!((next - 998.0).abs() < 1e-9, "got {}", next);
}

/// Verifies excursion steps are clamped to the price floor.
#[test]
fn excursion_step_respects_floor() {
    let params = TrajectoryParams::default();
    let mut noise = ScriptedNoise::new([1.0]);
    // drift = (1e-6 - 10) / 0.5 overshoots far below zero
    let next = params.excursion_step(10.0, 0.000_001, 0.5, &mut noise);
    assert_eq!(next, params.price_floor);
}

/// Verifies zero uniform draws are skipped instead of producing ln(0).
#[test]
fn standard_normal_rejects_zero_draws() {
    let mut noise = ScriptedNoise::new([0.0, (-0.5f64).exp(), 0.0, 0.5]);
    let z = standard_normal(&mut noise);
    assert!(z.is_finite());
    assert!((z + 1.0).abs() < 1e-9, "got {}", z);
}

/// Verifies seeded Box-Muller samples have roughly zero mean and unit variance.
#[test]
fn standard_normal_moments_are_plausible() {
    let mut rng = noise_from_seed(Some(42));
    let n = 20_000;
    let samples: Vec<f64> = (0..n).map(|_| standard_normal(&mut rng)).collect();
    let mean = samples.iter().sum::<f64>() / n as f64;
    let var = samples.iter().map(|z| (z - mean).powi(2)).sum::<f64>() / n as f64;
    assert!(mean.abs() < 0.05, "mean {}", mean);
    assert!((var - 1.0).abs() < 0.1, "variance {}", var);
}

/// Verifies the same seed replays the same draws.
#[test]
fn seeded_noise_is_deterministic() {
    let mut a = noise_from_seed(Some(99));
    let mut b = noise_from_seed(Some(99));
    for _ in 0..16 {
        assert_eq!(a.next_uniform(), b.next_uniform());
    }
}

/// Verifies scripted noise cycles and falls back to 0.5 when empty.
#[test]
fn scripted_noise_cycles() {
    let mut noise = ScriptedNoise::new([0.1, 0.2]);
    let drawn: Vec<f64> = (0..5).map(|_| noise.next_uniform()).collect();
    assert_eq!(drawn, vec![0.1, 0.2, 0.1, 0.2, 0.1]);

    let mut empty = ScriptedNoise::new(Vec::<f64>::new());
    assert_eq!(empty.next_uniform(), 0.5);
}

/// Verifies a zero gap with centered noise leaves the price unchanged.
#[test]
fn recovery_step_with_zero_gap_is_stationary() {
    let params = TrajectoryParams::default();
    let mut noise = ScriptedNoise::new([0.5]);
    assert_eq!(params.recovery_step(100.0, 100.0, &mut noise), 100.0);
}

/// Verifies a recovery step closes 10% of the gap.
#[test]
fn recovery_step_closes_tenth_of_gap() {
    let params = TrajectoryParams::default();
    let mut noise = ScriptedNoise::new([0.5]);
    let up = params.recovery_step(90.0, 100.0, &mut noise);
    assert!((up - 91.0).abs() < 1e-9, "got {}", up);
    let down = params.recovery_step(150.0, 100.0, &mut noise);
    assert!((down - 145.0).abs() < 1e-9, "got {}", down);
}

/// Verifies recovery noise stays within +-0.05% of the real price.
#[test]
fn recovery_noise_is_bounded() {
    let params = TrajectoryParams::default();
    let bound = 100.0 * params.recovery_noise / 2.0 + 1e-9;
    for u in [0.0, 0.25, 0.75, 0.999_999] {
        let mut noise = ScriptedNoise::new([u]);
        let next = params.recovery_step(90.0, 100.0, &mut noise);
        assert!((next - 91.0).abs() <= bound, "u={} gave {}", u, next);
    }
}

/// Verifies repeated recovery steps converge on a fixed real price.
#[test]
fn recovery_converges_within_bounded_steps() {
    let params = TrajectoryParams::default();
    let mut rng = noise_from_seed(Some(2024));
    for start in [150.0, 50.0, 100.5] {
        let mut price = start;
        let mut converged_at = None;
        for i in 0..500 {
            price = params.recovery_step(price, 100.0, &mut rng);
            if params.has_converged(price, 100.0) {
                converged_at = Some(i);
                break;
            }
        }
        assert!(converged_at.is_some(), "no convergence from {}", start);
    }
}

/// Verifies the convergence test uses a relative 0.1% threshold.
#[test]
fn convergence_threshold_is_relative() {
    let params = TrajectoryParams::default();
    assert!(params.has_converged(100.05, 100.0));
    assert!(params.has_converged(99.95, 100.0));
    assert!(!params.has_converged(100.2, 100.0));
    assert!(params.has_converged(50_020.0, 50_000.0));
    assert!(!params.has_converged(50_100.0, 50_000.0));
}

/// Verifies default parameters validate and bad ones are rejected.
#[test]
fn params_validation() {
    assert!(TrajectoryParams::default().validate().is_ok());

    let bad_rate = TrajectoryParams {
        recovery_rate: 1.5,
        ..TrajectoryParams::default()
    };
    assert!(bad_rate.validate().is_err());

    let bad_floor = TrajectoryParams {
        price_floor: 0.0,
        ..TrajectoryParams::default()
    };
    assert!(bad_floor.validate().is_err());

    let bad_noise = TrajectoryParams {
        recovery_noise: f64::NAN,
        ..TrajectoryParams::default()
    };
    assert!(bad_noise.validate().is_err());
}

/// Verifies recovery noise large enough to push a step below zero is rejected.
#[test]
fn params_reject_noise_that_can_cross_zero() {
    let params = TrajectoryParams {
        recovery_noise: 0.5,
        ..TrajectoryParams::default()
    };
    // real * (rate - noise / 2) = 100 * (0.1 - 0.25) < 0
    let mut noise = ScriptedNoise::new([0.0]);
    assert!(params.recovery_step(0.01, 100.0, &mut noise) < 0.0);
    assert!(params.validate().is_err());

    let at_limit = TrajectoryParams {
        recovery_noise: 0.2,
        ..TrajectoryParams::default()
    };
    assert!(at_limit.validate().is_err());

    let below_limit = TrajectoryParams {
        recovery_noise: 0.19,
        ..TrajectoryParams::default()
    };
    assert!(below_limit.validate().is_ok());
}
