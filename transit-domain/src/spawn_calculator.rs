//! Hybrid spawn model kernel.
//!
//! ```text
//! terminal_population  = buildings_near_depot * effective_rate
//! route_attractiveness = buildings_along_route / total_buildings_all_routes
//! passengers_per_route = terminal_population * route_attractiveness
//! lambda                = passengers_per_route * (time_window_minutes / 60.0)
//! spawn_count           = Poisson(lambda)
//! ```

use chrono::{DateTime, Datelike, Timelike, Utc};
use rand::Rng;
use rand_distr::{Distribution, Poisson};

use crate::error::SpawnError;
use crate::model::SpawnConfig;

/// Inputs for [`effective_rate`], validated once at construction so callers
/// downstream never need to re-check for negative/NaN rates.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveRateInputs {
    pub base_rate: f64,
    pub hourly_multiplier: f64,
    pub day_multiplier: f64,
}

impl EffectiveRateInputs {
    pub fn try_new(
        base_rate: f64,
        hourly_multiplier: f64,
        day_multiplier: f64,
    ) -> Result<Self, SpawnError> {
        for (name, v) in [
            ("base_rate", base_rate),
            ("hourly_multiplier", hourly_multiplier),
            ("day_multiplier", day_multiplier),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(SpawnError::Config(format!(
                    "{name} must be a finite, non-negative number, got {v}"
                )));
            }
        }
        Ok(Self {
            base_rate,
            hourly_multiplier,
            day_multiplier,
        })
    }
}

/// `(base_rate, hourly_multiplier, day_multiplier)` read out of a config for
/// the given wall-clock time. Missing keys default to `1.0` for the
/// multipliers, per [`SpawnConfig::hourly_rate`] / [`SpawnConfig::day_multiplier`].
pub fn temporal_multipliers(
    config: &SpawnConfig,
    base_rate: f64,
    current_time: DateTime<Utc>,
) -> (f64, f64, f64) {
    let hourly_mult = config.hourly_rate(current_time.hour() as u8);
    // chrono's Weekday::num_days_from_monday already matches Python's
    // datetime.weekday() (0 = Monday .. 6 = Sunday).
    let day_mult = config.day_multiplier(current_time.weekday().num_days_from_monday() as u8);
    (base_rate, hourly_mult, day_mult)
}

pub fn effective_rate(inputs: EffectiveRateInputs) -> f64 {
    inputs.base_rate * inputs.hourly_multiplier * inputs.day_multiplier
}

pub fn terminal_population(buildings_near_depot: u32, effective_rate: f64) -> f64 {
    buildings_near_depot as f64 * effective_rate
}

/// Zero-sum share of a depot's terminal population assigned to one route.
/// `0.0` when there are no buildings on any route at the depot (avoids a
/// division by zero rather than propagating NaN).
pub fn route_attractiveness(buildings_along_route: u32, total_buildings_all_routes: u32) -> f64 {
    if total_buildings_all_routes == 0 {
        return 0.0;
    }
    buildings_along_route as f64 / total_buildings_all_routes as f64
}

pub fn passengers_per_route(terminal_population: f64, route_attractiveness: f64) -> f64 {
    terminal_population * route_attractiveness
}

pub fn lambda_for_time_window(passengers_per_hour: f64, time_window_minutes: u32) -> f64 {
    passengers_per_hour * (time_window_minutes as f64 / 60.0)
}

/// Draws a spawn count from `Poisson(lambda)`. A non-positive lambda always
/// yields `0` without touching the RNG, matching the original's early return.
pub fn poisson_draw<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> u32 {
    if lambda <= 0.0 {
        return 0;
    }
    let dist = Poisson::new(lambda).expect("lambda already checked positive and finite");
    dist.sample(rng) as u32
}

/// Full breakdown of one [`calculate_hybrid_spawn`] or
/// [`calculate_validation_hybrid_spawn`] call, mirroring every intermediate
/// the original returns for observability and test assertions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridSpawnResult {
    pub base_rate: f64,
    pub hourly_mult: f64,
    pub day_mult: f64,
    pub effective_rate: f64,
    pub terminal_population: f64,
    pub route_attractiveness: f64,
    pub passengers_per_hour: f64,
    pub lambda_param: Option<f64>,
    pub spawn_count: Option<u32>,
}

#[allow(clippy::too_many_arguments)]
pub fn calculate_hybrid_spawn<R: Rng + ?Sized>(
    rng: &mut R,
    buildings_near_depot: u32,
    buildings_along_route: u32,
    total_buildings_all_routes: u32,
    config: &SpawnConfig,
    base_rate: f64,
    current_time: DateTime<Utc>,
    time_window_minutes: u32,
) -> Result<HybridSpawnResult, SpawnError> {
    let (base_rate, hourly_mult, day_mult) = temporal_multipliers(config, base_rate, current_time);
    let inputs = EffectiveRateInputs::try_new(base_rate, hourly_mult, day_mult)?;
    let eff_rate = effective_rate(inputs);
    let terminal_pop = terminal_population(buildings_near_depot, eff_rate);
    let attractiveness = route_attractiveness(buildings_along_route, total_buildings_all_routes);
    let passengers_per_hour = passengers_per_route(terminal_pop, attractiveness);
    let lambda = lambda_for_time_window(passengers_per_hour, time_window_minutes);
    let spawn_count = poisson_draw(rng, lambda);

    Ok(HybridSpawnResult {
        base_rate,
        hourly_mult,
        day_mult,
        effective_rate: eff_rate,
        terminal_population: terminal_pop,
        route_attractiveness: attractiveness,
        passengers_per_hour,
        lambda_param: Some(lambda),
        spawn_count: Some(spawn_count),
    })
}

/// Deterministic variant for validation/debug tooling: same pipeline, minus
/// the Poisson draw and the time-window conversion.
pub fn calculate_validation_hybrid_spawn(
    buildings_near_depot: u32,
    buildings_along_route: u32,
    total_buildings_all_routes: u32,
    base_rate: f64,
    hourly_mult: f64,
    day_mult: f64,
) -> Result<HybridSpawnResult, SpawnError> {
    let inputs = EffectiveRateInputs::try_new(base_rate, hourly_mult, day_mult)?;
    let eff_rate = effective_rate(inputs);
    let terminal_pop = terminal_population(buildings_near_depot, eff_rate);
    let attractiveness = route_attractiveness(buildings_along_route, total_buildings_all_routes);
    let passengers_per_hour = passengers_per_route(terminal_pop, attractiveness);

    Ok(HybridSpawnResult {
        base_rate,
        hourly_mult,
        day_mult,
        effective_rate: eff_rate,
        terminal_population: terminal_pop,
        route_attractiveness: attractiveness,
        passengers_per_hour,
        lambda_param: None,
        spawn_count: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64, eps: f64) {
        assert!((a - b).abs() < eps, "expected {a} ~= {b}");
    }

    #[test]
    fn validation_scenario_matches_worked_example() {
        // base=0.05, hourly=2.0, day=1.3, b_depot=1556, b_route=69 (solo route)
        let result =
            calculate_validation_hybrid_spawn(1556, 69, 69, 0.05, 2.0, 1.3).expect("valid inputs");
        approx(result.effective_rate, 0.130, 1e-9);
        approx(result.terminal_population, 202.28, 1e-6);
        approx(result.route_attractiveness, 1.0, 1e-9);
        approx(result.passengers_per_hour, 202.28, 1e-6);
    }

    #[test]
    fn lambda_matches_worked_example_for_fifteen_minute_window() {
        let lambda = lambda_for_time_window(202.28, 15);
        approx(lambda, 50.57, 1e-6);
    }

    #[test]
    fn route_attractiveness_splits_across_multiple_routes() {
        let attractiveness = route_attractiveness(69, 389);
        approx(attractiveness, 0.177_378_663_04, 1e-6);
    }

    #[test]
    fn route_attractiveness_is_zero_when_no_buildings_anywhere() {
        assert_eq!(route_attractiveness(0, 0), 0.0);
    }

    #[test]
    fn poisson_draw_is_always_zero_for_nonpositive_lambda() {
        let mut rng = rand::thread_rng();
        assert_eq!(poisson_draw(&mut rng, 0.0), 0);
        assert_eq!(poisson_draw(&mut rng, -5.0), 0);
    }

    #[test]
    fn effective_rate_inputs_reject_negative_rates() {
        assert!(EffectiveRateInputs::try_new(-1.0, 1.0, 1.0).is_err());
        assert!(EffectiveRateInputs::try_new(1.0, f64::NAN, 1.0).is_err());
    }

    #[test]
    fn temporal_multipliers_default_to_one_when_config_is_empty() {
        let config = SpawnConfig::defaults();
        let time = DateTime::parse_from_rfc3339("2024-10-28T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let (_, hourly, day) = temporal_multipliers(&config, 0.3, time);
        assert_eq!(hourly, 1.0);
        assert_eq!(day, 1.0);
    }

    #[test]
    fn full_pipeline_draws_a_spawn_count_with_a_seeded_rng() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let config = SpawnConfig::defaults();
        let time = DateTime::parse_from_rfc3339("2024-10-28T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let result = calculate_hybrid_spawn(&mut rng, 1556, 69, 69, &config, 0.05, time, 15)
            .expect("valid inputs");
        assert!(result.spawn_count.is_some());
        assert!(result.lambda_param.unwrap() > 0.0);
    }
}
