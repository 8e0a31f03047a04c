//! Synthetic dataset generator.
//!
//! Produces a deterministic, plausible-looking daily series for demos and
//! tests: a weekly rhythm, a gentle trend, a seasonal wave, and seeded noise.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::DailyMetric;

/// Multipliers for Monday through Sunday.
const WEEKDAY_BOOST: [f64; 7] = [0.95, 1.0, 1.05, 1.03, 1.02, 1.15, 1.1];
const BASE: f64 = 7200.0;
const TREND_START: f64 = -500.0;
const TREND_END: f64 = 700.0;
const SEASONAL_AMPLITUDE: f64 = 250.0;
const NOISE_SCALE: f64 = 900.0;

/// Longest series accepted from the command line (about a century).
pub const MAX_DAYS: u32 = 36_600;

/// Parameters for the synthetic series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyConfig {
    pub days: u32,
    pub seed: u64,
    /// First day of the series; defaults to `days - 1` days before today.
    pub start_date: Option<NaiveDate>,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            days: 180,
            seed: 42,
            start_date: None,
        }
    }
}

impl DummyConfig {
    fn resolved_start(&self) -> NaiveDate {
        self.start_date.unwrap_or_else(|| {
            let back = Duration::days(i64::from(self.days.saturating_sub(1)));
            Utc::now()
                .date_naive()
                .checked_sub_signed(back)
                .unwrap_or(NaiveDate::MIN)
        })
    }
}

/// Generates one row per day; identical configs yield identical rows.
///
/// The series stops early rather than run past the last representable date.
pub fn generate_daily_metrics(cfg: &DummyConfig) -> Vec<DailyMetric> {
    let start = cfg.resolved_start();
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    (0..cfg.days)
        .map_while(|i| {
            let date = start.checked_add_signed(Duration::days(i64::from(i)))?;
            let mult = WEEKDAY_BOOST[date.weekday().num_days_from_monday() as usize];
            let frac = if cfg.days <= 1 {
                0.0
            } else {
                f64::from(i) / f64::from(cfg.days - 1)
            };
            let trend = TREND_START + (TREND_END - TREND_START) * frac;
            let seasonal = SEASONAL_AMPLITUDE * (2.0 * std::f64::consts::PI * frac).sin();
            let noise = gaussian(&mut rng) * NOISE_SCALE;

            let value = ((BASE + trend + seasonal + noise) * mult).round().max(0.0);
            Some(DailyMetric::new(date, value as u64))
        })
        .collect()
}

/// Standard normal sample via Box-Muller.
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
