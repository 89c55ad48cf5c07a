//! Ride score: how good the weather is for a motorbike commute, 0 to 10.
//!
//! Pure and deterministic. Rain disqualifies outright; everything else is a
//! penalty against a perfect 10.

use daybreak_core::traits::{ConfigStore, keys};
use daybreak_core::types::WeatherSnapshot;

pub const DEFAULT_WIND_THRESHOLD_KMH: f64 = 25.0;
pub const DEFAULT_RAIN_THRESHOLD_PCT: f64 = 40.0;

/// Rain over the last hour that rules riding out.
const RAIN_MM_LIMIT: f64 = 0.5;
/// Multiple of the wind threshold that counts as "very strong".
const STRONG_WIND_FACTOR: f64 = 1.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RideThresholds {
    pub wind_kmh: f64,
    pub rain_chance_pct: f64,
}

impl Default for RideThresholds {
    fn default() -> Self {
        Self {
            wind_kmh: DEFAULT_WIND_THRESHOLD_KMH,
            rain_chance_pct: DEFAULT_RAIN_THRESHOLD_PCT,
        }
    }
}

impl RideThresholds {
    /// Read both thresholds; unparseable values fall back to the defaults.
    pub fn from_store(store: &dyn ConfigStore) -> Self {
        Self {
            wind_kmh: store.get_f64(keys::WIND_THRESHOLD, DEFAULT_WIND_THRESHOLD_KMH),
            rain_chance_pct: store.get_f64(keys::RAIN_THRESHOLD, DEFAULT_RAIN_THRESHOLD_PCT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    No,
    NotAdvised,
    Mixed,
    Ok,
    Perfect,
}

impl Verdict {
    fn for_score(score: u8) -> Self {
        match score {
            0 => Verdict::No,
            1..=3 => Verdict::NotAdvised,
            4..=6 => Verdict::Mixed,
            7..=8 => Verdict::Ok,
            _ => Verdict::Perfect,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::No => "🚫 NO - dangerous conditions",
            Verdict::NotAdvised => "⚠️ NOT ADVISED - high risk",
            Verdict::Mixed => "🤔 MIXED - your call",
            Verdict::Ok => "✅ OK - decent conditions",
            Verdict::Perfect => "🌟 PERFECT - go ride",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RideScore {
    pub score: u8,
    /// One line per penalty applied.
    pub details: Vec<String>,
    pub verdict: Verdict,
}

pub fn score_ride(weather: Option<&WeatherSnapshot>, thresholds: &RideThresholds) -> RideScore {
    let Some(w) = weather else {
        return RideScore {
            score: 0,
            details: vec!["❌ Weather data unavailable".into()],
            verdict: Verdict::No,
        };
    };

    let rain_mm = finite_or(w.rain_1h_mm, 0.0);
    let rain_chance = finite_or(w.rain_chance_pct, 0.0);
    if rain_mm > RAIN_MM_LIMIT || rain_chance > thresholds.rain_chance_pct {
        let mut reasons = Vec::new();
        if rain_mm > RAIN_MM_LIMIT {
            reasons.push(format!("{rain_mm:.1} mm"));
        }
        if rain_chance > thresholds.rain_chance_pct {
            reasons.push(format!("{rain_chance:.0}% chance"));
        }
        return RideScore {
            score: 0,
            details: vec![format!("☔ Rain expected ({}), ruled out", reasons.join(", "))],
            verdict: Verdict::No,
        };
    }

    let mut score: i32 = 10;
    let mut details = Vec::new();

    let wind = finite_or(w.wind_kmh, 0.0);
    if wind > thresholds.wind_kmh * STRONG_WIND_FACTOR {
        score -= 4;
        details.push(format!("💨 Very strong wind ({wind:.0} km/h): -4"));
    } else if wind > thresholds.wind_kmh {
        score -= 2;
        details.push(format!("💨 Strong wind ({wind:.0} km/h): -2"));
    }

    let temp = finite_or(w.temperature_c, 20.0);
    if temp < 3.0 {
        score -= 3;
        details.push(format!("🥶 Ice risk ({temp:.0}°C): -3"));
    } else if temp < 8.0 {
        score -= 1;
        details.push(format!("🥶 Cold ({temp:.0}°C): -1"));
    }
    if temp > 35.0 {
        score -= 1;
        details.push(format!("🥵 Heat ({temp:.0}°C): -1"));
    }

    let visibility = finite_or(w.visibility_m, 10_000.0);
    if visibility < 1000.0 {
        score -= 2;
        details.push(format!("🌫️ Fog (visibility {visibility:.0} m): -2"));
    }

    let score = score.clamp(0, 10) as u8;
    if details.is_empty() {
        details.push("✅ No penalty, ideal conditions".into());
    }
    RideScore {
        score,
        details,
        verdict: Verdict::for_score(score),
    }
}

fn finite_or(v: f64, fallback: f64) -> f64 {
    if v.is_finite() { v } else { fallback }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybreak_core::db::Database;

    fn weather() -> WeatherSnapshot {
        WeatherSnapshot {
            location: "Marseille".into(),
            description: "clear sky".into(),
            temperature_c: 18.0,
            feels_like_c: 18.0,
            humidity_pct: 50.0,
            wind_kmh: 10.0,
            gust_kmh: 15.0,
            rain_1h_mm: 0.0,
            rain_chance_pct: 0.0,
            visibility_m: 10_000.0,
            clouds_pct: 0.0,
        }
    }

    fn score(w: &WeatherSnapshot) -> RideScore {
        score_ride(Some(w), &RideThresholds::default())
    }

    #[test]
    fn test_no_weather_scores_zero() {
        let s = score_ride(None, &RideThresholds::default());
        assert_eq!(s.score, 0);
        assert_eq!(s.verdict, Verdict::No);
    }

    #[test]
    fn test_perfect_day() {
        let s = score(&weather());
        assert_eq!(s.score, 10);
        assert_eq!(s.verdict, Verdict::Perfect);
        assert_eq!(s.details.len(), 1);
    }

    #[test]
    fn test_rain_is_disqualifying() {
        let s = score(&WeatherSnapshot { rain_1h_mm: 0.6, ..weather() });
        assert_eq!(s.score, 0);
        let s = score(&WeatherSnapshot { rain_chance_pct: 41.0, ..weather() });
        assert_eq!(s.score, 0);
        // Exactly on the limits still rides.
        let s = score(&WeatherSnapshot { rain_1h_mm: 0.5, rain_chance_pct: 40.0, ..weather() });
        assert_eq!(s.score, 10);
    }

    #[test]
    fn test_penalties_stack() {
        let s = score(&WeatherSnapshot {
            wind_kmh: 30.0,
            temperature_c: 5.0,
            visibility_m: 800.0,
            ..weather()
        });
        assert_eq!(s.score, 5);
        assert_eq!(s.verdict, Verdict::Mixed);
        assert_eq!(s.details.len(), 3);
    }

    #[test]
    fn test_strong_wind_and_ice() {
        let s = score(&WeatherSnapshot {
            wind_kmh: 45.0,
            temperature_c: 1.0,
            visibility_m: 500.0,
            ..weather()
        });
        assert_eq!(s.score, 1);
        assert_eq!(s.verdict, Verdict::NotAdvised);
    }

    #[test]
    fn test_custom_thresholds() {
        let strict = RideThresholds { wind_kmh: 5.0, rain_chance_pct: 40.0 };
        let s = score_ride(Some(&weather()), &strict);
        assert_eq!(s.score, 6);
    }

    #[test]
    fn test_nan_input_never_panics() {
        let s = score(&WeatherSnapshot {
            wind_kmh: f64::NAN,
            temperature_c: f64::INFINITY,
            ..weather()
        });
        assert_eq!(s.score, 10);
    }

    #[test]
    fn test_thresholds_from_store() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(RideThresholds::from_store(&db), RideThresholds::default());
        db.set(keys::WIND_THRESHOLD, "30").unwrap();
        db.set(keys::RAIN_THRESHOLD, "lots").unwrap();
        let t = RideThresholds::from_store(&db);
        assert_eq!(t.wind_kmh, 30.0);
        assert_eq!(t.rain_chance_pct, DEFAULT_RAIN_THRESHOLD_PCT);
    }

    #[test]
    fn test_deterministic() {
        let w = WeatherSnapshot { wind_kmh: 27.0, ..weather() };
        assert_eq!(score(&w), score(&w));
    }
}
