//! Pure gap-filling algorithms.
//!
//! These synthesize missing fields from adjacent, already-available data:
//! an intraday UV estimate from the day's maximum, daily air quality from
//! hourly samples, moon phase angles from textual phase names. No I/O.

use chrono::{DateTime, Utc};

use crate::types::{AirQuality, Hourly};

/// Minimum number of hourly samples carrying an air-quality reading before a
/// daily average is produced at all. A day with mostly missing pollutant
/// data is not represented rather than being extrapolated.
pub const MIN_AIR_QUALITY_SAMPLES: usize = 18;

/// Estimate the UV index at time `t` from the day's maximum, assuming a
/// sinusoidal curve between sunrise and sunset.
///
/// `sunrise`, `sunset` and `t` are fractional hours of the local day.
/// Returns `None` outside `[sunrise, sunset]`, when any input is missing, or
/// when sunrise is after sunset; negative results clamp to 0.
pub fn estimate_uv_index(
    day_max_uv: Option<f64>,
    sunrise: Option<f64>,
    sunset: Option<f64>,
    t: f64,
) -> Option<f64> {
    let max = day_max_uv?;
    let rise = sunrise?;
    let set = sunset?;

    if rise > set || t < rise || t > set {
        return None;
    }

    let duration = set - rise;
    if duration <= 0.0 {
        return None;
    }

    let offset = -std::f64::consts::PI * rise / duration;
    let estimate = max * (std::f64::consts::PI / duration * t + offset).sin();

    Some(estimate.max(0.0))
}

/// Average the hourly air-quality samples of one day into a daily reading.
///
/// Requires at least [`MIN_AIR_QUALITY_SAMPLES`] hours carrying a reading;
/// each pollutant is the arithmetic mean of the hours that reported it.
pub fn daily_air_quality(hours: &[&Hourly]) -> Option<AirQuality> {
    let samples: Vec<&AirQuality> = hours
        .iter()
        .filter_map(|h| h.air_quality.as_ref())
        .filter(|aq| !aq.is_empty())
        .collect();

    if hours.len() < MIN_AIR_QUALITY_SAMPLES || samples.len() < MIN_AIR_QUALITY_SAMPLES {
        return None;
    }

    Some(AirQuality {
        pm25: mean(samples.iter().filter_map(|aq| aq.pm25)),
        pm10: mean(samples.iter().filter_map(|aq| aq.pm10)),
        so2: mean(samples.iter().filter_map(|aq| aq.so2)),
        no2: mean(samples.iter().filter_map(|aq| aq.no2)),
        o3: mean(samples.iter().filter_map(|aq| aq.o3)),
        co: mean(samples.iter().filter_map(|aq| aq.co)),
    })
}

/// The day's maximum UV index across all hourly readings, if any.
pub fn daily_max_uv(hours: &[&Hourly]) -> Option<f64> {
    hours
        .iter()
        .filter_map(|h| h.uv_index)
        .fold(None, |acc, uv| match acc {
            Some(max) if max >= uv => Some(max),
            _ => Some(uv),
        })
}

/// Map a textual moon phase name to one of 8 phase angles.
///
/// Case-insensitive, tolerates the space/no-space variants sources emit.
/// Unrecognized or empty input maps to 360 (full circle treated as "new"),
/// matching observed source behavior.
pub fn moon_phase_angle(phase_text: Option<&str>) -> i32 {
    let normalized: String = phase_text
        .unwrap_or_default()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    match normalized.as_str() {
        "waxingcrescent" => 45,
        "first" | "firstquarter" => 90,
        "waxinggibbous" => 135,
        "full" | "fullmoon" => 180,
        "waninggibbous" => 225,
        "third" | "thirdquarter" | "last" | "lastquarter" => 270,
        "waningcrescent" => 315,
        _ => 360,
    }
}

/// Hours of sunlight between sunrise and sunset, or `None` when either is
/// missing or sunrise is after sunset.
pub fn hours_of_sun(rise: Option<DateTime<Utc>>, set: Option<DateTime<Utc>>) -> Option<f64> {
    let rise = rise?;
    let set = set?;
    if rise > set {
        return None;
    }
    Some((set - rise).num_seconds() as f64 / 3600.0)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use chrono::TimeZone;

    fn hour_with_aq(pm25: Option<f64>) -> Hourly {
        let mut hourly = Hourly::new(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        hourly.air_quality = pm25.map(|v| AirQuality {
            pm25: Some(v),
            ..AirQuality::default()
        });
        hourly
    }

    #[test]
    fn test_uv_estimate_is_zero_at_sunrise_and_sunset() {
        let at_sunrise = estimate_uv_index(Some(10.0), Some(6.0), Some(18.0), 6.0).unwrap();
        assert!(at_sunrise.abs() < 1e-9);

        let at_sunset = estimate_uv_index(Some(10.0), Some(6.0), Some(18.0), 18.0).unwrap();
        assert!(at_sunset.abs() < 1e-9);
    }

    #[test]
    fn test_uv_estimate_peaks_at_solar_noon() {
        let at_noon = estimate_uv_index(Some(10.0), Some(6.0), Some(18.0), 12.0).unwrap();
        assert!((at_noon - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_uv_estimate_undefined_outside_daylight() {
        assert!(estimate_uv_index(Some(10.0), Some(6.0), Some(18.0), 5.0).is_none());
        assert!(estimate_uv_index(Some(10.0), Some(6.0), Some(18.0), 19.0).is_none());
    }

    #[test]
    fn test_uv_estimate_undefined_on_missing_or_inverted_inputs() {
        assert!(estimate_uv_index(None, Some(6.0), Some(18.0), 12.0).is_none());
        assert!(estimate_uv_index(Some(10.0), None, Some(18.0), 12.0).is_none());
        assert!(estimate_uv_index(Some(10.0), Some(6.0), None, 12.0).is_none());
        assert!(estimate_uv_index(Some(10.0), Some(18.0), Some(6.0), 12.0).is_none());
    }

    #[test]
    fn test_uv_estimate_asymmetric_day() {
        // Sunrise 8, sunset 16: midpoint is noon
        let at_midpoint = estimate_uv_index(Some(6.0), Some(8.0), Some(16.0), 12.0).unwrap();
        assert!((at_midpoint - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_daily_air_quality_needs_eighteen_samples() {
        let hours: Vec<Hourly> = (0..17).map(|_| hour_with_aq(Some(10.0))).collect();
        let refs: Vec<&Hourly> = hours.iter().collect();
        assert!(daily_air_quality(&refs).is_none());
    }

    #[test]
    fn test_daily_air_quality_mean_of_eighteen() {
        // 18 samples: 17 at 10.0, one at 28.0 -> mean 11.0
        let mut hours: Vec<Hourly> = (0..17).map(|_| hour_with_aq(Some(10.0))).collect();
        hours.push(hour_with_aq(Some(28.0)));
        let refs: Vec<&Hourly> = hours.iter().collect();

        let aq = daily_air_quality(&refs).unwrap();
        assert!((aq.pm25.unwrap() - 11.0).abs() < 1e-9);
        assert!(aq.pm10.is_none());
    }

    #[test]
    fn test_daily_air_quality_ignores_empty_readings() {
        // 24 hours but only 17 carry a reading
        let mut hours: Vec<Hourly> = (0..17).map(|_| hour_with_aq(Some(10.0))).collect();
        hours.extend((0..7).map(|_| hour_with_aq(None)));
        let refs: Vec<&Hourly> = hours.iter().collect();

        assert!(daily_air_quality(&refs).is_none());
    }

    #[test]
    fn test_daily_air_quality_per_pollutant_means() {
        let mut hours: Vec<Hourly> = (0..18).map(|_| hour_with_aq(Some(10.0))).collect();
        // Only one hour reports ozone; its mean is that single value
        hours[0].air_quality.as_mut().unwrap().o3 = Some(80.0);
        let refs: Vec<&Hourly> = hours.iter().collect();

        let aq = daily_air_quality(&refs).unwrap();
        assert_eq!(aq.o3, Some(80.0));
    }

    #[test]
    fn test_daily_max_uv() {
        let mut hours: Vec<Hourly> = (0..3).map(|_| hour_with_aq(None)).collect();
        hours[0].uv_index = Some(2.0);
        hours[1].uv_index = Some(7.5);
        let refs: Vec<&Hourly> = hours.iter().collect();

        assert_eq!(daily_max_uv(&refs), Some(7.5));
    }

    #[test]
    fn test_daily_max_uv_none_without_readings() {
        let hours: Vec<Hourly> = (0..3).map(|_| hour_with_aq(None)).collect();
        let refs: Vec<&Hourly> = hours.iter().collect();
        assert_eq!(daily_max_uv(&refs), None);
    }

    #[test]
    fn test_moon_phase_angle_table() {
        assert_eq!(moon_phase_angle(Some("Waxing Crescent")), 45);
        assert_eq!(moon_phase_angle(Some("waxingcrescent")), 45);
        assert_eq!(moon_phase_angle(Some("First Quarter")), 90);
        assert_eq!(moon_phase_angle(Some("first")), 90);
        assert_eq!(moon_phase_angle(Some("Waxing Gibbous")), 135);
        assert_eq!(moon_phase_angle(Some("FULL MOON")), 180);
        assert_eq!(moon_phase_angle(Some("full")), 180);
        assert_eq!(moon_phase_angle(Some("Waning Gibbous")), 225);
        assert_eq!(moon_phase_angle(Some("Last Quarter")), 270);
        assert_eq!(moon_phase_angle(Some("third quarter")), 270);
        assert_eq!(moon_phase_angle(Some("Waning Crescent")), 315);
    }

    #[test]
    fn test_moon_phase_angle_fallback_is_360() {
        // Observed source behavior: anything unrecognized (including "new")
        // maps to the full circle.
        assert_eq!(moon_phase_angle(Some("new moon")), 360);
        assert_eq!(moon_phase_angle(Some("gibberish")), 360);
        assert_eq!(moon_phase_angle(Some("")), 360);
        assert_eq!(moon_phase_angle(None), 360);
    }

    #[test]
    fn test_hours_of_sun() {
        let rise = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();
        let set = Utc.with_ymd_and_hms(2026, 3, 1, 18, 30, 0).unwrap();
        assert_eq!(hours_of_sun(Some(rise), Some(set)), Some(12.5));
    }

    #[test]
    fn test_hours_of_sun_missing_or_inverted() {
        let rise = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();
        let set = Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap();
        assert_eq!(hours_of_sun(None, Some(set)), None);
        assert_eq!(hours_of_sun(Some(rise), None), None);
        assert_eq!(hours_of_sun(Some(set), Some(rise)), None);
    }
}
