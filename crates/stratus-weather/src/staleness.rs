//! Per-feature freshness decisions.
//!
//! A feature's cached data may be reused as long as its age stays under the
//! TTL for that feature. Restricted sources (providers preferring slower
//! polling) get longer TTLs; features that are currently "ongoing"
//! (precipitation falling, an alert in effect) get much shorter ones.

use chrono::{DateTime, Datelike, Duration, Utc};
use chrono_tz::Tz;

use crate::types::SourceFeature;
use stratus_core::WeatherConfig;

/// The configuration value threaded through a refresh call: TTL overrides,
/// the forced-refresh floor, and the configured device-position source.
#[derive(Debug, Clone, Default)]
pub struct RefreshPolicy {
    /// Id of the source used to resolve the device position.
    pub location_source: Option<String>,
    /// Data updated before this instant is stale regardless of TTL, e.g.
    /// after a language change that affects localized text fields.
    pub minimum_refresh: Option<DateTime<Utc>>,

    main_ttl: Option<Duration>,
    air_quality_ttl: Option<Duration>,
    pollen_ttl: Option<Duration>,
    minutely_ttl: Option<Duration>,
    alerts_ttl: Option<Duration>,
    normals_ttl: Option<Duration>,
}

impl RefreshPolicy {
    /// Build a policy from the persisted weather configuration.
    pub fn from_config(config: &WeatherConfig) -> Self {
        let minutes = |m: Option<u32>| m.map(|m| Duration::minutes(i64::from(m)));
        Self {
            location_source: config.location_source.clone(),
            minimum_refresh: None,
            main_ttl: minutes(config.main_ttl_minutes),
            air_quality_ttl: minutes(config.air_quality_ttl_minutes),
            pollen_ttl: minutes(config.pollen_ttl_minutes),
            minutely_ttl: minutes(config.minutely_ttl_minutes),
            alerts_ttl: minutes(config.alerts_ttl_minutes),
            normals_ttl: minutes(config.normals_ttl_minutes),
        }
    }

    pub fn with_minimum_refresh(mut self, minimum: DateTime<Utc>) -> Self {
        self.minimum_refresh = Some(minimum);
        self
    }

    pub fn with_location_source(mut self, id: impl Into<String>) -> Self {
        self.location_source = Some(id.into());
        self
    }

    fn ttl_override(&self, feature: SourceFeature) -> Option<Duration> {
        match feature {
            SourceFeature::Main => self.main_ttl,
            SourceFeature::AirQuality => self.air_quality_ttl,
            SourceFeature::Pollen => self.pollen_ttl,
            SourceFeature::Minutely => self.minutely_ttl,
            SourceFeature::Alerts => self.alerts_ttl,
            SourceFeature::Normals => self.normals_ttl,
        }
    }
}

/// Built-in TTL per feature, in minutes.
fn builtin_ttl(feature: SourceFeature, restricted: bool, ongoing: bool) -> Duration {
    let minutes = match (feature, restricted, ongoing) {
        (SourceFeature::Main, false, _) => 5,
        (SourceFeature::Main, true, _) => 15,
        (SourceFeature::AirQuality, false, _) => 5,
        (SourceFeature::AirQuality, true, _) => 60,
        (SourceFeature::Pollen, false, _) => 5,
        (SourceFeature::Pollen, true, _) => 60,
        (SourceFeature::Minutely, false, false) => 5,
        (SourceFeature::Minutely, false, true) => 1,
        (SourceFeature::Minutely, true, false) => 15,
        (SourceFeature::Minutely, true, true) => 5,
        (SourceFeature::Alerts, false, false) => 5,
        (SourceFeature::Alerts, false, true) => 1,
        (SourceFeature::Alerts, true, false) => 60,
        (SourceFeature::Alerts, true, true) => 5,
        (SourceFeature::Normals, false, _) => 5,
        (SourceFeature::Normals, true, _) => 15,
    };
    Duration::minutes(minutes)
}

/// Decides whether cached per-feature data may be reused. Pure; `now` is
/// fixed at construction so one evaluator sees a consistent instant across a
/// whole refresh cycle.
#[derive(Debug, Clone, Copy)]
pub struct StalenessEvaluator<'a> {
    policy: &'a RefreshPolicy,
    now: DateTime<Utc>,
}

impl<'a> StalenessEvaluator<'a> {
    pub fn new(policy: &'a RefreshPolicy, now: DateTime<Utc>) -> Self {
        Self { policy, now }
    }

    /// Whether data last updated at `last_update` is still usable.
    ///
    /// `ongoing` marks a feature that is currently active (precipitation
    /// presently falling for minutely, an alert presently in effect for
    /// alerts) and shortens the TTL; configured overrides apply to the
    /// baseline case only.
    pub fn is_valid(
        &self,
        last_update: Option<DateTime<Utc>>,
        feature: SourceFeature,
        restricted: bool,
        ongoing: bool,
    ) -> bool {
        let Some(last) = last_update else {
            return false;
        };
        if self.below_minimum(last) {
            return false;
        }

        let ttl = if ongoing {
            builtin_ttl(feature, restricted, true)
        } else {
            self.policy
                .ttl_override(feature)
                .unwrap_or_else(|| builtin_ttl(feature, restricted, false))
        };

        self.now - last < ttl
    }

    /// Normals follow the TTL table for the current position; for a fixed
    /// location they stay valid until the calendar month changes in the
    /// location's timezone.
    pub fn normals_valid(
        &self,
        last_update: Option<DateTime<Utc>>,
        restricted: bool,
        current_position: bool,
        timezone: Tz,
    ) -> bool {
        if current_position {
            return self.is_valid(last_update, SourceFeature::Normals, restricted, false);
        }

        let Some(last) = last_update else {
            return false;
        };
        if self.below_minimum(last) {
            return false;
        }

        let last_local = last.with_timezone(&timezone);
        let now_local = self.now.with_timezone(&timezone);
        last_local.year() == now_local.year() && last_local.month() == now_local.month()
    }

    fn below_minimum(&self, last: DateTime<Utc>) -> bool {
        self.policy
            .minimum_refresh
            .is_some_and(|minimum| last < minimum)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, mi, 0).unwrap()
    }

    #[test]
    fn test_missing_last_update_is_invalid() {
        let policy = RefreshPolicy::default();
        let eval = StalenessEvaluator::new(&policy, utc(12, 0));
        assert!(!eval.is_valid(None, SourceFeature::Main, false, false));
    }

    #[test]
    fn test_main_ttl_boundary() {
        let policy = RefreshPolicy::default();
        let eval = StalenessEvaluator::new(&policy, utc(12, 0));

        // 4 minutes old: valid; exactly 5 minutes: stale
        assert!(eval.is_valid(Some(utc(11, 56)), SourceFeature::Main, false, false));
        assert!(!eval.is_valid(Some(utc(11, 55)), SourceFeature::Main, false, false));
    }

    #[test]
    fn test_restricted_source_gets_longer_ttl() {
        let policy = RefreshPolicy::default();
        let eval = StalenessEvaluator::new(&policy, utc(12, 0));

        let ten_minutes_old = Some(utc(11, 50));
        assert!(!eval.is_valid(ten_minutes_old, SourceFeature::Main, false, false));
        assert!(eval.is_valid(ten_minutes_old, SourceFeature::Main, true, false));

        let half_hour_old = Some(utc(11, 30));
        assert!(eval.is_valid(half_hour_old, SourceFeature::AirQuality, true, false));
        assert!(!eval.is_valid(half_hour_old, SourceFeature::AirQuality, false, false));
    }

    #[test]
    fn test_ongoing_precipitation_shortens_minutely_ttl() {
        let policy = RefreshPolicy::default();
        let eval = StalenessEvaluator::new(&policy, utc(12, 0));

        let two_minutes_old = Some(utc(11, 58));
        assert!(eval.is_valid(two_minutes_old, SourceFeature::Minutely, false, false));
        assert!(!eval.is_valid(two_minutes_old, SourceFeature::Minutely, false, true));
    }

    #[test]
    fn test_ongoing_alert_shortens_alert_ttl() {
        let policy = RefreshPolicy::default();
        let eval = StalenessEvaluator::new(&policy, utc(12, 0));

        let two_minutes_old = Some(utc(11, 58));
        assert!(!eval.is_valid(two_minutes_old, SourceFeature::Alerts, false, true));
        // Restricted + ongoing: 5 minutes
        assert!(eval.is_valid(two_minutes_old, SourceFeature::Alerts, true, true));
    }

    #[test]
    fn test_minimum_refresh_floor_wins_over_ttl() {
        let policy = RefreshPolicy::default().with_minimum_refresh(utc(11, 59));
        let eval = StalenessEvaluator::new(&policy, utc(12, 0));

        // One minute old, well within TTL, but before the floor
        assert!(!eval.is_valid(Some(utc(11, 58)), SourceFeature::Main, false, false));
        assert!(eval.is_valid(Some(utc(11, 59)), SourceFeature::Main, false, false));
    }

    #[test]
    fn test_ttl_override_replaces_baseline() {
        let config = WeatherConfig {
            main_ttl_minutes: Some(30),
            ..WeatherConfig::default()
        };
        let policy = RefreshPolicy::from_config(&config);
        let eval = StalenessEvaluator::new(&policy, utc(12, 0));

        assert!(eval.is_valid(Some(utc(11, 40)), SourceFeature::Main, false, false));
        assert!(!eval.is_valid(Some(utc(11, 30)), SourceFeature::Main, false, false));
    }

    #[test]
    fn test_ttl_override_does_not_weaken_ongoing_case() {
        let config = WeatherConfig {
            minutely_ttl_minutes: Some(30),
            ..WeatherConfig::default()
        };
        let policy = RefreshPolicy::from_config(&config);
        let eval = StalenessEvaluator::new(&policy, utc(12, 0));

        let two_minutes_old = Some(utc(11, 58));
        assert!(!eval.is_valid(two_minutes_old, SourceFeature::Minutely, false, true));
    }

    #[test]
    fn test_normals_current_position_uses_ttl() {
        let policy = RefreshPolicy::default();
        let eval = StalenessEvaluator::new(&policy, utc(12, 0));
        let tz = chrono_tz::UTC;

        assert!(eval.normals_valid(Some(utc(11, 58)), false, true, tz));
        assert!(!eval.normals_valid(Some(utc(11, 50)), false, true, tz));
    }

    #[test]
    fn test_normals_fixed_location_valid_within_month() {
        let policy = RefreshPolicy::default();
        let eval = StalenessEvaluator::new(&policy, utc(12, 0));
        let tz = chrono_tz::UTC;

        // Hours old, same calendar month
        let last = Utc.with_ymd_and_hms(2026, 3, 1, 0, 30, 0).unwrap();
        assert!(eval.normals_valid(Some(last), false, false, tz));

        // Previous month
        let last = Utc.with_ymd_and_hms(2026, 2, 28, 12, 0, 0).unwrap();
        assert!(!eval.normals_valid(Some(last), false, false, tz));
    }

    #[test]
    fn test_normals_month_boundary_respects_timezone() {
        let policy = RefreshPolicy::default();
        // 2026-03-01 02:00 UTC is still 2026-02-28 18:00 in Los Angeles
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap();
        let eval = StalenessEvaluator::new(&policy, now);

        let last = Utc.with_ymd_and_hms(2026, 2, 15, 12, 0, 0).unwrap();
        assert!(eval.normals_valid(Some(last), false, false, chrono_tz::America::Los_Angeles));
        assert!(!eval.normals_valid(Some(last), false, false, chrono_tz::UTC));
    }

    #[test]
    fn test_normals_fixed_location_missing_update_invalid() {
        let policy = RefreshPolicy::default();
        let eval = StalenessEvaluator::new(&policy, utc(12, 0));
        assert!(!eval.normals_valid(None, false, false, chrono_tz::UTC));
    }
}
