//! The top-level refresh algorithm.
//!
//! One refresh cycle resolves the device position (when applicable),
//! re-geocodes if needed, decides per feature which source to call and
//! whether cached data is still fresh, issues the primary and secondary
//! fetches concurrently, fuses the results, and persists the new snapshot
//! exactly once at the end. Every failure path degrades to "best-available
//! data plus a typed error"; the public entry points never fail outright.
//!
//! Two concurrent refresh cycles for the same location are not serialized
//! here; the last write wins. Callers needing mutual exclusion serialize
//! refresh calls per location.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{RefreshError, RefreshErrorKind};
use crate::fusion;
use crate::repository::{LocationRepository, WeatherRepository};
use crate::sources::{SecondaryWeatherSource, SourceRegistry};
use crate::staleness::{RefreshPolicy, StalenessEvaluator};
use crate::types::{
    Base, Location, SecondaryPayload, SourceFeature, Weather, WeatherPayload,
};

/// What a refresh cycle hands back to the caller: the (possibly enriched)
/// location, the best-available snapshot, and every failure encountered.
#[derive(Debug)]
pub struct RefreshOutcome {
    pub location: Location,
    pub weather: Option<Weather>,
    pub errors: Vec<RefreshError>,
}

/// Drives refresh cycles against the registered sources and repositories.
pub struct RefreshOrchestrator {
    registry: Arc<SourceRegistry>,
    weather_repository: Arc<dyn WeatherRepository>,
    location_repository: Arc<dyn LocationRepository>,
}

impl RefreshOrchestrator {
    pub fn new(
        registry: Arc<SourceRegistry>,
        weather_repository: Arc<dyn WeatherRepository>,
        location_repository: Arc<dyn LocationRepository>,
    ) -> Self {
        Self {
            registry,
            weather_repository,
            location_repository,
        }
    }

    /// Run one refresh cycle for a location.
    ///
    /// Never fails: the outcome carries the best-available snapshot plus the
    /// accumulated error list. Cancelling the returned future before the
    /// final persist writes nothing.
    pub async fn refresh(&self, location: Location, policy: &RefreshPolicy) -> RefreshOutcome {
        self.refresh_at(location, policy, Utc::now()).await
    }

    /// Like [`refresh`](Self::refresh), with an explicit current instant.
    pub async fn refresh_at(
        &self,
        mut location: Location,
        policy: &RefreshPolicy,
        now: DateTime<Utc>,
    ) -> RefreshOutcome {
        let mut errors = Vec::new();

        // Step 1: resolve the device position. Failure keeps the previous
        // coordinates and the cycle continues.
        if location.current_position {
            self.resolve_current_position(&mut location, policy, &mut errors)
                .await;
        }

        // Step 2: reverse geocoding, only when something asks for it. The
        // weather fetch proceeds regardless of the result.
        self.maybe_reverse_geocode(&mut location, &mut errors).await;

        // The cached snapshot is read once here and only replaced at the end.
        let cached = location.weather.clone();

        let Some(primary) = self.registry.weather_source(&location.weather_source) else {
            errors.push(RefreshError::tagged(
                RefreshErrorKind::SourceNotInstalled,
                location.weather_source.clone(),
            ));
            return RefreshOutcome {
                weather: cached,
                location,
                errors,
            };
        };

        // Step 3: per-feature source assignment.
        let assignment = assign_features(&location, primary.supported_features());

        let evaluator = StalenessEvaluator::new(policy, now);
        let precipitation_ongoing = cached.as_ref().is_some_and(|w| w.is_precipitating(now));
        let alert_ongoing = cached.as_ref().is_some_and(|w| w.has_active_alert(now));

        let feature_valid = |feature: SourceFeature, restricted: bool| -> bool {
            let last = cached.as_ref().and_then(|w| w.base.update_time(feature));
            match feature {
                SourceFeature::Normals => evaluator.normals_valid(
                    last,
                    restricted,
                    location.current_position,
                    location.timezone,
                ),
                SourceFeature::Minutely => {
                    evaluator.is_valid(last, feature, restricted, precipitation_ongoing)
                }
                SourceFeature::Alerts => {
                    evaluator.is_valid(last, feature, restricted, alert_ongoing)
                }
                _ => evaluator.is_valid(last, feature, restricted, false),
            }
        };

        // Step 4: staleness is evaluated before any network call.
        let primary_restricted = primary.is_restricted();
        let main_valid = feature_valid(SourceFeature::Main, primary_restricted);
        let stale_primary_features: Vec<SourceFeature> = assignment
            .primary
            .iter()
            .copied()
            .filter(|&f| !feature_valid(f, primary_restricted))
            .collect();

        struct SecondaryFetch {
            source: Arc<dyn SecondaryWeatherSource>,
            features: Vec<SourceFeature>,
        }

        let mut secondary_fetches: Vec<SecondaryFetch> = Vec::new();
        for (source_id, features) in &assignment.secondary {
            let Some(source) = self.registry.secondary_source(source_id) else {
                errors.push(RefreshError::tagged(
                    RefreshErrorKind::SourceNotInstalled,
                    source_id.clone(),
                ));
                continue;
            };
            let restricted = source.is_restricted();
            let mut stale: Vec<SourceFeature> = features
                .iter()
                .copied()
                .filter(|&f| !feature_valid(f, restricted))
                .collect();
            stale.retain(|f| {
                if source.supported_features().contains(f) {
                    true
                } else {
                    errors.push(RefreshError::tagged(
                        RefreshErrorKind::UnsupportedFeature,
                        source_id.clone(),
                    ));
                    false
                }
            });
            if !stale.is_empty() {
                secondary_fetches.push(SecondaryFetch {
                    source,
                    features: stale,
                });
            }
        }

        let primary_needed = !main_valid || !stale_primary_features.is_empty();

        // Everything fresh: bump the overall refresh timestamp and return
        // the cached snapshot without a single network call.
        if let Some(cached_weather) = &cached {
            if !primary_needed && secondary_fetches.is_empty() {
                tracing::debug!("All requested features still fresh, skipping fetch");
                let mut weather = cached_weather.clone();
                weather.base.refresh_time = Some(now);
                self.persist(&location, &weather).await;
                location.weather = Some(weather.clone());
                return RefreshOutcome {
                    location,
                    weather: Some(weather),
                    errors,
                };
            }
        }

        // Steps 5 + 6: primary and secondary fetches are independent
        // concurrent units; one failing never blocks the others.
        let mut ignored: Vec<SourceFeature> = Vec::new();
        if main_valid {
            ignored.push(SourceFeature::Main);
        }
        for &feature in &assignment.primary {
            if !stale_primary_features.contains(&feature) {
                ignored.push(feature);
            }
        }
        for features in assignment.secondary.values() {
            ignored.extend(features.iter().copied());
        }

        let primary_fut = async {
            if primary_needed {
                Some(primary.request_weather(&location, &ignored).await)
            } else {
                None
            }
        };
        let secondary_futs = secondary_fetches.iter().map(|fetch| {
            let location = &location;
            async move {
                let result = fetch
                    .source
                    .request_secondary_weather(location, &fetch.features)
                    .await;
                (fetch, result)
            }
        });

        let (primary_result, secondary_results) =
            tokio::join!(primary_fut, join_all(secondary_futs));

        let mut refreshed: BTreeSet<SourceFeature> = BTreeSet::new();

        let payload: Option<WeatherPayload> = match primary_result {
            Some(Ok(mut payload)) => {
                if !main_valid {
                    refreshed.insert(SourceFeature::Main);
                }
                refreshed.extend(stale_primary_features.iter().copied());

                // The provider was told to skip the main forecast when it
                // was still fresh; the cached snapshot fills the hole.
                if main_valid {
                    if let Some(w) = &cached {
                        if payload.daily.is_empty() {
                            payload.daily = w.daily.clone();
                        }
                        if payload.hourly.is_empty() {
                            payload.hourly = w.hourly.clone();
                        }
                        if payload.current.is_none() {
                            payload.current = w.current.clone();
                        }
                        if payload.yesterday.is_none() {
                            payload.yesterday = w.yesterday.clone();
                        }
                    }
                }
                Some(payload)
            }
            Some(Err(error)) => {
                let kind = RefreshErrorKind::classify_source(&error);
                tracing::warn!(
                    "Primary fetch failed for {}, keeping cached data: {}",
                    primary.id(),
                    error
                );
                errors.push(RefreshError::tagged(kind, primary.id()));
                cached.as_ref().map(Weather::to_payload)
            }
            None => cached.as_ref().map(Weather::to_payload),
        };

        let Some(payload) = payload else {
            // Very first fetch failed: nothing to anchor a snapshot on.
            return RefreshOutcome {
                location,
                weather: None,
                errors,
            };
        };

        // Step 6 (continued): fold secondary results; each source fails
        // independently.
        let mut secondary_bundle = SecondaryPayload::default();
        for (fetch, result) in secondary_results {
            match result {
                Ok(data) => {
                    for &feature in &fetch.features {
                        refreshed.insert(feature);
                        match feature {
                            SourceFeature::AirQuality => {
                                secondary_bundle.air_quality = data.air_quality.clone();
                            }
                            SourceFeature::Pollen => {
                                secondary_bundle.pollen = data.pollen.clone();
                            }
                            SourceFeature::Minutely => {
                                secondary_bundle.minutely = data.minutely.clone();
                            }
                            SourceFeature::Alerts => {
                                secondary_bundle.alerts = data.alerts.clone();
                            }
                            SourceFeature::Normals => {
                                secondary_bundle.normals = data.normals.clone();
                            }
                            SourceFeature::Main => {}
                        }
                    }
                }
                Err(error) => {
                    let mut kind = RefreshErrorKind::classify_source(&error);
                    if kind == RefreshErrorKind::WeatherRequestFailed {
                        kind = RefreshErrorKind::SecondaryWeatherFailed;
                    }
                    tracing::warn!(
                        "Secondary fetch failed for {}: {}",
                        fetch.source.id(),
                        error
                    );
                    errors.push(RefreshError::tagged(kind, fetch.source.id()));
                }
            }
        }

        // Features not refreshed this cycle inherit the previous cached
        // data; they are backfilled, not treated as absent forever.
        if let Some(w) = &cached {
            if !refreshed.contains(&SourceFeature::AirQuality)
                && secondary_bundle.air_quality.is_none()
            {
                secondary_bundle.air_quality = Some(w.air_quality_payload());
            }
            if !refreshed.contains(&SourceFeature::Pollen) && secondary_bundle.pollen.is_none() {
                secondary_bundle.pollen = Some(w.pollen_payload());
            }
            if !refreshed.contains(&SourceFeature::Minutely)
                && secondary_bundle.minutely.is_none()
            {
                secondary_bundle.minutely = Some(w.minutely.clone());
            }
            if !refreshed.contains(&SourceFeature::Alerts) && secondary_bundle.alerts.is_none() {
                secondary_bundle.alerts = Some(w.alerts.clone());
            }
            if !refreshed.contains(&SourceFeature::Normals) && secondary_bundle.normals.is_none()
            {
                secondary_bundle.normals = w.normals.clone();
            }
        }

        // Step 7: merge.
        let fused = fusion::fuse(payload, secondary_bundle, location.timezone, now);

        // Step 8: per-feature timestamps advance only for features actually
        // refreshed; then one persist for the whole cycle.
        let mut base = Base {
            refresh_time: Some(now),
            ..Base::default()
        };
        for feature in [
            SourceFeature::Main,
            SourceFeature::AirQuality,
            SourceFeature::Pollen,
            SourceFeature::Minutely,
            SourceFeature::Alerts,
            SourceFeature::Normals,
        ] {
            let time = if refreshed.contains(&feature) {
                Some(now)
            } else {
                cached.as_ref().and_then(|w| w.base.update_time(feature))
            };
            base.set_update_time(feature, time);
        }

        let mut weather = Weather {
            base,
            current: fused.current,
            daily: fused.daily,
            hourly: fused.hourly,
            minutely: fused.minutely,
            alerts: fused.alerts,
            normals: fused.normals,
            yesterday: fused.yesterday,
        };
        weather.prune_expired_alerts(now);

        self.persist(&location, &weather).await;
        location.weather = Some(weather.clone());

        RefreshOutcome {
            location,
            weather: Some(weather),
            errors,
        }
    }

    async fn resolve_current_position(
        &self,
        location: &mut Location,
        policy: &RefreshPolicy,
        errors: &mut Vec<RefreshError>,
    ) {
        let Some(source_id) = policy.location_source.as_deref() else {
            tracing::warn!("No location source configured for current position");
            errors.push(RefreshError::new(RefreshErrorKind::LocationFailed));
            return;
        };

        match self.registry.location_source(source_id) {
            Some(source) => match source.request_location().await {
                Ok(coordinates) => {
                    location.latitude = coordinates.latitude;
                    location.longitude = coordinates.longitude;
                }
                Err(error) => {
                    tracing::warn!(
                        "Position lookup failed, keeping previous coordinates: {}",
                        error
                    );
                    errors.push(RefreshError::tagged(
                        RefreshErrorKind::classify_location(&error),
                        source_id,
                    ));
                }
            },
            None => {
                errors.push(RefreshError::tagged(
                    RefreshErrorKind::LocationFailed,
                    source_id,
                ));
            }
        }
    }

    async fn maybe_reverse_geocode(
        &self,
        location: &mut Location,
        errors: &mut Vec<RefreshError>,
    ) {
        let source = self.registry.geocoding_source(&location.weather_source);
        let needed = location.current_position
            || location.needs_geocode_refresh
            || source.as_ref().is_some_and(|s| !s.is_usable(location));
        if !needed {
            return;
        }

        let Some(source) = source else {
            tracing::debug!(
                "No reverse geocoding source registered for {}",
                location.weather_source
            );
            return;
        };

        match source.request_reverse_geocoding(location).await {
            Ok(results) => match results.into_iter().next() {
                Some(first) => {
                    *location = location.clone().with_geocoded(&first);
                    location.needs_geocode_refresh = false;
                    if let Err(error) = self.location_repository.write_location(location).await {
                        tracing::error!("Failed to persist geocoded location: {}", error);
                    }
                }
                None => {
                    errors.push(RefreshError::tagged(
                        RefreshErrorKind::ReverseGeocodingFailed,
                        source.id(),
                    ));
                }
            },
            Err(error) => {
                tracing::warn!(
                    "Reverse geocoding failed, keeping unenriched location: {}",
                    error
                );
                errors.push(RefreshError::tagged(
                    RefreshErrorKind::ReverseGeocodingFailed,
                    source.id(),
                ));
            }
        }
    }

    async fn persist(&self, location: &Location, weather: &Weather) {
        if let Err(error) = self.weather_repository.write_weather(location, weather).await {
            tracing::error!("Failed to persist weather snapshot: {}", error);
        }
    }
}

struct FeatureAssignment {
    /// Secondary features riding on the primary fetch.
    primary: Vec<SourceFeature>,
    /// Features delegated to other sources, grouped per source id.
    secondary: BTreeMap<String, Vec<SourceFeature>>,
}

/// Split the secondary features between the primary fetch and the
/// per-feature configured sources. A feature goes to a secondary source only
/// when the configured id differs from the primary's; features the primary
/// cannot deliver and no one else is configured for are skipped.
fn assign_features(location: &Location, primary_supported: &[SourceFeature]) -> FeatureAssignment {
    let mut primary = Vec::new();
    let mut secondary: BTreeMap<String, Vec<SourceFeature>> = BTreeMap::new();

    for &feature in SourceFeature::secondary() {
        match location.secondary_source_for(feature) {
            Some(id) => secondary.entry(id.to_string()).or_default().push(feature),
            None if primary_supported.contains(&feature) => primary.push(feature),
            None => {}
        }
    }

    FeatureAssignment { primary, secondary }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    fn location() -> Location {
        Location::new(47.6, -122.3, chrono_tz::America::Los_Angeles, "alpha")
    }

    #[test]
    fn test_assignment_rides_on_capable_primary() {
        let assignment = assign_features(
            &location(),
            &[SourceFeature::Alerts, SourceFeature::AirQuality],
        );
        assert_eq!(
            assignment.primary,
            vec![SourceFeature::AirQuality, SourceFeature::Alerts]
        );
        assert!(assignment.secondary.is_empty());
    }

    #[test]
    fn test_assignment_delegates_configured_features() {
        let mut location = location();
        location.pollen_source = Some("beta".to_string());
        location.minutely_source = Some("beta".to_string());
        location.alert_source = Some("gamma".to_string());

        let assignment = assign_features(&location, &[SourceFeature::Alerts]);

        assert!(assignment.primary.is_empty());
        assert_eq!(
            assignment.secondary.get("beta").unwrap(),
            &vec![SourceFeature::Pollen, SourceFeature::Minutely]
        );
        assert_eq!(
            assignment.secondary.get("gamma").unwrap(),
            &vec![SourceFeature::Alerts]
        );
    }

    #[test]
    fn test_assignment_skips_unprovided_features() {
        let assignment = assign_features(&location(), &[]);
        assert!(assignment.primary.is_empty());
        assert!(assignment.secondary.is_empty());
    }

    #[test]
    fn test_assignment_ignores_override_equal_to_primary() {
        let mut location = location();
        location.alert_source = Some("alpha".to_string());

        let assignment = assign_features(&location, &[SourceFeature::Alerts]);
        assert_eq!(assignment.primary, vec![SourceFeature::Alerts]);
        assert!(assignment.secondary.is_empty());
    }
}
