//! Provider abstractions and the source registry.
//!
//! The engine consumes providers exclusively through these traits; it
//! implements none of them. The transport underneath each implementation
//! owns timeouts and socket-level retries.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{LocationError, SourceError};
use crate::types::{Location, SecondaryPayload, SourceFeature, WeatherPayload};

/// Raw coordinates from a device-position lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A provider supplying the main forecast (and possibly secondary features
/// alongside it).
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Unique identifier for this source
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Secondary features this source can deliver with the main fetch.
    fn supported_features(&self) -> &[SourceFeature] {
        &[]
    }

    /// Whether this source prefers slower polling (longer TTLs).
    fn is_restricted(&self) -> bool {
        false
    }

    /// Fetch weather for a location. `ignored_features` lists the features
    /// the caller does not want (delegated elsewhere or still fresh); the
    /// payload may omit fields at will.
    async fn request_weather(
        &self,
        location: &Location,
        ignored_features: &[SourceFeature],
    ) -> Result<WeatherPayload, SourceError>;
}

/// A provider supplying specific secondary features independently of the
/// main forecast.
#[async_trait]
pub trait SecondaryWeatherSource: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn supported_features(&self) -> &[SourceFeature];

    fn is_restricted(&self) -> bool {
        false
    }

    async fn request_secondary_weather(
        &self,
        location: &Location,
        features: &[SourceFeature],
    ) -> Result<SecondaryPayload, SourceError>;
}

/// Resolves coordinates into administrative place names.
#[async_trait]
pub trait ReverseGeocodingSource: Send + Sync {
    fn id(&self) -> &str;

    /// Whether the location can be used as-is without re-geocoding.
    fn is_usable(&self, _location: &Location) -> bool {
        true
    }

    /// Resolve a location's place names; the first result wins.
    async fn request_reverse_geocoding(
        &self,
        location: &Location,
    ) -> Result<Vec<Location>, SourceError>;
}

/// Resolves the current device position.
#[async_trait]
pub trait LocationSource: Send + Sync {
    fn id(&self) -> &str;

    async fn request_location(&self) -> Result<Coordinates, LocationError>;
}

/// Registry of provider implementations, looked up by id and capability.
#[derive(Default)]
pub struct SourceRegistry {
    weather: HashMap<String, Arc<dyn WeatherSource>>,
    secondary: HashMap<String, Arc<dyn SecondaryWeatherSource>>,
    geocoding: HashMap<String, Arc<dyn ReverseGeocodingSource>>,
    location: HashMap<String, Arc<dyn LocationSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_weather_source(&mut self, source: Arc<dyn WeatherSource>) {
        tracing::debug!("Registering weather source: {}", source.id());
        self.weather.insert(source.id().to_string(), source);
    }

    pub fn register_secondary_source(&mut self, source: Arc<dyn SecondaryWeatherSource>) {
        tracing::debug!("Registering secondary weather source: {}", source.id());
        self.secondary.insert(source.id().to_string(), source);
    }

    pub fn register_geocoding_source(&mut self, source: Arc<dyn ReverseGeocodingSource>) {
        tracing::debug!("Registering reverse geocoding source: {}", source.id());
        self.geocoding.insert(source.id().to_string(), source);
    }

    pub fn register_location_source(&mut self, source: Arc<dyn LocationSource>) {
        tracing::debug!("Registering location source: {}", source.id());
        self.location.insert(source.id().to_string(), source);
    }

    pub fn weather_source(&self, id: &str) -> Option<Arc<dyn WeatherSource>> {
        self.weather.get(id).cloned()
    }

    pub fn secondary_source(&self, id: &str) -> Option<Arc<dyn SecondaryWeatherSource>> {
        self.secondary.get(id).cloned()
    }

    pub fn geocoding_source(&self, id: &str) -> Option<Arc<dyn ReverseGeocodingSource>> {
        self.geocoding.get(id).cloned()
    }

    pub fn location_source(&self, id: &str) -> Option<Arc<dyn LocationSource>> {
        self.location.get(id).cloned()
    }
}
