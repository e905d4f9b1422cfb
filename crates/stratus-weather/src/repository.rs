//! Persistence contracts.
//!
//! The engine only needs a read-your-writes store for the last-known
//! location and weather snapshot; the implementation (database, files) lives
//! outside this crate. Both writes are full replaces: the orchestrator
//! builds the complete new value and swaps it in atomically at the end of a
//! cycle.

use async_trait::async_trait;

use crate::types::{Location, Weather};

/// Durable storage for weather snapshots.
#[async_trait]
pub trait WeatherRepository: Send + Sync {
    /// Replace the stored snapshot for a location.
    async fn write_weather(&self, location: &Location, weather: &Weather) -> anyhow::Result<()>;
}

/// Durable storage for locations.
#[async_trait]
pub trait LocationRepository: Send + Sync {
    /// Replace the stored location (used after successful geocoding).
    async fn write_location(&self, location: &Location) -> anyhow::Result<()>;
}
