//! Weather refresh-and-reconciliation engine for Stratus
//!
//! Decides, per location and per feature, which source to call and whether
//! cached data is still fresh; merges primary and secondary payloads into
//! one consistent snapshot, synthesizing missing fields along the way; and
//! persists the result through pluggable repositories. Providers are
//! consumed through the traits in [`sources`]; none are implemented here.

pub mod error;
pub mod fusion;
pub mod gapfill;
pub mod orchestrator;
pub mod repository;
pub mod sources;
pub mod staleness;
pub mod types;

pub use error::{LocationError, RefreshError, RefreshErrorKind, SourceError};
pub use fusion::FusedWeather;
pub use orchestrator::{RefreshOrchestrator, RefreshOutcome};
pub use repository::{LocationRepository, WeatherRepository};
pub use sources::{
    Coordinates, LocationSource, ReverseGeocodingSource, SecondaryWeatherSource, SourceRegistry,
    WeatherSource,
};
pub use staleness::{RefreshPolicy, StalenessEvaluator};
pub use types::*;
