//! Refresh error taxonomy and classification.
//!
//! Every stage of a refresh cycle catches its own failures, converts them to
//! a [`RefreshError`] and continues with the best previously-known value.
//! Nothing propagates as an unhandled error out of the engine's public entry
//! points; the caller receives a (possibly partially stale) snapshot plus a
//! list of these.

use thiserror::Error;

use crate::types::SourceFeature;

/// The kinds of failure a refresh cycle can accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshErrorKind {
    NetworkUnavailable,
    ServerTimeout,
    ApiUnauthorized,
    ApiLimitReached,
    ApiKeyMissing,
    InvalidLocation,
    LocationFailed,
    MissingForegroundLocationPermission,
    MissingBackgroundLocationPermission,
    ReverseGeocodingFailed,
    SecondaryWeatherFailed,
    UnsupportedFeature,
    SourceNotInstalled,
    ParsingError,
    LocationSearchFailed,
    WeatherRequestFailed,
}

impl RefreshErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkUnavailable => "network-unavailable",
            Self::ServerTimeout => "server-timeout",
            Self::ApiUnauthorized => "api-unauthorized",
            Self::ApiLimitReached => "api-limit-reached",
            Self::ApiKeyMissing => "api-key-missing",
            Self::InvalidLocation => "invalid-location",
            Self::LocationFailed => "location-failed",
            Self::MissingForegroundLocationPermission => "missing-foreground-location-permission",
            Self::MissingBackgroundLocationPermission => "missing-background-location-permission",
            Self::ReverseGeocodingFailed => "reverse-geocoding-failed",
            Self::SecondaryWeatherFailed => "secondary-weather-failed",
            Self::UnsupportedFeature => "unsupported-feature",
            Self::SourceNotInstalled => "source-not-installed",
            Self::ParsingError => "parsing-error",
            Self::LocationSearchFailed => "location-search-failed",
            Self::WeatherRequestFailed => "weather-request-failed",
        }
    }

    /// Returns a user-friendly message suitable for display in the UI.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NetworkUnavailable => "Unable to connect. Check your internet connection.",
            Self::ServerTimeout => "The weather service timed out. Please try again.",
            Self::ApiUnauthorized => "The weather service rejected the API credentials.",
            Self::ApiLimitReached => "Request limit reached for this weather service.",
            Self::ApiKeyMissing => "An API key is required for this weather service.",
            Self::InvalidLocation => "This location is not supported by the weather service.",
            Self::LocationFailed => "Unable to resolve the device position.",
            Self::MissingForegroundLocationPermission => {
                "Location permission is required to refresh the current position."
            }
            Self::MissingBackgroundLocationPermission => {
                "Background location permission is required for automatic refresh."
            }
            Self::ReverseGeocodingFailed => "Unable to resolve the place name for this position.",
            Self::SecondaryWeatherFailed => "A secondary weather service failed. Data may be out of date.",
            Self::UnsupportedFeature => "This weather service does not provide the requested data.",
            Self::SourceNotInstalled => "The configured weather service is not available.",
            Self::ParsingError => "Received an unexpected response from the weather service.",
            Self::LocationSearchFailed => "Location search failed. Please try again.",
            Self::WeatherRequestFailed => "The weather request failed. Please try again.",
        }
    }
}

impl std::fmt::Display for RefreshErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failure from a refresh cycle, tagged with the source it came from
/// so the UI can scope its staleness banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshError {
    pub kind: RefreshErrorKind,
    pub source_id: Option<String>,
}

impl RefreshError {
    pub fn new(kind: RefreshErrorKind) -> Self {
        Self {
            kind,
            source_id: None,
        }
    }

    pub fn tagged(kind: RefreshErrorKind, source_id: impl Into<String>) -> Self {
        Self {
            kind,
            source_id: Some(source_id.into()),
        }
    }
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source_id {
            Some(source) => write!(f, "{} ({})", self.kind, source),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for RefreshError {}

/// What weather/geocoding source implementations return on failure.
///
/// The transport layer owns timeouts and socket-level retries; this type only
/// carries enough context for the classification below.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP status {status}")]
    Http { status: u16 },

    #[error("malformed payload: {0}")]
    Parsing(String),

    #[error("API key missing")]
    ApiKeyMissing,

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited")]
    RateLimited,

    #[error("location not supported")]
    InvalidLocation,

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(SourceFeature),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What location source implementations return on failure.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("background location permission denied")]
    BackgroundPermissionDenied,
    #[error("location service unavailable")]
    ServiceUnavailable,
    #[error("location request timed out")]
    Timeout,
    #[error("location error: {0}")]
    Other(String),
}

impl RefreshErrorKind {
    /// Map a raw source failure onto the taxonomy.
    pub fn classify_source(error: &SourceError) -> Self {
        match error {
            SourceError::Network(e) => Self::classify_reqwest(e),
            SourceError::Http { status } => Self::classify_status(*status),
            SourceError::Parsing(_) => Self::ParsingError,
            SourceError::ApiKeyMissing => Self::ApiKeyMissing,
            SourceError::Unauthorized => Self::ApiUnauthorized,
            SourceError::RateLimited => Self::ApiLimitReached,
            SourceError::InvalidLocation => Self::InvalidLocation,
            SourceError::UnsupportedFeature(_) => Self::UnsupportedFeature,
            SourceError::Other(_) => Self::WeatherRequestFailed,
        }
    }

    /// Map a device-position failure onto the taxonomy.
    pub fn classify_location(error: &LocationError) -> Self {
        match error {
            LocationError::PermissionDenied => Self::MissingForegroundLocationPermission,
            LocationError::BackgroundPermissionDenied => Self::MissingBackgroundLocationPermission,
            LocationError::ServiceUnavailable
            | LocationError::Timeout
            | LocationError::Other(_) => Self::LocationFailed,
        }
    }

    fn classify_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::ServerTimeout
        } else if error.is_connect() {
            Self::NetworkUnavailable
        } else if error.is_decode() {
            Self::ParsingError
        } else if let Some(status) = error.status() {
            Self::classify_status(status.as_u16())
        } else {
            Self::WeatherRequestFailed
        }
    }

    fn classify_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::ApiUnauthorized,
            409 | 429 => Self::ApiLimitReached,
            408 | 504 => Self::ServerTimeout,
            _ => Self::WeatherRequestFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            RefreshErrorKind::classify_source(&SourceError::Http { status: 401 }),
            RefreshErrorKind::ApiUnauthorized
        );
        assert_eq!(
            RefreshErrorKind::classify_source(&SourceError::Http { status: 403 }),
            RefreshErrorKind::ApiUnauthorized
        );
        assert_eq!(
            RefreshErrorKind::classify_source(&SourceError::Http { status: 429 }),
            RefreshErrorKind::ApiLimitReached
        );
        assert_eq!(
            RefreshErrorKind::classify_source(&SourceError::Http { status: 409 }),
            RefreshErrorKind::ApiLimitReached
        );
        assert_eq!(
            RefreshErrorKind::classify_source(&SourceError::Http { status: 504 }),
            RefreshErrorKind::ServerTimeout
        );
        assert_eq!(
            RefreshErrorKind::classify_source(&SourceError::Http { status: 500 }),
            RefreshErrorKind::WeatherRequestFailed
        );
    }

    #[test]
    fn test_parsing_and_key_classification() {
        assert_eq!(
            RefreshErrorKind::classify_source(&SourceError::Parsing("bad json".into())),
            RefreshErrorKind::ParsingError
        );
        assert_eq!(
            RefreshErrorKind::classify_source(&SourceError::ApiKeyMissing),
            RefreshErrorKind::ApiKeyMissing
        );
        assert_eq!(
            RefreshErrorKind::classify_source(&SourceError::UnsupportedFeature(
                SourceFeature::Pollen
            )),
            RefreshErrorKind::UnsupportedFeature
        );
    }

    #[test]
    fn test_location_classification() {
        assert_eq!(
            RefreshErrorKind::classify_location(&LocationError::PermissionDenied),
            RefreshErrorKind::MissingForegroundLocationPermission
        );
        assert_eq!(
            RefreshErrorKind::classify_location(&LocationError::Timeout),
            RefreshErrorKind::LocationFailed
        );
    }

    #[test]
    fn test_error_display_includes_source_tag() {
        let err = RefreshError::tagged(RefreshErrorKind::ServerTimeout, "beta");
        assert_eq!(err.to_string(), "server-timeout (beta)");

        let err = RefreshError::new(RefreshErrorKind::LocationFailed);
        assert_eq!(err.to_string(), "location-failed");
    }

    #[test]
    fn test_user_messages_are_non_empty() {
        let kinds = [
            RefreshErrorKind::NetworkUnavailable,
            RefreshErrorKind::ServerTimeout,
            RefreshErrorKind::ApiUnauthorized,
            RefreshErrorKind::ApiLimitReached,
            RefreshErrorKind::ApiKeyMissing,
            RefreshErrorKind::InvalidLocation,
            RefreshErrorKind::LocationFailed,
            RefreshErrorKind::MissingForegroundLocationPermission,
            RefreshErrorKind::MissingBackgroundLocationPermission,
            RefreshErrorKind::ReverseGeocodingFailed,
            RefreshErrorKind::SecondaryWeatherFailed,
            RefreshErrorKind::UnsupportedFeature,
            RefreshErrorKind::SourceNotInstalled,
            RefreshErrorKind::ParsingError,
            RefreshErrorKind::LocationSearchFailed,
            RefreshErrorKind::WeatherRequestFailed,
        ];
        for kind in kinds {
            assert!(!kind.user_message().is_empty());
        }
    }
}
