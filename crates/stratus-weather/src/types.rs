use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A weather feature that can be assigned to a source independently of the
/// main forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFeature {
    Main,
    AirQuality,
    Pollen,
    Minutely,
    Alerts,
    Normals,
}

impl SourceFeature {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFeature::Main => "main",
            SourceFeature::AirQuality => "air_quality",
            SourceFeature::Pollen => "pollen",
            SourceFeature::Minutely => "minutely",
            SourceFeature::Alerts => "alerts",
            SourceFeature::Normals => "normals",
        }
    }

    /// The secondary features, i.e. everything except the main forecast.
    pub const fn secondary() -> &'static [SourceFeature] {
        &[
            SourceFeature::AirQuality,
            SourceFeature::Pollen,
            SourceFeature::Minutely,
            SourceFeature::Alerts,
            SourceFeature::Normals,
        ]
    }
}

impl std::fmt::Display for SourceFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weather condition categories shared by all sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCode {
    #[default]
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    Hail,
    Thunderstorm,
    Wind,
}

impl WeatherCode {
    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::Hail => "Hail",
            Self::Thunderstorm => "Thunderstorm",
            Self::Wind => "Windy",
        }
    }
}

/// A saved place, with its per-feature source assignment and the cached
/// weather snapshot from the last successful refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: Tz,

    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,

    /// Id of the source supplying the main forecast.
    pub weather_source: String,
    /// Per-feature source overrides; `None` means "use the primary source".
    pub air_quality_source: Option<String>,
    pub pollen_source: Option<String>,
    pub minutely_source: Option<String>,
    pub alert_source: Option<String>,
    pub normals_source: Option<String>,

    /// Whether this location tracks the device position.
    pub current_position: bool,
    /// Set when administrative names need to be re-resolved (e.g. after the
    /// app language changed).
    pub needs_geocode_refresh: bool,

    pub weather: Option<Weather>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, timezone: Tz, weather_source: impl Into<String>) -> Self {
        Self {
            latitude,
            longitude,
            timezone,
            country: None,
            province: None,
            city: None,
            district: None,
            weather_source: weather_source.into(),
            air_quality_source: None,
            pollen_source: None,
            minutely_source: None,
            alert_source: None,
            normals_source: None,
            current_position: false,
            needs_geocode_refresh: false,
            weather: None,
        }
    }

    /// The source id configured for a secondary feature, if it differs from
    /// the primary weather source. `None` means the feature rides on the
    /// primary fetch.
    pub fn secondary_source_for(&self, feature: SourceFeature) -> Option<&str> {
        let configured = match feature {
            SourceFeature::Main => None,
            SourceFeature::AirQuality => self.air_quality_source.as_deref(),
            SourceFeature::Pollen => self.pollen_source.as_deref(),
            SourceFeature::Minutely => self.minutely_source.as_deref(),
            SourceFeature::Alerts => self.alert_source.as_deref(),
            SourceFeature::Normals => self.normals_source.as_deref(),
        };
        configured.filter(|id| !id.is_empty() && *id != self.weather_source)
    }

    /// Take administrative names and timezone from a reverse-geocoding
    /// result, keeping coordinates, source assignment, flags and the cached
    /// weather snapshot.
    pub fn with_geocoded(mut self, geocoded: &Location) -> Self {
        self.timezone = geocoded.timezone;
        self.country = geocoded.country.clone();
        self.province = geocoded.province.clone();
        self.city = geocoded.city.clone();
        self.district = geocoded.district.clone();
        self
    }
}

/// Per-feature update timestamps plus the overall refresh timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Base {
    pub refresh_time: Option<DateTime<Utc>>,
    pub main_update_time: Option<DateTime<Utc>>,
    pub air_quality_update_time: Option<DateTime<Utc>>,
    pub pollen_update_time: Option<DateTime<Utc>>,
    pub minutely_update_time: Option<DateTime<Utc>>,
    pub alerts_update_time: Option<DateTime<Utc>>,
    pub normals_update_time: Option<DateTime<Utc>>,
}

impl Base {
    pub fn update_time(&self, feature: SourceFeature) -> Option<DateTime<Utc>> {
        match feature {
            SourceFeature::Main => self.main_update_time,
            SourceFeature::AirQuality => self.air_quality_update_time,
            SourceFeature::Pollen => self.pollen_update_time,
            SourceFeature::Minutely => self.minutely_update_time,
            SourceFeature::Alerts => self.alerts_update_time,
            SourceFeature::Normals => self.normals_update_time,
        }
    }

    pub fn set_update_time(&mut self, feature: SourceFeature, time: Option<DateTime<Utc>>) {
        match feature {
            SourceFeature::Main => self.main_update_time = time,
            SourceFeature::AirQuality => self.air_quality_update_time = time,
            SourceFeature::Pollen => self.pollen_update_time = time,
            SourceFeature::Minutely => self.minutely_update_time = time,
            SourceFeature::Alerts => self.alerts_update_time = time,
            SourceFeature::Normals => self.normals_update_time = time,
        }
    }
}

/// Temperature readings; all fields optional, absence means "not provided".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub temperature: Option<f64>,
    pub real_feel: Option<f64>,
    pub wind_chill: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    /// Direction the wind comes from, in degrees.
    pub degree: Option<f64>,
    /// Speed in m/s.
    pub speed: Option<f64>,
    pub gusts: Option<f64>,
}

/// Precipitation amounts in millimeters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Precipitation {
    pub total: Option<f64>,
    pub thunderstorm: Option<f64>,
    pub rain: Option<f64>,
    pub snow: Option<f64>,
    pub ice: Option<f64>,
}

/// Precipitation probabilities in percent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrecipitationProbability {
    pub total: Option<f64>,
    pub thunderstorm: Option<f64>,
    pub rain: Option<f64>,
    pub snow: Option<f64>,
    pub ice: Option<f64>,
}

/// Pollutant concentrations in µg/m³.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirQuality {
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub so2: Option<f64>,
    pub no2: Option<f64>,
    pub o3: Option<f64>,
    pub co: Option<f64>,
}

impl AirQuality {
    /// True if no pollutant carries a reading.
    pub fn is_empty(&self) -> bool {
        self.pm25.is_none()
            && self.pm10.is_none()
            && self.so2.is_none()
            && self.no2.is_none()
            && self.o3.is_none()
            && self.co.is_none()
    }
}

/// Pollen indices per allergen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pollen {
    pub grass: Option<i32>,
    pub tree: Option<i32>,
    pub ragweed: Option<i32>,
    pub mold: Option<i32>,
}

/// Sunrise/sunset or moonrise/moonset instants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Astro {
    pub rise: Option<DateTime<Utc>>,
    pub set: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoonPhase {
    /// Phase angle in degrees, one of 45/90/135/180/225/270/315/360.
    pub angle: Option<i32>,
    pub text: Option<String>,
}

/// Current conditions snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Current {
    pub weather_text: Option<String>,
    pub weather_code: Option<WeatherCode>,
    pub temperature: Option<Temperature>,
    pub wind: Option<Wind>,
    pub uv_index: Option<f64>,
    pub air_quality: Option<AirQuality>,
    pub relative_humidity: Option<f64>,
    pub dew_point: Option<f64>,
    /// Sea-level pressure in hPa.
    pub pressure: Option<f64>,
    pub cloud_cover: Option<i32>,
    /// Visibility in meters.
    pub visibility: Option<f64>,
}

/// Day (06:00–17:59) or night (18:00–05:59) half of a forecast day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HalfDay {
    pub weather_text: Option<String>,
    pub weather_code: Option<WeatherCode>,
    pub temperature: Option<Temperature>,
    pub precipitation: Option<Precipitation>,
    pub precipitation_probability: Option<PrecipitationProbability>,
    pub wind: Option<Wind>,
    pub cloud_cover: Option<i32>,
}

/// One forecast day, anchored at local midnight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Daily {
    pub date: NaiveDate,
    pub day: Option<HalfDay>,
    pub night: Option<HalfDay>,
    pub sun: Option<Astro>,
    pub moon: Option<Astro>,
    pub moon_phase: Option<MoonPhase>,
    pub air_quality: Option<AirQuality>,
    pub pollen: Option<Pollen>,
    pub uv_index: Option<f64>,
    pub hours_of_sun: Option<f64>,
}

impl Daily {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            ..Self::default()
        }
    }
}

/// One forecast hour, anchored at the top of the hour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hourly {
    pub time: DateTime<Utc>,
    pub is_daylight: Option<bool>,
    pub weather_text: Option<String>,
    pub weather_code: Option<WeatherCode>,
    pub temperature: Option<Temperature>,
    pub precipitation: Option<Precipitation>,
    pub precipitation_probability: Option<PrecipitationProbability>,
    pub wind: Option<Wind>,
    pub air_quality: Option<AirQuality>,
    pub uv_index: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub dew_point: Option<f64>,
    pub pressure: Option<f64>,
    pub cloud_cover: Option<i32>,
    pub visibility: Option<f64>,
}

impl Hourly {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time,
            ..Self::default()
        }
    }
}

/// Minute-by-minute precipitation forecast entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Minutely {
    pub time: DateTime<Utc>,
    /// Interval this entry covers, in minutes.
    pub minute_interval: i64,
    /// Precipitation intensity in mm/h.
    pub precipitation_intensity: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub headline: Option<String>,
    pub description: Option<String>,
    pub severity: Option<i32>,
}

impl Alert {
    /// Whether the alert is in effect at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        let started = self.start_time.map_or(true, |start| start <= now);
        let not_ended = self.end_time.map_or(true, |end| end > now);
        started && not_ended
    }
}

/// Climate normals for one calendar month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Normals {
    pub month: Option<u32>,
    pub daytime_temperature: Option<f64>,
    pub nighttime_temperature: Option<f64>,
}

/// Observed temperatures from the previous day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub date: Option<NaiveDate>,
    pub daytime_temperature: Option<f64>,
    pub nighttime_temperature: Option<f64>,
}

/// A complete weather snapshot for one location.
///
/// Created fresh on the first successful fetch and never replaced wholesale
/// afterwards: each refresh cycle produces a new snapshot inheriting
/// unrefreshed features verbatim from the previous one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub base: Base,
    pub current: Option<Current>,
    pub daily: Vec<Daily>,
    pub hourly: Vec<Hourly>,
    pub minutely: Vec<Minutely>,
    pub alerts: Vec<Alert>,
    pub normals: Option<Normals>,
    pub yesterday: Option<History>,
}

impl Weather {
    /// Whether precipitation is falling right now according to the minutely
    /// forecast. Feeds the shortened minutely TTL.
    pub fn is_precipitating(&self, now: DateTime<Utc>) -> bool {
        self.minutely.iter().any(|entry| {
            let end = entry.time + Duration::minutes(entry.minute_interval);
            entry.time <= now
                && now < end
                && entry.precipitation_intensity.is_some_and(|i| i > 0.0)
        })
    }

    /// Whether any alert is currently in effect. Feeds the shortened alert
    /// TTL.
    pub fn has_active_alert(&self, now: DateTime<Utc>) -> bool {
        self.alerts.iter().any(|alert| alert.is_active(now))
    }

    /// Drop alerts that have already ended. Persisted alerts must have no
    /// end date or an end date strictly in the future.
    pub fn prune_expired_alerts(&mut self, now: DateTime<Utc>) {
        self.alerts
            .retain(|alert| alert.end_time.map_or(true, |end| end > now));
    }

    /// Extract the cached air-quality data as a per-cycle payload, for
    /// backfilling a skipped secondary fetch.
    pub fn air_quality_payload(&self) -> AirQualityPayload {
        AirQualityPayload {
            current: self.current.as_ref().and_then(|c| c.air_quality.clone()),
            hourly: self
                .hourly
                .iter()
                .filter_map(|h| h.air_quality.clone().map(|aq| (h.time, aq)))
                .collect(),
            daily: self
                .daily
                .iter()
                .filter_map(|d| d.air_quality.clone().map(|aq| (d.date, aq)))
                .collect(),
        }
    }

    /// Extract the cached pollen data as a per-cycle payload.
    pub fn pollen_payload(&self) -> PollenPayload {
        PollenPayload {
            daily: self
                .daily
                .iter()
                .filter_map(|d| d.pollen.clone().map(|p| (d.date, p)))
                .collect(),
        }
    }

    /// Reinterpret the cached snapshot as a primary fetch result, used when
    /// the primary fetch is skipped (still fresh) or failed.
    pub fn to_payload(&self) -> WeatherPayload {
        WeatherPayload {
            current: self.current.clone(),
            daily: self.daily.clone(),
            hourly: self.hourly.clone(),
            minutely: self.minutely.clone(),
            alerts: self.alerts.clone(),
            normals: self.normals.clone(),
            yesterday: self.yesterday.clone(),
            air_quality: None,
            pollen: None,
        }
    }
}

/// What a primary source returns. Fields may be omitted at will; absence
/// means "not provided", never "zero".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherPayload {
    pub current: Option<Current>,
    pub daily: Vec<Daily>,
    pub hourly: Vec<Hourly>,
    pub minutely: Vec<Minutely>,
    pub alerts: Vec<Alert>,
    pub normals: Option<Normals>,
    pub yesterday: Option<History>,
    /// Air-quality data keyed by instant/day, merged into the hourly and
    /// daily lists by the fusion engine.
    pub air_quality: Option<AirQualityPayload>,
    pub pollen: Option<PollenPayload>,
}

/// Air-quality data keyed by instant and day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirQualityPayload {
    pub current: Option<AirQuality>,
    pub hourly: BTreeMap<DateTime<Utc>, AirQuality>,
    pub daily: BTreeMap<NaiveDate, AirQuality>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollenPayload {
    pub daily: BTreeMap<NaiveDate, Pollen>,
}

/// The secondary features fetched (or backfilled) during one refresh cycle.
/// `None` means the feature was not fetched this cycle and the previous
/// cached data applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecondaryPayload {
    pub air_quality: Option<AirQualityPayload>,
    pub pollen: Option<PollenPayload>,
    pub minutely: Option<Vec<Minutely>>,
    pub alerts: Option<Vec<Alert>>,
    pub normals: Option<Normals>,
}
