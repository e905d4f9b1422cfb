//! Combines a primary payload and the secondary feature data of one refresh
//! cycle into a single consistent forecast.
//!
//! Completion order matters: daily aggregates need hourly detail, but some
//! hourly fields (daylight, UV) need the daily aggregate that was just
//! computed, so one cycle runs hourly -> daily -> hourly -> current.
//! Already-populated fields are never overwritten, which also makes every
//! step idempotent.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;

use crate::gapfill;
use crate::types::{
    AirQuality, AirQualityPayload, Alert, Current, Daily, HalfDay, History, Hourly, Minutely,
    Normals, PollenPayload, SecondaryPayload, Temperature, WeatherPayload,
};

/// Hourly entries older than this are dropped at merge time.
const PAST_HOURLY_CUTOFF_MINUTES: i64 = 30;

/// The outcome of one fusion pass, ready to be wrapped into a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusedWeather {
    pub current: Option<Current>,
    pub daily: Vec<Daily>,
    pub hourly: Vec<Hourly>,
    pub minutely: Vec<Minutely>,
    pub alerts: Vec<Alert>,
    pub normals: Option<Normals>,
    pub yesterday: Option<History>,
}

/// Run the full fusion pipeline for one refresh cycle.
pub fn fuse(
    payload: WeatherPayload,
    secondary: SecondaryPayload,
    timezone: Tz,
    now: DateTime<Utc>,
) -> FusedWeather {
    let WeatherPayload {
        current,
        daily,
        hourly,
        minutely,
        alerts,
        normals,
        yesterday,
        air_quality,
        pollen,
    } = payload;

    // Secondary feature data wins over whatever rode along with the primary.
    let minutely = secondary.minutely.unwrap_or(minutely);
    let alerts = secondary.alerts.unwrap_or(alerts);
    let normals = secondary.normals.or(normals);
    let air_quality = secondary.air_quality.or(air_quality);
    let pollen = secondary.pollen.or(pollen);

    // Insertion order from the source is authoritative: deduplicate, never
    // re-sort.
    let mut daily = dedup_daily(daily);
    let mut hourly = dedup_hourly(hourly);

    merge_secondary_data(
        &mut daily,
        &mut hourly,
        air_quality.as_ref(),
        pollen.as_ref(),
    );

    let hourly = complete_hourly_list_from_daily_list(hourly, &daily, timezone, now);
    let daily = complete_daily_list_from_hourly_list(daily, &hourly, timezone);
    let hourly = complete_hourly_list_from_daily_list(hourly, &daily, timezone, now);
    let current = complete_current_from_today_daily_and_hourly(
        current,
        &hourly,
        &daily,
        air_quality.as_ref().and_then(|aq| aq.current.clone()),
        timezone,
        now,
    );

    tracing::debug!(
        daily = daily.len(),
        hourly = hourly.len(),
        alerts = alerts.len(),
        "fused weather payloads"
    );

    FusedWeather {
        current,
        daily,
        hourly,
        minutely,
        alerts,
        normals,
        yesterday,
    }
}

/// Merge keyed secondary data into the forecast lists, filling nulls only.
pub fn merge_secondary_data(
    daily: &mut [Daily],
    hourly: &mut [Hourly],
    air_quality: Option<&AirQualityPayload>,
    pollen: Option<&PollenPayload>,
) {
    if let Some(aq) = air_quality {
        for entry in hourly.iter_mut() {
            if entry.air_quality.is_none() {
                entry.air_quality = aq.hourly.get(&entry.time).cloned();
            }
        }
        for entry in daily.iter_mut() {
            if entry.air_quality.is_none() {
                entry.air_quality = aq.daily.get(&entry.date).cloned();
            }
        }
    }

    if let Some(pollen) = pollen {
        for entry in daily.iter_mut() {
            if entry.pollen.is_none() {
                entry.pollen = pollen.daily.get(&entry.date).cloned();
            }
        }
    }
}

/// Derive missing daily fields from the hourly forecast.
///
/// Hourly entries are attributed to calendar days through a 6-hour-shifted
/// midnight so that 00:00-05:59 counts as the previous day's night, then
/// split into day (06:00-17:59) and night (18:00-05:59) buckets.
pub fn complete_daily_list_from_hourly_list(
    daily: Vec<Daily>,
    hourly: &[Hourly],
    timezone: Tz,
) -> Vec<Daily> {
    let buckets = bucket_hourly_by_day(hourly, timezone);

    daily
        .into_iter()
        .map(|mut day| {
            if let Some(bucket) = buckets.get(&day.date) {
                day.day = complete_half_day(day.day.take(), &bucket.day, timezone, HalfDayKind::Day);
                day.night =
                    complete_half_day(day.night.take(), &bucket.night, timezone, HalfDayKind::Night);

                // Daily air quality and UV come from the full-day hourly
                // set, not the half-day buckets.
                if day.air_quality.is_none() {
                    day.air_quality = gapfill::daily_air_quality(&bucket.all);
                }
                if day.uv_index.is_none() {
                    day.uv_index = gapfill::daily_max_uv(&bucket.all);
                }
            }

            if day.hours_of_sun.is_none() {
                if let Some(sun) = &day.sun {
                    day.hours_of_sun = gapfill::hours_of_sun(sun.rise, sun.set);
                }
            }

            day
        })
        .collect()
}

/// Derive missing hourly fields from the daily forecast, dropping entries
/// more than 30 minutes in the past.
pub fn complete_hourly_list_from_daily_list(
    hourly: Vec<Hourly>,
    daily: &[Daily],
    timezone: Tz,
    now: DateTime<Utc>,
) -> Vec<Hourly> {
    let cutoff = now - Duration::minutes(PAST_HOURLY_CUTOFF_MINUTES);
    let by_date: HashMap<NaiveDate, &Daily> = daily.iter().map(|d| (d.date, d)).collect();

    hourly
        .into_iter()
        .filter(|entry| entry.time >= cutoff)
        .map(|mut entry| {
            let local_date = entry.time.with_timezone(&timezone).date_naive();
            if let Some(day) = by_date.get(&local_date) {
                if let Some(sun) = &day.sun {
                    if entry.is_daylight.is_none() {
                        if let (Some(rise), Some(set)) = (sun.rise, sun.set) {
                            entry.is_daylight = Some(rise <= entry.time && entry.time < set);
                        }
                    }
                    if entry.uv_index.is_none() {
                        entry.uv_index = gapfill::estimate_uv_index(
                            day.uv_index,
                            sun.rise.map(|t| fractional_hour(t, timezone)),
                            sun.set.map(|t| fractional_hour(t, timezone)),
                            fractional_hour(entry.time, timezone),
                        );
                    }
                }
            }
            entry
        })
        .collect()
}

/// Fill missing current-conditions fields from the forecast hour nearest to
/// `now` and from today's daily entry.
pub fn complete_current_from_today_daily_and_hourly(
    current: Option<Current>,
    hourly: &[Hourly],
    daily: &[Daily],
    air_quality_current: Option<AirQuality>,
    timezone: Tz,
    now: DateTime<Utc>,
) -> Option<Current> {
    let nearest = hourly
        .iter()
        .min_by_key(|h| (h.time - now).num_seconds().abs());

    if current.is_none() && nearest.is_none() && air_quality_current.is_none() {
        return None;
    }

    let mut current = current.unwrap_or_default();

    if let Some(hour) = nearest {
        if current.weather_text.is_none() {
            current.weather_text = hour
                .weather_text
                .clone()
                .or_else(|| hour.weather_code.map(|c| c.description().to_string()));
        }
        if current.weather_code.is_none() {
            current.weather_code = hour.weather_code;
        }
        current.temperature =
            fill_temperature(current.temperature.take(), hour.temperature.as_ref());
        if current.wind.is_none() {
            current.wind = hour.wind.clone();
        }
        if current.relative_humidity.is_none() {
            current.relative_humidity = hour.relative_humidity;
        }
        if current.dew_point.is_none() {
            current.dew_point = hour.dew_point;
        }
        if current.pressure.is_none() {
            current.pressure = hour.pressure;
        }
        if current.cloud_cover.is_none() {
            current.cloud_cover = hour.cloud_cover;
        }
        if current.visibility.is_none() {
            current.visibility = hour.visibility;
        }
        if current.air_quality.is_none() {
            current.air_quality = air_quality_current
                .clone()
                .or_else(|| hour.air_quality.clone());
        }
    } else if current.air_quality.is_none() {
        current.air_quality = air_quality_current;
    }

    // UV always prefers an explicit current value; otherwise estimate from
    // today's daily maximum at the current instant.
    if current.uv_index.is_none() {
        let today = now.with_timezone(&timezone).date_naive();
        if let Some(day) = daily.iter().find(|d| d.date == today) {
            if let Some(sun) = &day.sun {
                current.uv_index = gapfill::estimate_uv_index(
                    day.uv_index,
                    sun.rise.map(|t| fractional_hour(t, timezone)),
                    sun.set.map(|t| fractional_hour(t, timezone)),
                    fractional_hour(now, timezone),
                );
            }
        }
    }

    Some(current)
}

#[derive(Clone, Copy, PartialEq)]
enum HalfDayKind {
    Day,
    Night,
}

#[derive(Default)]
struct DayBuckets<'a> {
    day: Vec<&'a Hourly>,
    night: Vec<&'a Hourly>,
    all: Vec<&'a Hourly>,
}

fn bucket_hourly_by_day(hourly: &[Hourly], timezone: Tz) -> HashMap<NaiveDate, DayBuckets<'_>> {
    let mut buckets: HashMap<NaiveDate, DayBuckets<'_>> = HashMap::new();

    for entry in hourly {
        let local = entry.time.with_timezone(&timezone);
        // Subtract 6h before taking the date so a night is not split across
        // two days.
        let date = (local - Duration::hours(6)).date_naive();
        let bucket = buckets.entry(date).or_default();

        if (6..18).contains(&local.hour()) {
            bucket.day.push(entry);
        } else {
            bucket.night.push(entry);
        }
        bucket.all.push(entry);
    }

    buckets
}

fn complete_half_day(
    existing: Option<HalfDay>,
    bucket: &[&Hourly],
    timezone: Tz,
    kind: HalfDayKind,
) -> Option<HalfDay> {
    if bucket.is_empty() {
        return existing;
    }

    let mut half = existing.unwrap_or_default();

    // Weather text/code from the entry nearest 12:00 (day) or 00:00 (night),
    // falling back to the bucket's first entry.
    if half.weather_text.is_none() || half.weather_code.is_none() {
        let representative = bucket
            .iter()
            .min_by_key(|h| distance_to_target_minutes(h.time, timezone, kind))
            .or_else(|| bucket.first());
        if let Some(hour) = representative {
            if half.weather_text.is_none() {
                half.weather_text = hour
                    .weather_text
                    .clone()
                    .or_else(|| hour.weather_code.map(|c| c.description().to_string()));
            }
            if half.weather_code.is_none() {
                half.weather_code = hour.weather_code;
            }
        }
    }

    // Temperature: max across the day bucket, min across the night bucket.
    let needs_temperature = half
        .temperature
        .as_ref()
        .map_or(true, |t| t.temperature.is_none());
    if needs_temperature {
        let temps = bucket
            .iter()
            .filter_map(|h| h.temperature.as_ref().and_then(|t| t.temperature));
        let extreme = match kind {
            HalfDayKind::Day => temps.fold(None, |acc: Option<f64>, t| {
                Some(acc.map_or(t, |a| a.max(t)))
            }),
            HalfDayKind::Night => temps.fold(None, |acc: Option<f64>, t| {
                Some(acc.map_or(t, |a| a.min(t)))
            }),
        };
        if let Some(value) = extreme {
            let mut temperature = half.temperature.take().unwrap_or_default();
            temperature.temperature = Some(value);
            half.temperature = Some(temperature);
        }
    }

    // Precipitation totals: summed across the bucket, per sub-type.
    {
        let mut precipitation = half.precipitation.take().unwrap_or_default();
        let sum = |get: fn(&crate::types::Precipitation) -> Option<f64>| {
            sum_present(
                bucket
                    .iter()
                    .filter_map(|h| h.precipitation.as_ref().and_then(get)),
            )
        };
        if precipitation.total.is_none() {
            precipitation.total = sum(|p| p.total);
        }
        if precipitation.thunderstorm.is_none() {
            precipitation.thunderstorm = sum(|p| p.thunderstorm);
        }
        if precipitation.rain.is_none() {
            precipitation.rain = sum(|p| p.rain);
        }
        if precipitation.snow.is_none() {
            precipitation.snow = sum(|p| p.snow);
        }
        if precipitation.ice.is_none() {
            precipitation.ice = sum(|p| p.ice);
        }
        if precipitation != crate::types::Precipitation::default() {
            half.precipitation = Some(precipitation);
        }
    }

    // Precipitation probabilities: max across the bucket, per sub-type.
    {
        let mut probability = half.precipitation_probability.take().unwrap_or_default();
        let max = |get: fn(&crate::types::PrecipitationProbability) -> Option<f64>| {
            max_present(
                bucket
                    .iter()
                    .filter_map(|h| h.precipitation_probability.as_ref().and_then(get)),
            )
        };
        if probability.total.is_none() {
            probability.total = max(|p| p.total);
        }
        if probability.thunderstorm.is_none() {
            probability.thunderstorm = max(|p| p.thunderstorm);
        }
        if probability.rain.is_none() {
            probability.rain = max(|p| p.rain);
        }
        if probability.snow.is_none() {
            probability.snow = max(|p| p.snow);
        }
        if probability.ice.is_none() {
            probability.ice = max(|p| p.ice);
        }
        if probability != crate::types::PrecipitationProbability::default() {
            half.precipitation_probability = Some(probability);
        }
    }

    // Wind from the bucket's highest-speed entry.
    if half.wind.is_none() {
        half.wind = bucket
            .iter()
            .filter_map(|h| {
                h.wind
                    .as_ref()
                    .and_then(|w| w.speed.map(|s| (s, w)))
            })
            .max_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, wind)| wind.clone());
    }

    // Cloud cover as the rounded arithmetic mean.
    if half.cloud_cover.is_none() {
        let covers: Vec<i32> = bucket.iter().filter_map(|h| h.cloud_cover).collect();
        if !covers.is_empty() {
            let mean = covers.iter().map(|&c| f64::from(c)).sum::<f64>() / covers.len() as f64;
            half.cloud_cover = Some(mean.round() as i32);
        }
    }

    Some(half)
}

/// Minutes between an hourly entry and its half-day's representative instant
/// (12:00 for day halves, 00:00 for night halves), on the local clock face.
fn distance_to_target_minutes(time: DateTime<Utc>, timezone: Tz, kind: HalfDayKind) -> i64 {
    let frac = fractional_hour(time, timezone);
    let hours = match kind {
        HalfDayKind::Day => (frac - 12.0).abs(),
        HalfDayKind::Night => frac.min(24.0 - frac),
    };
    (hours * 60.0).round() as i64
}

fn fractional_hour(time: DateTime<Utc>, timezone: Tz) -> f64 {
    let local = time.with_timezone(&timezone);
    f64::from(local.hour()) + f64::from(local.minute()) / 60.0
}

fn fill_temperature(
    existing: Option<Temperature>,
    hour: Option<&Temperature>,
) -> Option<Temperature> {
    match (existing, hour) {
        (None, None) => None,
        (None, Some(hour)) => Some(hour.clone()),
        (Some(current), None) => Some(current),
        (Some(mut current), Some(hour)) => {
            if current.temperature.is_none() {
                current.temperature = hour.temperature;
            }
            if current.real_feel.is_none() {
                current.real_feel = hour.real_feel;
            }
            if current.wind_chill.is_none() {
                current.wind_chill = hour.wind_chill;
            }
            Some(current)
        }
    }
}

fn sum_present(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut any = false;
    for v in values {
        sum += v;
        any = true;
    }
    any.then_some(sum)
}

fn max_present(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.fold(None, |acc, v| match acc {
        Some(max) if max >= v => Some(max),
        _ => Some(v),
    })
}

/// Deduplicate by date, keeping the first occurrence; order is preserved.
fn dedup_daily(daily: Vec<Daily>) -> Vec<Daily> {
    let mut seen = std::collections::HashSet::new();
    daily
        .into_iter()
        .filter(|d| seen.insert(d.date))
        .collect()
}

/// Deduplicate by instant, keeping the first occurrence; order is preserved.
fn dedup_hourly(hourly: Vec<Hourly>) -> Vec<Hourly> {
    let mut seen = std::collections::HashSet::new();
    hourly
        .into_iter()
        .filter(|h| seen.insert(h.time))
        .collect()
}
