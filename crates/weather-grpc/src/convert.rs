//! `Reading` ⇄ `WeatherReading` protobuf conversion.
//!
//! Round-tripping a `Reading` through this encoding and back yields an
//! equivalent `Reading` up to floating-point encoding. An optional nested
//! instant with no value is carried as millisecond `0`, the same
//! absent-is-zero convention `weather-types`
//! already uses for scalar sensors.

use chrono::{DateTime, TimeZone, Utc};
use weather_types::Reading;

use crate::proto;

fn millis_of(instant: Option<DateTime<Utc>>) -> i64 {
    instant.map_or(0, |t| t.timestamp_millis())
}

fn instant_of(millis: i64) -> Option<DateTime<Utc>> {
    if millis == 0 {
        None
    } else {
        Utc.timestamp_millis_opt(millis).single()
    }
}

impl From<&Reading> for proto::WeatherReading {
    fn from(r: &Reading) -> Self {
        proto::WeatherReading {
            timestamp_millis: r.timestamp.timestamp_millis(),
            station_name: r.station_name.clone(),
            station_type: r.station_type.clone(),
            outside_temperature: r.outside_temperature,
            inside_temperature: r.inside_temperature,
            extra_temperature: r.extra_temperature.to_vec(),
            soil_temperature: r.soil_temperature.to_vec(),
            leaf_temperature: r.leaf_temperature.to_vec(),
            outside_humidity: r.outside_humidity,
            inside_humidity: r.inside_humidity,
            extra_humidity: r.extra_humidity.to_vec(),
            wind_speed: r.wind_speed,
            wind_speed_10min_avg: r.wind_speed_10min_avg,
            wind_dir: r.wind_dir,
            wind_chill: r.wind_chill,
            heat_index: r.heat_index,
            wind_gust: r.wind_gust,
            barometer: r.barometer,
            rain_rate: r.rain_rate,
            rain_incremental: r.rain_incremental,
            rain_storm: r.rain_storm,
            rain_day: r.rain_day,
            rain_month: r.rain_month,
            rain_year: r.rain_year,
            solar_watts: r.solar_watts,
            potential_solar_watts: r.potential_solar_watts,
            solar_joules: r.solar_joules,
            uv_index: r.uv_index,
            radiation: r.radiation,
            evapotranspiration_day: r.evapotranspiration_day,
            evapotranspiration_month: r.evapotranspiration_month,
            evapotranspiration_year: r.evapotranspiration_year,
            soil_moisture: r.soil_moisture.to_vec(),
            leaf_wetness: r.leaf_wetness.to_vec(),
            snow_distance: r.snow_distance,
            snow_depth: r.snow_depth,
            pm25: r.pm25,
            pm10: r.pm10,
            co2: r.co2,
            lightning_count: r.lightning_count,
            lightning_distance: r.lightning_distance,
            reserved_float: r.reserved_float.to_vec(),
            reserved_string: r.reserved_string.to_vec(),
            alarms: r.alarms.to_vec(),
            battery_status: r.battery_status.to_vec(),
            storm_start_millis: millis_of(r.storm_start),
            sunrise_millis: millis_of(r.sunrise),
            sunset_millis: millis_of(r.sunset),
            // `Reading` carries no station_id of its own; callers that have
            // a session to attribute this reading to (`GrpcClientSink`) set
            // it on the returned value.
            station_id: String::new(),
        }
    }
}

fn fixed_array<const N: usize>(v: &[f64]) -> [f64; N] {
    let mut out = [0.0; N];
    for (slot, value) in out.iter_mut().zip(v.iter()) {
        *slot = *value;
    }
    out
}

fn fixed_i32_array<const N: usize>(v: &[i32]) -> [i32; N] {
    let mut out = [0; N];
    for (slot, value) in out.iter_mut().zip(v.iter()) {
        *slot = *value;
    }
    out
}

fn fixed_string_array(v: &[String]) -> [String; 10] {
    let mut out: [String; 10] = Default::default();
    for (slot, value) in out.iter_mut().zip(v.iter()) {
        *slot = value.clone();
    }
    out
}

impl From<&proto::WeatherReading> for Reading {
    fn from(p: &proto::WeatherReading) -> Self {
        let timestamp = Utc.timestamp_millis_opt(p.timestamp_millis).single().unwrap_or_else(Utc::now);
        Reading {
            timestamp,
            station_name: p.station_name.clone(),
            station_type: p.station_type.clone(),
            outside_temperature: p.outside_temperature,
            inside_temperature: p.inside_temperature,
            extra_temperature: fixed_array(&p.extra_temperature),
            soil_temperature: fixed_array(&p.soil_temperature),
            leaf_temperature: fixed_array(&p.leaf_temperature),
            outside_humidity: p.outside_humidity,
            inside_humidity: p.inside_humidity,
            extra_humidity: fixed_array(&p.extra_humidity),
            wind_speed: p.wind_speed,
            wind_speed_10min_avg: p.wind_speed_10min_avg,
            wind_dir: p.wind_dir,
            wind_chill: p.wind_chill,
            heat_index: p.heat_index,
            wind_gust: p.wind_gust,
            barometer: p.barometer,
            rain_rate: p.rain_rate,
            rain_incremental: p.rain_incremental,
            rain_storm: p.rain_storm,
            rain_day: p.rain_day,
            rain_month: p.rain_month,
            rain_year: p.rain_year,
            solar_watts: p.solar_watts,
            potential_solar_watts: p.potential_solar_watts,
            solar_joules: p.solar_joules,
            uv_index: p.uv_index,
            radiation: p.radiation,
            evapotranspiration_day: p.evapotranspiration_day,
            evapotranspiration_month: p.evapotranspiration_month,
            evapotranspiration_year: p.evapotranspiration_year,
            soil_moisture: fixed_array(&p.soil_moisture),
            leaf_wetness: fixed_array(&p.leaf_wetness),
            snow_distance: p.snow_distance,
            snow_depth: p.snow_depth,
            pm25: p.pm25,
            pm10: p.pm10,
            co2: p.co2,
            lightning_count: p.lightning_count,
            lightning_distance: p.lightning_distance,
            reserved_float: fixed_array(&p.reserved_float),
            reserved_string: fixed_string_array(&p.reserved_string),
            alarms: fixed_i32_array(&p.alarms),
            battery_status: fixed_i32_array(&p.battery_status),
            storm_start: instant_of(p.storm_start_millis),
            sunrise: instant_of(p.sunrise_millis),
            sunset: instant_of(p.sunset_millis),
        }
    }
}
