//! Query-string parsing for the Ambient-HTTP protocol.
//!
//! The wire format is a flat set of `key=value` pairs; ~120 keys are
//! recognized across the real protocol's history. This module implements
//! the commonly-deployed core (temperature/humidity/wind/barometer/rain/
//! solar/soil/leaf/extra-sensor/air-quality families) and ignores anything
//! else.

use std::collections::HashMap;

use weather_types::Reading;

/// Percent-decode a query-string component. Hand-rolled rather than pulling
/// in a URL crate, in keeping with the hand-rolled request parsing this
/// ingester is built on.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(value) = u8::from_str_radix(&input[i + 1..i + 3], 16) {
                    out.push(value);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse a `GET` request's query string into a key → value map. Keys are
/// lowercased to make matching case-insensitive, as field names vary in
/// casing across real client implementations.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((key.to_ascii_lowercase(), percent_decode(value)))
        })
        .collect()
}

fn parsed<T: std::str::FromStr>(fields: &HashMap<String, String>, key: &str) -> Option<T> {
    fields.get(key).and_then(|v| v.parse().ok())
}

fn set_indexed(slot: &mut [f64], index: usize, value: f64) {
    if let Some(entry) = slot.get_mut(index) {
        *entry = value;
    }
}

/// Apply every recognized sensor key in `fields` onto `reading`.
/// `totalrainin`, if present, is handled by the caller (it needs
/// per-station tracking state this function doesn't own) — see
/// [`crate::rain_tracker::RainTracker`].
pub fn apply_fields(reading: &mut Reading, fields: &HashMap<String, String>) {
    if let Some(v) = parsed(fields, "tempf") {
        reading.outside_temperature = v;
    }
    if let Some(v) = parsed(fields, "indoortempf") {
        reading.inside_temperature = v;
    }
    if let Some(v) = parsed(fields, "humidity") {
        reading.outside_humidity = v;
    }
    if let Some(v) = parsed(fields, "indoorhumidity") {
        reading.inside_humidity = v;
    }
    if let Some(v) = parsed(fields, "winddir") {
        reading.wind_dir = v;
    }
    if let Some(v) = parsed(fields, "windspeedmph") {
        reading.wind_speed = v;
    }
    if let Some(v) = parsed(fields, "windspdmph_avg10m") {
        reading.wind_speed_10min_avg = v;
    }
    if let Some(v) = parsed(fields, "windgustmph") {
        reading.wind_gust = v;
    }
    if let Some(v) = parsed(fields, "baromin") {
        reading.barometer = v;
    }
    if let Some(v) = parsed(fields, "rainin") {
        reading.rain_rate = v;
    }
    if let Some(v) = parsed(fields, "dailyrainin") {
        reading.rain_day = v;
    }
    if let Some(v) = parsed(fields, "monthlyrainin") {
        reading.rain_month = v;
    }
    if let Some(v) = parsed(fields, "yearlyrainin") {
        reading.rain_year = v;
    }
    if let Some(v) = parsed(fields, "solarradiation") {
        reading.solar_watts = v;
    }
    if let Some(v) = parsed(fields, "uv") {
        reading.uv_index = v;
    }
    if let Some(v) = parsed(fields, "pm25") {
        reading.pm25 = v;
    }
    if let Some(v) = parsed(fields, "pm10") {
        reading.pm10 = v;
    }
    if let Some(v) = parsed(fields, "co2") {
        reading.co2 = v;
    }
    if let Some(v) = parsed(fields, "lightning_day") {
        reading.lightning_count = v;
    }
    if let Some(v) = parsed(fields, "lightning_distance") {
        reading.lightning_distance = v;
    }

    for i in 1..=7u8 {
        if let Some(v) = parsed::<f64>(fields, &format!("extratemp{i}")) {
            set_indexed(&mut reading.extra_temperature, (i - 1) as usize, v);
        }
        if let Some(v) = parsed::<f64>(fields, &format!("extrahumidity{i}")) {
            set_indexed(&mut reading.extra_humidity, (i - 1) as usize, v);
        }
    }
    for i in 1..=4u8 {
        let soil_key = if i == 1 { "soiltempf".to_owned() } else { format!("soiltemp{i}f") };
        if let Some(v) = parsed::<f64>(fields, &soil_key) {
            set_indexed(&mut reading.soil_temperature, (i - 1) as usize, v);
        }
        let moisture_key = if i == 1 { "soilmoisture".to_owned() } else { format!("soilmoisture{i}") };
        if let Some(v) = parsed::<f64>(fields, &moisture_key) {
            set_indexed(&mut reading.soil_moisture, (i - 1) as usize, v);
        }
        if let Some(v) = parsed::<f64>(fields, &format!("leafwetness{i}")) {
            set_indexed(&mut reading.leaf_wetness, (i - 1) as usize, v);
        }
        let leaf_temp_key = if i == 1 { "leaftempf".to_owned() } else { format!("leaftemp{i}f") };
        if let Some(v) = parsed::<f64>(fields, &leaf_temp_key) {
            set_indexed(&mut reading.leaf_temperature, (i - 1) as usize, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn parse_query_decodes_percent_and_plus_escapes() {
        let fields = parse_query("ID=my%20station&action=updateraw&PASSWORD=a+b");
        assert_eq!(fields.get("id").unwrap(), "my station");
        assert_eq!(fields.get("password").unwrap(), "a b");
    }

    #[test]
    fn apply_fields_maps_core_sensors() {
        let fields = parse_query("tempf=72.5&humidity=45&winddir=180&baromin=30.01");
        let mut r = Reading::new("k1", "ambient-http", Utc::now());
        apply_fields(&mut r, &fields);
        assert!((r.outside_temperature - 72.5).abs() < 1e-9);
        assert!((r.outside_humidity - 45.0).abs() < 1e-9);
        assert!((r.wind_dir - 180.0).abs() < 1e-9);
        assert!((r.barometer - 30.01).abs() < 1e-9);
    }

    #[test]
    fn apply_fields_ignores_unrecognized_keys() {
        let fields = parse_query("someFutureSensor=99");
        let mut r = Reading::new("k1", "ambient-http", Utc::now());
        apply_fields(&mut r, &fields);
        assert_eq!(r, Reading::new("k1", "ambient-http", r.timestamp));
    }

    #[test]
    fn apply_fields_maps_indexed_extra_sensors() {
        let fields = parse_query("extratemp1=50&extratemp3=55&soiltemp2f=60");
        let mut r = Reading::new("k1", "ambient-http", Utc::now());
        apply_fields(&mut r, &fields);
        assert!((r.extra_temperature[0] - 50.0).abs() < 1e-9);
        assert!((r.extra_temperature[2] - 55.0).abs() < 1e-9);
        assert!((r.soil_temperature[1] - 60.0).abs() < 1e-9);
    }
}
