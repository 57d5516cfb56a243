//! Compressed positional weather report encoding, 7-bit printable
//! throughout.

use weather_types::{GeoLocation, Reading};

const MPH_PER_KNOT: f64 = 1.0 / 0.868976;

/// Encode a signed 4-digit Base91 field (printable ASCII 33-123).
fn base91_4(mut value: i64) -> [u8; 4] {
    if value < 0 {
        value = 0;
    }
    let mut out = [0u8; 4];
    for i in (0..4).rev() {
        out[i] = (value % 91) as u8 + 33;
        value /= 91;
    }
    out
}

/// `380926 * (90 - lat)`, the standard APRS compressed-latitude formula.
fn encode_latitude(lat: f64) -> [u8; 4] {
    base91_4((380_926.0 * (90.0 - lat)).round() as i64)
}

/// `190463 * (180 + lon)`, the standard APRS compressed-longitude formula.
fn encode_longitude(lon: f64) -> [u8; 4] {
    base91_4((190_463.0 * (180.0 + lon)).round() as i64)
}

/// `(dir/4)+33`; direction is taken as 0 when speed is 0, since a calm wind
/// has no meaningful heading.
fn wind_course_byte(wind_dir: f64, wind_speed_mph: f64) -> u8 {
    let effective_dir = if wind_speed_mph <= 0.0 { 0.0 } else { wind_dir };
    ((effective_dir / 4.0).round() as i64).rem_euclid(91) as u8 + 33
}

/// `round(log(knots)/log(1.08))+33`, clamped so the digit itself never
/// exceeds 90 (APRS's compressed-speed range).
fn wind_speed_byte(wind_speed_mph: f64) -> u8 {
    if wind_speed_mph <= 0.0 {
        return 33;
    }
    let knots = wind_speed_mph * MPH_PER_KNOT;
    let digit = (knots.ln() / 1.08f64.ln()).round();
    let clamped = digit.clamp(0.0, 90.0) as u8;
    clamped + 33
}

fn temperature_field(outside_temperature_f: f64) -> String {
    format!("t{:03}", outside_temperature_f.round().clamp(-99.0, 999.0) as i64)
}

/// 24-hour rain, hundredths of an inch (`P<nnn>`).
fn rain_field(rain_day_in: f64) -> String {
    format!("P{:03}", (rain_day_in * 100.0).round().clamp(0.0, 999.0) as i64)
}

/// Humidity: 100% is encoded as the literal digits "00", APRS's convention
/// for a two-digit field that can't otherwise represent three digits.
fn humidity_field(humidity_pct: f64) -> String {
    let rounded = humidity_pct.round().clamp(0.0, 100.0) as i64;
    let encoded = if rounded >= 100 { 0 } else { rounded };
    format!("h{encoded:02}")
}

/// Barometer, tenths of a millibar (`b<nnnnn>`). `Reading::barometer` is
/// inHg; converted via the standard 33.8639 mbar/inHg factor.
fn barometer_field(barometer_inhg: f64) -> String {
    let mbar = barometer_inhg * 33.8639;
    format!("b{:05}", (mbar * 10.0).round().clamp(0.0, 99_999.0) as i64)
}

/// Build one complete APRS-IS weather report packet for `callsign` at
/// `location`, reporting `reading`.
///
/// Format: `<callsign>>APRS,TCPIP*:!<lat4><lon4>_<course><speed><compression-type>t###P###h##b#####`
/// — position-without-timestamp (`!`), compressed lat/lon, the weather-station
/// symbol (`_`), compressed course/speed, then the ASCII weather fields.
pub fn build_weather_report(callsign: &str, ssid: Option<u8>, location: &GeoLocation, reading: &Reading) -> String {
    let station = match ssid {
        Some(id) => format!("{callsign}-{id}"),
        None => callsign.to_owned(),
    };

    let lat = encode_latitude(location.lat);
    let lon = encode_longitude(location.lon);
    let course = wind_course_byte(reading.wind_dir, reading.wind_speed);
    let speed = wind_speed_byte(reading.wind_speed);
    // Compression-type byte: GPS fix, no additional bits set; `!` (0x21) is
    // the conventional "no flags" value.
    const COMPRESSION_TYPE: u8 = b'!';

    let mut info = String::with_capacity(40);
    info.push('!');
    info.push('/');
    info.push_str(std::str::from_utf8(&lat).unwrap());
    info.push_str(std::str::from_utf8(&lon).unwrap());
    info.push('_');
    info.push(course as char);
    info.push(speed as char);
    info.push(COMPRESSION_TYPE as char);
    info.push_str(&temperature_field(reading.outside_temperature));
    info.push_str(&rain_field(reading.rain_day));
    info.push_str(&humidity_field(reading.outside_humidity));
    info.push_str(&barometer_field(reading.barometer));

    format!("{station}>APRS,TCPIP*:{info}\r\n")
}
