//! The 99-byte Davis LOOP packet: layout, CRC check, sentinel handling, and
//! conversion into a [`Reading`].
//!
//! Field boundaries follow the documented Davis VantagePro LOOP layout at
//! every well-known anchor (the `"LOO"` magic at 0–2, CRC at 97–98, the
//! individual single-byte/two-byte fields console firmware docs call out by
//! name). Where the day/month/year rain-and-ET block (50–62) and the
//! wetness/alarm block straddle a one-byte rounding difference between
//! firmware revisions, this module picks one concrete, internally-consistent
//! 99-byte layout and records it here rather than in `DESIGN.md` prose,
//! since the layout *is* the decision.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use weather_types::{correct_wind_dir, Reading};

pub const PACKET_LEN: usize = 99;

const MISSING_U8: u8 = 0xFF;
const MISSING_U16: u16 = 0xFFFF;
const MISSING_I16: i16 = i16::MIN; // 0x8000 reinterpreted as signed

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("expected 99-byte packet, got {0}")]
    WrongLength(usize),
    #[error("missing 'LOO' magic at bytes 0-2")]
    BadMagic,
    #[error("CRC mismatch: computed {computed:#06x}, packet says {declared:#06x}")]
    CrcMismatch { computed: u16, declared: u16 },
}

fn u16_le(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

fn i16_le(b: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([b[at], b[at + 1]])
}

/// The packet's raw wire values, before sentinel substitution or unit
/// conversion. Kept as an intermediate so tests can construct a known-good
/// packet without round-tripping through physical units.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLoopPacket {
    pub barometer_raw: u16,
    pub inside_temp_raw: i16,
    pub inside_humidity_raw: u8,
    pub outside_temp_raw: i16,
    pub wind_speed_raw: u8,
    pub wind_speed_avg_raw: u8,
    pub wind_dir_raw: u16,
    pub extra_temp_raw: [u8; 7],
    pub soil_temp_raw: [u8; 4],
    pub leaf_temp_raw: [u8; 4],
    pub outside_humidity_raw: u8,
    pub extra_humidity_raw: [u8; 7],
    pub rain_rate_raw: u16,
    pub uv_raw: u8,
    pub solar_raw: u16,
    pub storm_rain_raw: u16,
    pub storm_start_raw: u16,
    pub day_rain_raw: u16,
    pub month_rain_raw: u16,
    pub year_rain_raw: u16,
    pub day_et_raw: u16,
    pub month_et_raw: u16,
    pub year_et_raw: u16,
    pub soil_moisture_raw: [u8; 4],
    pub leaf_wetness_raw: [u8; 4],
    pub alarms_raw: [u8; 16],
    pub transmitter_battery_raw: u8,
    pub console_battery_raw: u16,
    pub forecast_icon: u8,
    pub forecast_rule: u8,
    pub sunrise_bcd: u16,
    pub sunset_bcd: u16,
    pub trend_raw: i8,
}

/// Validate CRC and magic, then parse every field out of a 99-byte buffer.
pub fn parse(buf: &[u8]) -> Result<RawLoopPacket, PacketError> {
    if buf.len() != PACKET_LEN {
        return Err(PacketError::WrongLength(buf.len()));
    }
    if &buf[0..3] != b"LOO" {
        return Err(PacketError::BadMagic);
    }
    let computed = crate::crc::crc16_ccitt(&buf[0..97]);
    let declared = u16::from_be_bytes([buf[97], buf[98]]);
    if computed != declared {
        return Err(PacketError::CrcMismatch { computed, declared });
    }

    Ok(RawLoopPacket {
        barometer_raw: u16_le(buf, 7),
        inside_temp_raw: i16_le(buf, 9),
        inside_humidity_raw: buf[11],
        outside_temp_raw: i16_le(buf, 12),
        wind_speed_raw: buf[14],
        wind_speed_avg_raw: buf[15],
        wind_dir_raw: u16_le(buf, 16),
        extra_temp_raw: buf[18..25].try_into().unwrap(),
        soil_temp_raw: buf[25..29].try_into().unwrap(),
        leaf_temp_raw: buf[29..33].try_into().unwrap(),
        outside_humidity_raw: buf[33],
        extra_humidity_raw: buf[34..41].try_into().unwrap(),
        rain_rate_raw: u16_le(buf, 41),
        uv_raw: buf[43],
        solar_raw: u16_le(buf, 44),
        storm_rain_raw: u16_le(buf, 46),
        storm_start_raw: u16_le(buf, 48),
        day_rain_raw: u16_le(buf, 50),
        month_rain_raw: u16_le(buf, 52),
        year_rain_raw: u16_le(buf, 54),
        day_et_raw: u16_le(buf, 56),
        month_et_raw: u16_le(buf, 58),
        year_et_raw: u16_le(buf, 60),
        soil_moisture_raw: buf[62..66].try_into().unwrap(),
        leaf_wetness_raw: buf[66..70].try_into().unwrap(),
        alarms_raw: buf[70..86].try_into().unwrap(),
        transmitter_battery_raw: buf[86],
        console_battery_raw: u16_le(buf, 87),
        forecast_icon: buf[89],
        forecast_rule: buf[90],
        sunrise_bcd: u16_le(buf, 91),
        sunset_bcd: u16_le(buf, 93),
        trend_raw: buf[95] as i8,
    })
}

fn u8_or_missing(raw: u8) -> Option<f64> {
    if raw == MISSING_U8 { None } else { Some(f64::from(raw)) }
}

fn u16_or_missing(raw: u16) -> Option<f64> {
    if raw == MISSING_U16 { None } else { Some(f64::from(raw)) }
}

fn i16_or_missing(raw: i16) -> Option<f64> {
    if raw == MISSING_I16 { None } else { Some(f64::from(raw)) }
}

/// Decode a Davis BCD `HHMM` time field against `date`, or `None` if the
/// field reads as all-missing (`0xFFFF`).
fn bcd_time_on(date: NaiveDate, bcd: u16) -> Option<DateTime<Utc>> {
    if bcd == MISSING_U16 {
        return None;
    }
    let hh = (bcd / 100) as u32;
    let mm = (bcd % 100) as u32;
    if hh > 23 || mm > 59 {
        return None;
    }
    date.and_hms_opt(hh, mm, 0).map(|naive| Utc.from_utc_datetime(&naive))
}

/// Decode Davis's packed storm-start date (`day + month*32 + (year-2000)*512`)
/// against an unambiguous epoch. Missing (`0xFFFF`) yields `None`.
fn packed_date(raw: u16) -> Option<DateTime<Utc>> {
    if raw == MISSING_U16 || raw == 0 {
        return None;
    }
    let day = (raw & 0x1F) as u32;
    let month = ((raw >> 5) & 0x0F) as u32;
    let year = 2000 + (raw >> 9) as i32;
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

impl RawLoopPacket {
    /// Convert raw wire values into a [`Reading`], applying unit conversions,
    /// sentinel-to-zero substitution, and the device's wind direction
    /// correction.
    pub fn into_reading(self, station_name: &str, wind_dir_correction: i32, rain_bucket_size: f64, now: DateTime<Utc>) -> Reading {
        let mut r = Reading::new(station_name, "davis", now);

        r.barometer = u16_or_missing(self.barometer_raw).unwrap_or(0.0) / 1000.0;
        r.inside_temperature = i16_or_missing(self.inside_temp_raw).unwrap_or(0.0) / 10.0;
        r.inside_humidity = u8_or_missing(self.inside_humidity_raw).unwrap_or(0.0);
        r.outside_temperature = i16_or_missing(self.outside_temp_raw).unwrap_or(0.0) / 10.0;
        r.wind_speed = u8_or_missing(self.wind_speed_raw).unwrap_or(0.0);
        r.wind_speed_10min_avg = u8_or_missing(self.wind_speed_avg_raw).unwrap_or(0.0);

        let raw_dir = u16_or_missing(self.wind_dir_raw).unwrap_or(0.0);
        r.wind_dir = correct_wind_dir(raw_dir, wind_dir_correction);

        for (i, &raw) in self.extra_temp_raw.iter().enumerate() {
            r.extra_temperature[i] = u8_or_missing(raw).map(|v| v - 90.0).unwrap_or(0.0);
        }
        for (i, &raw) in self.soil_temp_raw.iter().enumerate() {
            r.soil_temperature[i] = u8_or_missing(raw).map(|v| v - 90.0).unwrap_or(0.0);
        }
        for (i, &raw) in self.leaf_temp_raw.iter().enumerate() {
            r.leaf_temperature[i] = u8_or_missing(raw).map(|v| v - 90.0).unwrap_or(0.0);
        }
        r.outside_humidity = u8_or_missing(self.outside_humidity_raw).unwrap_or(0.0);
        for (i, &raw) in self.extra_humidity_raw.iter().enumerate() {
            r.extra_humidity[i] = u8_or_missing(raw).unwrap_or(0.0);
        }

        r.rain_rate = u16_or_missing(self.rain_rate_raw).unwrap_or(0.0) * rain_bucket_size;
        r.uv_index = u8_or_missing(self.uv_raw).unwrap_or(0.0) / 10.0;
        r.solar_watts = u16_or_missing(self.solar_raw).unwrap_or(0.0);
        r.rain_storm = u16_or_missing(self.storm_rain_raw).unwrap_or(0.0) * rain_bucket_size;
        r.storm_start = packed_date(self.storm_start_raw);

        r.rain_day = u16_or_missing(self.day_rain_raw).unwrap_or(0.0) * rain_bucket_size;
        r.rain_month = u16_or_missing(self.month_rain_raw).unwrap_or(0.0) * rain_bucket_size;
        r.rain_year = u16_or_missing(self.year_rain_raw).unwrap_or(0.0) * rain_bucket_size;
        r.evapotranspiration_day = u16_or_missing(self.day_et_raw).unwrap_or(0.0) / 1000.0;
        r.evapotranspiration_month = u16_or_missing(self.month_et_raw).unwrap_or(0.0) / 1000.0;
        r.evapotranspiration_year = u16_or_missing(self.year_et_raw).unwrap_or(0.0) / 1000.0;

        for (i, &raw) in self.soil_moisture_raw.iter().enumerate() {
            r.soil_moisture[i] = u8_or_missing(raw).unwrap_or(0.0);
        }
        for (i, &raw) in self.leaf_wetness_raw.iter().enumerate() {
            r.leaf_wetness[i] = u8_or_missing(raw).unwrap_or(0.0);
        }

        for (i, &raw) in self.alarms_raw.iter().enumerate() {
            r.alarms[i] = i32::from(raw);
        }
        r.battery_status[0] = i32::from(self.transmitter_battery_raw);
        // Console battery voltage: spec's decode formula, raw*300/512/100.
        r.reserved_float[0] = f64::from(self.console_battery_raw) * 300.0 / 512.0 / 100.0;
        r.reserved_float[1] = f64::from(self.forecast_icon);
        r.reserved_float[2] = f64::from(self.forecast_rule);
        r.reserved_float[3] = f64::from(self.trend_raw);

        let today = now.date_naive();
        r.sunrise = bcd_time_on(today, self.sunrise_bcd);
        r.sunset = bcd_time_on(today, self.sunset_bcd);

        r
    }
}
