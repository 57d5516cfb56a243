//! ASCE clear-sky solar potential, used when a device's geographic location
//! is configured. This is the independent clear-sky ceiling, not the
//! measured solar sensor reading; it exists to sanity-check that reading.

use chrono::{DateTime, Datelike, Timelike, Utc};
use weather_types::GeoLocation;

const SOLAR_CONSTANT: f64 = 1367.0; // W/m^2, extraterrestrial solar irradiance

/// ASCE-standardized clear-sky potential solar radiation (W/m^2) for
/// `location` at `when`, via the extraterrestrial-radiation/clear-sky-index
/// formulation (Allen et al., ASCE-EWRI 2005, adapted to instantaneous
/// watts rather than the daily-total megajoule form most references give).
pub fn clear_sky_potential_watts(location: &GeoLocation, when: DateTime<Utc>) -> f64 {
    let lat_rad = location.lat.to_radians();
    let day_of_year = f64::from(when.ordinal());

    let solar_declination = 0.409 * (2.0 * std::f64::consts::PI / 365.0 * day_of_year - 1.39).sin();

    let hour = f64::from(when.hour()) + f64::from(when.minute()) / 60.0;
    let hour_angle = (std::f64::consts::PI / 12.0) * (hour - 12.0);

    let cos_zenith =
        lat_rad.sin() * solar_declination.sin() + lat_rad.cos() * solar_declination.cos() * hour_angle.cos();
    if cos_zenith <= 0.0 {
        return 0.0; // sun below the horizon
    }

    let inverse_earth_sun_distance = 1.0 + 0.033 * (2.0 * std::f64::consts::PI / 365.0 * day_of_year).cos();
    let extraterrestrial = SOLAR_CONSTANT * inverse_earth_sun_distance * cos_zenith;

    // Clear-sky transmissivity rises ~2% per 100m of altitude (ASCE-EWRI's
    // Rso = (0.75 + 2e-5 * z) * Ra).
    let transmissivity = 0.75 + 2e-5 * location.altitude;
    (extraterrestrial * transmissivity).max(0.0)
}
