use std::fmt;
use std::str::FromStr;

use super::{Rational, TagMap, TagValue};

pub const GPS_LATITUDE: &str = "GPS GPSLatitude";
pub const GPS_LATITUDE_REF: &str = "GPS GPSLatitudeRef";
pub const GPS_LONGITUDE: &str = "GPS GPSLongitude";
pub const GPS_LONGITUDE_REF: &str = "GPS GPSLongitudeRef";

/// Why a set of GPS tags could not be turned into a coordinate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GpsError {
    #[error("{tag} has a zero denominator")]
    ZeroDenominator { tag: &'static str },

    #[error("{tag} is not a degrees/minutes/seconds triple: {value}")]
    MalformedTag { tag: &'static str, value: String },

    #[error("unknown hemisphere reference {0:?}")]
    UnknownHemisphere(String),

    #[error("coordinate ({latitude}, {longitude}) is out of range")]
    OutOfRange { latitude: f64, longitude: f64 },
}

/// Hemisphere reference attached to a DMS value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    /// `-1.0` for the southern and western hemispheres, `1.0` otherwise.
    pub fn sign(self) -> f64 {
        match self {
            Hemisphere::South | Hemisphere::West => -1.0,
            Hemisphere::North | Hemisphere::East => 1.0,
        }
    }
}

impl FromStr for Hemisphere {
    type Err = GpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches('\0').to_ascii_uppercase().as_str() {
            "N" => Ok(Hemisphere::North),
            "S" => Ok(Hemisphere::South),
            "E" => Ok(Hemisphere::East),
            "W" => Ok(Hemisphere::West),
            other => Err(GpsError::UnknownHemisphere(other.to_string())),
        }
    }
}

/// A latitude/longitude pair in signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting values outside ±90 / ±180.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GpsError> {
        let in_range = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
        if !in_range {
            return Err(GpsError::OutOfRange { latitude, longitude });
        }
        Ok(Self { latitude, longitude })
    }

    /// Canonical cache key, e.g. `"(32.7968, -96.8014)"`.
    ///
    /// Both components are rounded to `precision` first, so coordinates that
    /// round to the same values share a key. Whole numbers keep their `.0`.
    pub fn cache_key(&self, precision: u32) -> String {
        format!(
            "({}, {})",
            float_repr(round_to(self.latitude, precision)),
            float_repr(round_to(self.longitude, precision))
        )
    }

    /// Query string handed to the reverse geocoder (`"lat,lon"`).
    pub fn query(&self) -> String {
        format!("{},{}", float_repr(self.latitude), float_repr(self.longitude))
    }
}

/// Shortest round-trip rendering with a signed, two-digit exponent
/// (`10.0`, `0.0001`, `1e-05`), the form existing cache files use.
fn float_repr(value: f64) -> String {
    let debug = format!("{value:?}");
    match debug.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => debug,
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

/// Round half away from zero to `precision` decimal places.
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    let rounded = (value * factor).round() / factor;
    // Collapse -0.0 so both zeros render the same key.
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Convert degrees, minutes and seconds to signed decimal degrees.
pub fn dms_to_decimal(
    degrees: f64,
    minutes: f64,
    seconds: f64,
    hemisphere: Hemisphere,
    precision: u32,
) -> f64 {
    let decimal = degrees + minutes / 60.0 + seconds / 3600.0;
    round_to(hemisphere.sign() * decimal, precision)
}

/// Extract the image coordinate from a GPS tag mapping.
///
/// Returns `Ok(None)` when the latitude, the longitude, or either hemisphere
/// reference is missing; a partial fix never yields a half-populated
/// coordinate.
pub fn extract_coordinate(tags: &TagMap, precision: u32) -> Result<Option<Coordinate>, GpsError> {
    let Some(lat) = tags.get(GPS_LATITUDE) else {
        return Ok(None);
    };
    let Some(lat_ref) = tags.get(GPS_LATITUDE_REF) else {
        log::debug!("{GPS_LATITUDE} present without {GPS_LATITUDE_REF}");
        return Ok(None);
    };
    let latitude = tag_to_decimal(GPS_LATITUDE, lat, lat_ref, precision)?;

    let Some(lon) = tags.get(GPS_LONGITUDE) else {
        return Ok(None);
    };
    let Some(lon_ref) = tags.get(GPS_LONGITUDE_REF) else {
        log::debug!("{GPS_LONGITUDE} present without {GPS_LONGITUDE_REF}");
        return Ok(None);
    };
    let longitude = tag_to_decimal(GPS_LONGITUDE, lon, lon_ref, precision)?;

    Coordinate::new(latitude, longitude).map(Some)
}

fn tag_to_decimal(
    tag: &'static str,
    dms: &TagValue,
    reference: &TagValue,
    precision: u32,
) -> Result<f64, GpsError> {
    let parts = match dms {
        TagValue::Rationals(values) if values.len() >= 3 => &values[..3],
        other => {
            return Err(GpsError::MalformedTag {
                tag,
                value: other.to_string(),
            });
        }
    };

    let component = |r: &Rational| r.to_f64().ok_or(GpsError::ZeroDenominator { tag });
    let degrees = component(&parts[0])?;
    let minutes = component(&parts[1])?;
    let seconds = component(&parts[2])?;

    let hemisphere: Hemisphere = match reference {
        TagValue::Text(text) => text.parse()?,
        other => return Err(GpsError::UnknownHemisphere(other.to_string())),
    };

    Ok(dms_to_decimal(degrees, minutes, seconds, hemisphere, precision))
}
