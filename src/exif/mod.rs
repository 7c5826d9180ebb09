//! EXIF tag reading and GPS coordinate extraction.
//!
//! Decoding is hidden behind the [`ExifDecoder`] trait so the pipeline only
//! ever sees a flat tag-name → value mapping:
//!
//! - [`NomExifDecoder`] — the default decoder, built on `nom-exif`
//! - [`extract_coordinate`] — turns the GPS tags of that mapping into a [`Coordinate`]
//!
//! Tag names follow the `"<IFD> <TagName>"` convention (`"GPS GPSLatitude"`),
//! so GPS tags can be selected with a simple prefix check.

mod gps;
mod reader;

pub use gps::{
    Coordinate, GPS_LATITUDE, GPS_LATITUDE_REF, GPS_LONGITUDE, GPS_LONGITUDE_REF, GpsError,
    Hemisphere, dms_to_decimal, extract_coordinate, round_to,
};
pub use reader::NomExifDecoder;

use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;

/// Prefix shared by every tag from the GPS IFD.
pub const GPS_PREFIX: &str = "GPS";

/// An unsigned EXIF rational (numerator / denominator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Floating-point value, or `None` when the denominator is zero.
    pub fn to_f64(self) -> Option<f64> {
        if self.den == 0 {
            None
        } else {
            Some(f64::from(self.num) / f64::from(self.den))
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// A decoded tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// One or more rationals (DMS triples, altitudes, ...).
    Rationals(Vec<Rational>),
    /// Text values, including single-letter references like `N` or `W`.
    Text(String),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Rationals(values) => {
                let parts: Vec<String> = values.iter().map(Rational::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            TagValue::Text(text) => f.write_str(text),
        }
    }
}

/// Tag name → value mapping produced by an [`ExifDecoder`].
pub type TagMap = BTreeMap<String, TagValue>;

/// Source of EXIF tags for an open image file.
///
/// The file is handed over positioned at offset 0. An image without any EXIF
/// block should decode to an empty map; errors are reserved for files that
/// cannot be read at all.
pub trait ExifDecoder {
    fn decode(&self, file: File) -> Result<TagMap>;
}

/// Keep only the tags that belong to the GPS IFD.
pub fn gps_tags(tags: TagMap) -> TagMap {
    tags.into_iter()
        .filter(|(name, value)| {
            let keep = name.starts_with(GPS_PREFIX);
            if keep {
                log::debug!("Extracting tag \"{name}\" with value of \"{value}\"");
            }
            keep
        })
        .collect()
}
