use anyhow::{Context, Result};
use nom_exif::*;
use std::fs::File;

use super::{
    ExifDecoder, GPS_LATITUDE, GPS_LATITUDE_REF, GPS_LONGITUDE, GPS_LONGITUDE_REF, Rational,
    TagMap, TagValue,
};

/// [`ExifDecoder`] backed by `nom-exif`.
///
/// Only the GPS position is decoded. A file without an EXIF block yields an
/// empty map; a block that is present but has no readable entry is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct NomExifDecoder;

impl NomExifDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl ExifDecoder for NomExifDecoder {
    fn decode(&self, file: File) -> Result<TagMap> {
        let mut parser = MediaParser::new();
        let ms = MediaSource::file(file).context("Failed to open image stream")?;

        let iter: ExifIter = match parser.parse(ms) {
            Ok(iter) => iter,
            Err(e) if is_missing_exif(&e) => {
                log::debug!("No EXIF data found: {e}");
                return Ok(TagMap::new());
            }
            Err(e) => return Err(e).context("Failed to parse EXIF block"),
        };

        // Unreadable entries are skipped by the iterator, so a damaged block
        // shows up as one with nothing in it.
        let readable = iter.clone_and_rewind().count();
        if readable == 0 {
            anyhow::bail!("Corrupt EXIF block: no readable entries");
        }

        let gps_info = iter
            .parse_gps_info()
            .context("Failed to parse GPS block")?;

        let mut tags = TagMap::new();
        if let Some(gps) = gps_info {
            tags.insert(GPS_LATITUDE.to_string(), latlng_to_tag(&gps.latitude));
            tags.insert(
                GPS_LATITUDE_REF.to_string(),
                TagValue::Text(gps.latitude_ref.to_string()),
            );
            tags.insert(GPS_LONGITUDE.to_string(), latlng_to_tag(&gps.longitude));
            tags.insert(
                GPS_LONGITUDE_REF.to_string(),
                TagValue::Text(gps.longitude_ref.to_string()),
            );
        }

        log::debug!("Decoded {} tag(s) from {readable} EXIF entries", tags.len());
        Ok(tags)
    }
}

/// nom-exif reports "this file carries no EXIF" through its generic parse
/// failure, so the message is the only way to tell it from real damage.
fn is_missing_exif(err: &nom_exif::Error) -> bool {
    match err {
        nom_exif::Error::UnrecognizedFileFormat => true,
        nom_exif::Error::ParseFailed(e) => {
            let msg = e.to_string().to_ascii_lowercase();
            msg.contains("exif not found") || msg.contains("no exif data")
        }
        _ => false,
    }
}

/// Keep a nom-exif LatLng (deg, min, sec) as raw rationals; conversion happens later.
fn latlng_to_tag(latlng: &LatLng) -> TagValue {
    TagValue::Rationals(vec![
        Rational::new(latlng.0.0, latlng.0.1),
        Rational::new(latlng.1.0, latlng.1.1),
        Rational::new(latlng.2.0, latlng.2.1),
    ])
}
