//! # postcode-locator
//!
//! Find out which postal code a photo was taken in. The GPS position stored
//! in a JPEG's EXIF block is reverse geocoded and the postal code is pulled
//! out of the resulting address. Resolved positions are cached on disk so
//! repeated runs over the same collection stay off the network.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use postcode_locator::config::Config;
//! use postcode_locator::pipeline::Locator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     let mut locator = Locator::from_config(&config, true)?;
//!
//!     let specs = vec!["photos/*.jpg".to_string()];
//!     locator
//!         .run(&specs, |report| println!("{}", report.line(&config.tags)))
//!         .await;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! The pieces can be used on their own:
//!
//! ```rust,no_run
//! use postcode_locator::cache::LocationCache;
//! use postcode_locator::exif::{self, ExifDecoder, NomExifDecoder};
//! use postcode_locator::geocode::{NominatimService, Resolver, RetryPolicy};
//! use postcode_locator::jpeg;
//! use std::io::{Seek, SeekFrom};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut file = std::fs::File::open("photo.jpg")?;
//! assert!(jpeg::is_jpeg(&mut file)?);
//! file.seek(SeekFrom::Start(0))?;
//!
//! let tags = exif::gps_tags(NomExifDecoder::new().decode(file)?);
//! let coordinate = exif::extract_coordinate(&tags, 4)?;
//!
//! let geocoder = NominatimService::new(
//!     "https://nominatim.openstreetmap.org".into(),
//!     Duration::from_secs(10),
//! )?;
//! let resolver = Resolver::new(Box::new(geocoder), "my-photo-tool", RetryPolicy::default());
//! let mut cache = LocationCache::open("location_cache.json".as_ref(), 4);
//!
//! let postal_code = resolver.resolve(coordinate.as_ref(), &mut cache).await?;
//! println!("{postal_code:?}");
//! cache.flush();
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`jpeg`] — JPEG signature sniffing
//! - [`exif`] — EXIF tag decoding and GPS coordinate extraction
//! - [`cache`] — Persistent coordinate → postal code cache
//! - [`geocode`] — Reverse geocoding with retries (Nominatim backend)
//! - [`pipeline`] — Path expansion and per-file outcome mapping
//! - [`config`] — Configuration types and loading/saving

pub mod cache;
pub mod config;
pub mod exif;
pub mod geocode;
pub mod jpeg;
pub mod pipeline;
