//! Reverse geocoding with retries and a location cache.
//!
//! The [`Resolver`] turns a [`Coordinate`] into a postal code:
//!
//! 1. a cached answer is returned without touching the network;
//! 2. otherwise the [`ReverseGeocoder`] is called up to
//!    [`RetryPolicy::max_attempts`] times, each attempt presenting a fresh
//!    client identity (`<prefix>0`, `<prefix>1`, ...) and waiting a little
//!    longer after every failure;
//! 3. the postal code is taken from the returned address and cached.

mod nominatim;

pub use nominatim::NominatimService;

use anyhow::Result;
use std::time::Duration;

use crate::cache::LocationCache;
use crate::config::GeocodingConfig;
use crate::exif::Coordinate;

/// A reverse-geocoding backend.
///
/// Implement this trait to plug in another provider. The library ships with
/// [`NominatimService`].
#[async_trait::async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Display name of this backend (e.g. "Nominatim").
    fn name(&self) -> &str;
    /// Resolve a `"lat,lon"` query to a free-text address.
    ///
    /// * `identity` — the client identity (user agent) to present for this call
    /// * `query` — the coordinate formatted as `"lat,lon"`
    async fn reverse(&self, identity: &str, query: &str) -> Result<String>;
}

/// Resolution failures the caller is expected to handle.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("reverse geocoding failed after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// How often, and how patiently, to retry the geocoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Attempt `i` failing waits `i * backoff_unit` before the next one.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &GeocodingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_unit: Duration::from_millis(config.backoff_unit_ms),
        }
    }

    /// Delay after the failed attempt with index `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt
    }
}

/// Coordinate → postal code resolver.
pub struct Resolver {
    geocoder: Box<dyn ReverseGeocoder>,
    identity_prefix: String,
    policy: RetryPolicy,
}

impl Resolver {
    pub fn new(
        geocoder: Box<dyn ReverseGeocoder>,
        identity_prefix: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            geocoder,
            identity_prefix: identity_prefix.into(),
            policy,
        }
    }

    /// Resolve a coordinate to a postal code, consulting `cache` first.
    ///
    /// Returns `Ok(None)` when there is no coordinate or the address carries
    /// no postal code; both that result and a found code are cached. Running
    /// out of attempts is reported as [`GeocodeError::Exhausted`] and is not
    /// cached, so a later run tries again.
    pub async fn resolve(
        &self,
        coordinate: Option<&Coordinate>,
        cache: &mut LocationCache,
    ) -> Result<Option<String>, GeocodeError> {
        let Some(coordinate) = coordinate else {
            return Ok(None);
        };

        if let Some(cached) = cache.get(coordinate) {
            log::debug!("Cache hit for {coordinate}: {cached:?}");
            return Ok(cached.map(str::to_string));
        }

        let address = self.lookup(coordinate).await?;
        log::info!("Received reverse lookup result: \"{address}\"");

        let postal_code = postal_code_from_address(&address);
        cache.insert(coordinate, postal_code.clone());
        Ok(postal_code)
    }

    /// Call the geocoder until it answers or the attempts run out.
    async fn lookup(&self, coordinate: &Coordinate) -> Result<String, GeocodeError> {
        let query = coordinate.query();
        log::info!("Doing reverse lookup on \"{query}\" via {}", self.geocoder.name());

        let mut last_error = String::from("no attempts made");
        for attempt in 0..self.policy.max_attempts {
            let identity = format!("{}{attempt}", self.identity_prefix);
            match self.geocoder.reverse(&identity, &query).await {
                Ok(address) => return Ok(address),
                Err(e) => {
                    log::warn!(
                        "Reverse lookup failed as \"{identity}\" (try #{}): {e:#}. Retrying with a different identity.",
                        attempt + 1
                    );
                    last_error = format!("{e:#}");
                }
            }

            let is_last = attempt + 1 == self.policy.max_attempts;
            if !is_last {
                tokio::time::sleep(self.policy.delay(attempt)).await;
            }
        }

        Err(GeocodeError::Exhausted {
            attempts: self.policy.max_attempts,
            last_error,
        })
    }
}

/// Pull the postal code out of a comma-separated address.
///
/// Addresses end with `..., <postal code>, <country>`, so the code is the
/// second-to-last segment. Returns `None` if there are fewer than two
/// segments or that segment is blank.
pub fn postal_code_from_address(address: &str) -> Option<String> {
    let parts: Vec<&str> = address.split(',').collect();
    if parts.len() < 2 {
        return None;
    }
    let candidate = parts[parts.len() - 2].trim();
    if candidate.is_empty() {
        None
    } else {
        Some(candidate.to_string())
    }
}
