use anyhow::{Context, Result};
use reqwest::Client;
use reqwest::header::USER_AGENT;
use std::time::Duration;

use super::ReverseGeocoder;
use crate::config::GeocodingConfig;

/// Reverse geocoding through an OpenStreetMap Nominatim instance.
pub struct NominatimService {
    endpoint: String,
    client: Client,
}

impl NominatimService {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &GeocodingConfig) -> Result<Self> {
        Self::new(
            config.endpoint.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn reverse_url(&self, query: &str) -> Result<reqwest::Url> {
        let (lat, lon) = query
            .split_once(',')
            .with_context(|| format!("Query \"{query}\" is not \"lat,lon\""))?;
        let params = [
            ("format", "jsonv2"),
            ("lat", lat.trim()),
            ("lon", lon.trim()),
        ];
        reqwest::Url::parse_with_params(&format!("{}/reverse", self.endpoint), &params)
            .context("Invalid Nominatim endpoint")
    }
}

#[async_trait::async_trait]
impl ReverseGeocoder for NominatimService {
    fn name(&self) -> &str {
        "Nominatim"
    }

    async fn reverse(&self, identity: &str, query: &str) -> Result<String> {
        let url = self.reverse_url(query)?;

        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, identity)
            .send()
            .await
            .context("Nominatim request failed")?;

        let status = resp.status();
        let text = resp.text().await.context("Failed to read Nominatim response")?;

        if !status.is_success() {
            anyhow::bail!("Nominatim API error ({}): {}", status, text);
        }

        let json: serde_json::Value =
            serde_json::from_str(&text).context("Failed to parse Nominatim response JSON")?;

        address_from_response(&json)
    }
}

/// Pick the address out of a `/reverse` response.
///
/// Nominatim answers points it cannot place (open sea, poles) with
/// `{"error": "Unable to geocode"}`. That is a definitive answer, so it maps
/// to an empty address rather than an error worth retrying.
fn address_from_response(json: &serde_json::Value) -> Result<String> {
    if let Some(address) = json["display_name"].as_str() {
        return Ok(address.to_string());
    }
    if let Some(reason) = json["error"].as_str() {
        log::debug!("Nominatim could not place the coordinate: {reason}");
        return Ok(String::new());
    }
    anyhow::bail!("No display_name in Nominatim response")
}
