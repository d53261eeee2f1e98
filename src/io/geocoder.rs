//! Reverse geocoding for session log enrichment
//!
//! Queries a Nominatim-compatible `/reverse` endpoint and reduces the
//! response to a road name and a locality name. Failures never reach the
//! lock path; the enrichment worker logs them and the entry stays bare.

use crate::domain::types::Address;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Resolves coordinates to a place
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// `Ok(None)` means the service answered but knows no place here
    async fn reverse(&self, lat: f64, lng: f64) -> anyhow::Result<Option<Address>>;
}

/// Nominatim reverse response (only the fields we read)
#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    address: Option<AddressParts>,
}

#[derive(Debug, Default, Deserialize)]
struct AddressParts {
    road: Option<String>,
    pedestrian: Option<String>,
    footway: Option<String>,
    suburb: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
}

impl AddressParts {
    fn into_address(self) -> Option<Address> {
        let road_name = self.road.or(self.pedestrian).or(self.footway);
        let locality_name =
            self.suburb.or(self.city).or(self.town).or(self.village).or(self.hamlet);
        if road_name.is_none() && locality_name.is_none() {
            return None;
        }
        Some(Address { road_name, locality_name })
    }
}

/// Parse a reverse geocoding response body
fn parse_address(body: &str) -> anyhow::Result<Option<Address>> {
    let response: ReverseResponse =
        serde_json::from_str(body).context("Failed to parse reverse geocoding response")?;
    if let Some(error) = response.error {
        debug!(error = %error, "geocoder_not_found");
        return Ok(None);
    }
    Ok(response.address.and_then(AddressParts::into_address))
}

/// HTTP client for a Nominatim-compatible service
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build geocoder HTTP client")?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn reverse_url(&self, lat: f64, lng: f64) -> String {
        format!("{}/reverse?format=jsonv2&lat={}&lon={}", self.base_url, lat, lng)
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, lat: f64, lng: f64) -> anyhow::Result<Option<Address>> {
        let url = self.reverse_url(lat, lng);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Reverse geocoding request failed")?
            .error_for_status()
            .context("Reverse geocoding service returned an error status")?;
        let body = response.text().await.context("Failed to read geocoder response")?;
        parse_address(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_road_and_suburb() {
        let body = r#"{
            "place_id": 1,
            "display_name": "George Street, Sydney",
            "address": { "road": "George Street", "suburb": "Sydney", "city": "Council of the City of Sydney" }
        }"#;
        let address = parse_address(body).unwrap().unwrap();
        assert_eq!(address.road_name.as_deref(), Some("George Street"));
        assert_eq!(address.locality_name.as_deref(), Some("Sydney"));
    }

    #[test]
    fn test_parse_falls_back_to_town() {
        let body = r#"{ "address": { "footway": "Coastal Walk", "town": "Bondi" } }"#;
        let address = parse_address(body).unwrap().unwrap();
        assert_eq!(address.road_name.as_deref(), Some("Coastal Walk"));
        assert_eq!(address.locality_name.as_deref(), Some("Bondi"));
    }

    #[test]
    fn test_parse_not_found() {
        assert_eq!(parse_address(r#"{ "error": "Unable to geocode" }"#).unwrap(), None);
        assert_eq!(parse_address(r#"{ "address": { "country": "Australia" } }"#).unwrap(), None);
    }

    #[test]
    fn test_parse_invalid_body() {
        assert!(parse_address("<html>rate limited</html>").is_err());
    }

    #[test]
    fn test_reverse_url_trims_trailing_slash() {
        let geocoder = NominatimGeocoder::new(
            "https://nominatim.example.org/",
            Duration::from_secs(1),
            "coord-lock-test",
        )
        .unwrap();
        assert_eq!(
            geocoder.reverse_url(-33.8688, 151.2093),
            "https://nominatim.example.org/reverse?format=jsonv2&lat=-33.8688&lon=151.2093"
        );
    }
}
