use crate::types::RawPointRecord;
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://developer.nrel.gov";

/// Station attributes carried through as raw string codes.
const STATION_ATTRIBUTES: [&str; 4] = [
    "status_code",
    "access_code",
    "fuel_type_code",
    "owner_type_code",
];

/// Server-side narrowing of the station pull. The loader applies its
/// own filters afterwards, so these only reduce transfer size.
#[derive(Debug, Clone)]
pub struct StationQuery {
    pub state: String,
    pub fuel_type: Option<String>,
    pub status: Option<String>,
    pub access: Option<String>,
}

/// Client for the alternative-fuel-stations REST API.
pub struct StationApiClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl StationApiClient {
    /// The API key is injected here and sent as a URL parameter; nothing
    /// else in the pipeline ever sees credentials.
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: api_key.into(),
            http,
        })
    }

    /// One blocking pull, no retries: a failed fetch fails the run.
    pub async fn fetch(&self, query: &StationQuery) -> Result<Vec<RawPointRecord>> {
        let url = format!("{}/api/alt-fuel-stations/v1.json", self.base_url);
        let mut request = self.http.get(&url).query(&[
            ("api_key", self.api_key.as_str()),
            ("state", query.state.as_str()),
        ]);
        if let Some(fuel_type) = &query.fuel_type {
            request = request.query(&[("fuel_type", fuel_type.as_str())]);
        }
        if let Some(status) = &query.status {
            request = request.query(&[("status", status.as_str())]);
        }
        if let Some(access) = &query.access {
            request = request.query(&[("access", access.as_str())]);
        }

        let response = request
            .send()
            .await
            .context("Failed to send station API request")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Station API returned status {}: {}", status, body));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse station API response")?;
        let stations = json["fuel_stations"]
            .as_array()
            .ok_or_else(|| anyhow!("Station API response missing 'fuel_stations' array"))?;

        let records = stations
            .iter()
            .map(|station| {
                let mut attributes = HashMap::new();
                for name in STATION_ATTRIBUTES {
                    if let Some(value) = station[name].as_str() {
                        attributes.insert(name.to_string(), value.to_string());
                    }
                }
                RawPointRecord {
                    latitude: station["latitude"].as_f64(),
                    longitude: station["longitude"].as_f64(),
                    attributes,
                }
            })
            .collect();
        Ok(records)
    }
}
