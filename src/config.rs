use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub fetch: FetchConfig,
    pub join: JoinConfig,
    pub classify: ClassifyConfig,
    pub output: OutputConfig,
}

/// API credentials and endpoint overrides. Keys live here and are passed
/// to the clients at construction; nothing downstream reads credentials.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub station_key: String,
    pub station_base_url: Option<String>,
    pub census_key: Option<String>,
    pub census_data_url: Option<String>,
    pub census_geometry_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// FIPS state code for the census pull, e.g. "48".
    pub state: String,
    /// FIPS county code, e.g. "041".
    pub county: String,
    /// Postal abbreviation for the station API, e.g. "TX".
    pub state_abbr: String,
    /// CRS both sources publish in, e.g. "EPSG:4269".
    pub crs: String,
    #[serde(default)]
    pub fuel_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub access: Option<String>,
    /// Equality filters applied when loading point records.
    #[serde(default)]
    pub filters: Vec<PointFilter>,
    /// ACS variable codes to pull (estimate + margin of error each).
    pub variables: Vec<String>,
    #[serde(default)]
    pub derived: Vec<DerivedConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PointFilter {
    pub field: String,
    pub value: String,
}

/// A derived percentage attribute: numerator / denominator * 100.
#[derive(Debug, Deserialize, Clone)]
pub struct DerivedConfig {
    pub numerator: String,
    pub denominator: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JoinConfig {
    /// Regions with this attribute undefined are dropped after the join.
    pub required_attribute: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifyConfig {
    pub x_field: String,
    pub y_field: String,
    pub k: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub geojson: PathBuf,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
