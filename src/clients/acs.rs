use crate::types::{Estimate, RawPolygonRecord};
use anyhow::{anyhow, Context, Result};
use geo::MultiPolygon;
use geojson::GeoJson;
use std::collections::HashMap;
use std::convert::TryInto;
use std::time::Duration;
use tracing::warn;

const DEFAULT_DATA_URL: &str = "https://api.census.gov/data/2022/acs/acs5";
const DEFAULT_GEOMETRY_URL: &str =
    "https://tigerweb.geo.census.gov/arcgis/rest/services/TIGERweb/Tracts_Blocks/MapServer/0/query";

// ACS publishes jam values (-666666666 and friends) for suppressed or
// inapplicable estimates; anything at or below this is undefined.
const JAM_THRESHOLD: f64 = -111_111_111.0;

/// Client for the census statistical API: ACS variable estimates plus
/// tract geometries from the TIGERweb service, joined on GEOID.
pub struct CensusApiClient {
    data_url: String,
    geometry_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl CensusApiClient {
    pub fn new(
        api_key: Option<String>,
        data_url: Option<String>,
        geometry_url: Option<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            data_url: data_url.unwrap_or_else(|| DEFAULT_DATA_URL.to_string()),
            geometry_url: geometry_url.unwrap_or_else(|| DEFAULT_GEOMETRY_URL.to_string()),
            api_key,
            http,
        })
    }

    /// Pulls estimates and geometries for every tract in one county and
    /// joins them into raw polygon records. Tracts present in only one
    /// of the two responses are skipped with a warning.
    pub async fn fetch(
        &self,
        state: &str,
        county: &str,
        variables: &[String],
    ) -> Result<Vec<RawPolygonRecord>> {
        let rows = self.fetch_estimates(state, county, variables).await?;
        let geometries = self.fetch_geometries(state, county).await?;

        let mut records = Vec::with_capacity(geometries.len());
        let mut missing = 0usize;
        for (id, geometry) in geometries {
            match rows.get(&id) {
                Some(vars) => records.push(RawPolygonRecord {
                    id,
                    geometry,
                    variables: vars.clone(),
                }),
                None => missing += 1,
            }
        }
        if missing > 0 {
            warn!(missing, "tracts with geometry but no ACS row");
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    /// ACS responses are a JSON array of string arrays, header row
    /// first. Each requested variable yields an estimate column ("...E")
    /// and a margin-of-error column ("...M").
    async fn fetch_estimates(
        &self,
        state: &str,
        county: &str,
        variables: &[String],
    ) -> Result<HashMap<String, HashMap<String, Estimate>>> {
        let get = std::iter::once("NAME".to_string())
            .chain(
                variables
                    .iter()
                    .flat_map(|code| [format!("{code}E"), format!("{code}M")]),
            )
            .collect::<Vec<_>>()
            .join(",");
        let in_clause = format!("state:{state} county:{county}");

        let mut request = self.http.get(&self.data_url).query(&[
            ("get", get.as_str()),
            ("for", "tract:*"),
            ("in", in_clause.as_str()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request
            .send()
            .await
            .context("Failed to send ACS data request")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("ACS API returned status {}: {}", status, body));
        }

        let table: Vec<Vec<serde_json::Value>> = response
            .json()
            .await
            .context("Failed to parse ACS response")?;
        let mut rows = table.into_iter();
        let header = rows.next().ok_or_else(|| anyhow!("ACS response was empty"))?;

        let find = |name: &str| header.iter().position(|h| h.as_str() == Some(name));
        let state_idx = find("state").ok_or_else(|| anyhow!("ACS response missing 'state' column"))?;
        let county_idx =
            find("county").ok_or_else(|| anyhow!("ACS response missing 'county' column"))?;
        let tract_idx =
            find("tract").ok_or_else(|| anyhow!("ACS response missing 'tract' column"))?;
        let columns: Vec<(&String, Option<usize>, Option<usize>)> = variables
            .iter()
            .map(|code| {
                (
                    code,
                    find(&format!("{code}E")),
                    find(&format!("{code}M")),
                )
            })
            .collect();

        let mut out = HashMap::new();
        for row in rows {
            let cell = |i: usize| row.get(i).and_then(|v| v.as_str());
            let (Some(s), Some(c), Some(t)) = (cell(state_idx), cell(county_idx), cell(tract_idx))
            else {
                continue;
            };
            let id = format!("{s}{c}{t}");

            let mut vars = HashMap::new();
            for (code, value_idx, moe_idx) in &columns {
                vars.insert(
                    (*code).clone(),
                    Estimate {
                        value: value_idx.and_then(|i| parse_acs_cell(row.get(i))),
                        moe: moe_idx.and_then(|i| parse_acs_cell(row.get(i))),
                    },
                );
            }
            out.insert(id, vars);
        }
        Ok(out)
    }

    async fn fetch_geometries(
        &self,
        state: &str,
        county: &str,
    ) -> Result<Vec<(String, MultiPolygon<f64>)>> {
        let where_clause = format!("STATE='{state}' AND COUNTY='{county}'");
        let response = self
            .http
            .get(&self.geometry_url)
            .query(&[
                ("where", where_clause.as_str()),
                ("outFields", "GEOID"),
                ("returnGeometry", "true"),
                ("f", "geojson"),
            ])
            .send()
            .await
            .context("Failed to send tract geometry request")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Geometry service returned status {}: {}",
                status,
                body
            ));
        }

        let body = response
            .text()
            .await
            .context("Failed to read tract geometry response")?;
        let geojson: GeoJson = body
            .parse()
            .context("Failed to parse tract geometry GeoJSON")?;
        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            _ => return Err(anyhow!("Geometry response must be a FeatureCollection")),
        };

        let mut geometries = Vec::new();
        for feature in collection.features {
            let id = feature
                .properties
                .as_ref()
                .and_then(|props| props.get("GEOID"));
            let id = match id {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => continue, // Skip if no GEOID
            };

            let geometry = match feature.geometry {
                Some(geom) => {
                    let converted: geo::Geometry<f64> = geom.value.try_into().map_err(|e| {
                        anyhow!("Failed to convert tract geometry for {}: {:?}", id, e)
                    })?;
                    match converted {
                        geo::Geometry::MultiPolygon(mp) => mp,
                        geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                        _ => continue, // Skip points/lines
                    }
                }
                None => continue,
            };

            geometries.push((id, geometry));
        }
        Ok(geometries)
    }
}

fn parse_acs_cell(cell: Option<&serde_json::Value>) -> Option<f64> {
    let value = match cell? {
        serde_json::Value::String(s) => s.parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    if value <= JAM_THRESHOLD {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jam_values_are_undefined() {
        let jam = serde_json::Value::String("-666666666".to_string());
        assert_eq!(parse_acs_cell(Some(&jam)), None);

        let ok = serde_json::Value::String("52417".to_string());
        assert_eq!(parse_acs_cell(Some(&ok)), Some(52417.0));

        let null = serde_json::Value::Null;
        assert_eq!(parse_acs_cell(Some(&null)), None);
        assert_eq!(parse_acs_cell(None), None);
    }
}
