use crate::config::PointFilter;
use crate::error::PipelineError;
use crate::types::{Crs, PointFeature, RawPointRecord};
use anyhow::{Context, Result};
use geo::Point;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::info;

const STATUS: &str = "status_code";
const ACCESS: &str = "access_code";
const FUEL_TYPE: &str = "fuel_type_code";
const OWNER_TYPE: &str = "owner_type_code";

/// Normalizes raw point records into geo-located features, keeping only
/// records that satisfy every filter. A record missing latitude or
/// longitude is malformed and fails the whole load; missing optional
/// attributes simply stay absent.
pub fn load_points(
    records: &[RawPointRecord],
    filters: &[PointFilter],
    crs: &Crs,
) -> Result<Vec<PointFeature>, PipelineError> {
    let mut features = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let latitude = record
            .latitude
            .ok_or(PipelineError::MalformedRecord { index, field: "latitude" })?;
        let longitude = record
            .longitude
            .ok_or(PipelineError::MalformedRecord { index, field: "longitude" })?;

        let matches = filters.iter().all(|f| {
            record.attributes.get(&f.field).map(String::as_str) == Some(f.value.as_str())
        });
        if !matches {
            continue;
        }

        features.push(PointFeature {
            location: Point::new(longitude, latitude),
            crs: crs.clone(),
            status: record.attributes.get(STATUS).cloned(),
            access: record.attributes.get(ACCESS).cloned(),
            fuel_type: record.attributes.get(FUEL_TYPE).cloned(),
            owner_type: record.attributes.get(OWNER_TYPE).cloned(),
        });
    }

    info!(
        loaded = features.len(),
        total = records.len(),
        "loaded point features"
    );
    Ok(features)
}

/// Reads raw point records from a CSV snapshot. Latitude/longitude
/// columns are matched case-insensitively; every other column becomes a
/// string attribute.
pub fn read_points_csv(path: &Path) -> Result<Vec<RawPointRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open points CSV: {:?}", path))?;
    let mut rdr = csv::ReaderBuilder::new().from_reader(file);
    let headers = rdr.headers()?.clone();

    let lat_idx = headers.iter().position(|h| h.eq_ignore_ascii_case("latitude"));
    let lon_idx = headers.iter().position(|h| h.eq_ignore_ascii_case("longitude"));

    let mut records = Vec::new();
    for result in rdr.records() {
        let row = result?;

        let mut attributes = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            if Some(i) == lat_idx || Some(i) == lon_idx {
                continue;
            }
            if let Some(value) = row.get(i) {
                if !value.is_empty() {
                    attributes.insert(header.to_string(), value.to_string());
                }
            }
        }

        records.push(RawPointRecord {
            latitude: lat_idx.and_then(|i| row.get(i)).and_then(|s| s.parse().ok()),
            longitude: lon_idx.and_then(|i| row.get(i)).and_then(|s| s.parse().ok()),
            attributes,
        });
    }

    Ok(records)
}
