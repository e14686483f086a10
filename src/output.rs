use crate::types::{ClassifiedRegion, Region};
use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, Geometry};
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

/// Writes the classified collection as a GeoJSON FeatureCollection for
/// the downstream rendering collaborator. Each feature carries the
/// region id, count, presence, both classification field values, and
/// the 1-based bin pair.
pub fn write_geojson(
    path: &Path,
    regions: &[ClassifiedRegion],
    x_field: &str,
    y_field: &str,
) -> Result<()> {
    let features = regions
        .iter()
        .map(|r| {
            let mut properties = Map::new();
            properties.insert("id".to_string(), Value::from(r.joined.region.id.clone()));
            properties.insert("count".to_string(), Value::from(r.joined.count));
            properties.insert("presence".to_string(), Value::from(r.joined.presence));
            insert_attribute(&mut properties, &r.joined.region, x_field);
            insert_attribute(&mut properties, &r.joined.region, y_field);
            properties.insert("x_bin".to_string(), Value::from(r.class.x_bin));
            properties.insert("y_bin".to_string(), Value::from(r.class.y_bin));

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(
                    &r.joined.region.geometry,
                ))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
        }
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {:?}", path))?;
    serde_json::to_writer(BufWriter::new(file), &collection)
        .context("Failed to write GeoJSON output")?;
    Ok(())
}

fn insert_attribute(properties: &mut Map<String, Value>, region: &Region, field: &str) {
    let value = region
        .attribute(field)
        .map(Value::from)
        .unwrap_or(Value::Null);
    properties.insert(field.to_string(), value);
}
