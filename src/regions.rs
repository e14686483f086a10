use crate::config::DerivedConfig;
use crate::error::PipelineError;
use crate::types::{Crs, RawPolygonRecord, Region};
use std::collections::HashMap;
use tracing::info;

/// Normalizes raw polygon records into regions, computing derived
/// percentage attributes along the way.
///
/// One region per unique identifier: a repeated id with identical
/// geometry is kept once (first occurrence wins), a repeated id with
/// differing geometry is a fatal identity collision.
pub fn load_regions(
    records: Vec<RawPolygonRecord>,
    derived: &[DerivedConfig],
    crs: &Crs,
) -> Result<Vec<Region>, PipelineError> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut regions: Vec<Region> = Vec::new();

    for record in records {
        if let Some(&existing) = seen.get(&record.id) {
            if regions[existing].geometry != record.geometry {
                return Err(PipelineError::DuplicateIdentifier { id: record.id });
            }
            continue;
        }

        let mut derived_map = HashMap::new();
        for def in derived {
            derived_map.insert(def.name.clone(), derive_percentage(&record, def));
        }

        seen.insert(record.id.clone(), regions.len());
        regions.push(Region {
            id: record.id,
            geometry: record.geometry,
            crs: crs.clone(),
            variables: record.variables,
            derived: derived_map,
        });
    }

    info!(regions = regions.len(), "loaded regions");
    Ok(regions)
}

/// numerator / denominator * 100, undefined when either side is
/// undefined or the denominator is zero. Undefined propagates as `None`,
/// never as a numeric sentinel.
fn derive_percentage(record: &RawPolygonRecord, def: &DerivedConfig) -> Option<f64> {
    let numerator = record.variables.get(&def.numerator).and_then(|e| e.value)?;
    let denominator = record.variables.get(&def.denominator).and_then(|e| e.value)?;
    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Estimate;
    use geo::{LineString, MultiPolygon, Polygon};

    fn square(x0: f64, y0: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![
                (x0, y0),
                (x0 + 1.0, y0),
                (x0 + 1.0, y0 + 1.0),
                (x0, y0 + 1.0),
                (x0, y0),
            ]),
            vec![],
        )])
    }

    fn record(id: &str, geometry: MultiPolygon<f64>, vars: &[(&str, Option<f64>)]) -> RawPolygonRecord {
        RawPolygonRecord {
            id: id.to_string(),
            geometry,
            variables: vars
                .iter()
                .map(|(code, value)| {
                    (code.to_string(), Estimate { value: *value, moe: None })
                })
                .collect(),
        }
    }

    fn pct(name: &str, numerator: &str, denominator: &str) -> DerivedConfig {
        DerivedConfig {
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn derives_percentages() {
        let records = vec![record(
            "T1",
            square(0.0, 0.0),
            &[("B15003_022", Some(30.0)), ("B15003_001", Some(120.0))],
        )];
        let derived = vec![pct("pct_bachelors", "B15003_022", "B15003_001")];

        let regions = load_regions(records, &derived, &Crs::new("EPSG:4269")).unwrap();
        assert_eq!(regions[0].attribute("pct_bachelors"), Some(25.0));
    }

    #[test]
    fn zero_or_absent_denominator_is_undefined() {
        let records = vec![
            record("T1", square(0.0, 0.0), &[("N", Some(5.0)), ("D", Some(0.0))]),
            record("T2", square(1.0, 0.0), &[("N", Some(5.0)), ("D", None)]),
            record("T3", square(2.0, 0.0), &[("N", Some(5.0))]),
        ];
        let derived = vec![pct("p", "N", "D")];

        let regions = load_regions(records, &derived, &Crs::new("EPSG:4269")).unwrap();
        for region in &regions {
            assert_eq!(region.attribute("p"), None, "region {}", region.id);
        }
    }

    #[test]
    fn duplicate_id_with_differing_geometry_fails() {
        let records = vec![
            record("T1", square(0.0, 0.0), &[]),
            record("T1", square(1.0, 0.0), &[]),
        ];
        let err = load_regions(records, &[], &Crs::new("EPSG:4269")).unwrap_err();
        match err {
            PipelineError::DuplicateIdentifier { id } => assert_eq!(id, "T1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_id_with_identical_geometry_is_kept_once() {
        let records = vec![
            record("T1", square(0.0, 0.0), &[]),
            record("T1", square(0.0, 0.0), &[]),
        ];
        let regions = load_regions(records, &[], &Crs::new("EPSG:4269")).unwrap();
        assert_eq!(regions.len(), 1);
    }
}
