use crate::error::PipelineError;
use crate::types::{PointFeature, Region};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::intersects::Intersects;
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashMap;
use tracing::info;

// Wrapper for RTree indexing over region bounding boxes.
struct RegionEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Counts points per containing region.
///
/// Containment is closed: a point on a region's boundary belongs to it.
/// When a point sits on a shared edge and intersects several regions,
/// the lowest region id wins, so assignment never depends on index or
/// iteration order. Points outside every region are dropped; they are
/// data outside the area of interest, not invalid input. Regions with no
/// matching points are absent from the result map.
///
/// CRSs of points and regions must match exactly; a mismatch fails
/// before any containment test runs.
pub fn aggregate(
    points: &[PointFeature],
    regions: &[Region],
) -> Result<HashMap<String, u64>, PipelineError> {
    check_crs(points, regions)?;

    let mut tree_items = Vec::with_capacity(regions.len());
    for (index, region) in regions.iter().enumerate() {
        if let Some(rect) = region.geometry.bounding_rect() {
            tree_items.push(RegionEnvelope {
                index,
                aabb: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            });
        }
    }
    let tree = RTree::bulk_load(tree_items);

    // Regions are read-only here, so the containment tests are safe to
    // run across points in parallel.
    let assigned: Vec<Option<usize>> = points
        .par_iter()
        .map(|point| {
            let envelope = AABB::from_point([point.location.x(), point.location.y()]);
            tree.locate_in_envelope_intersecting(&envelope)
                .filter(|candidate| regions[candidate.index].geometry.intersects(&point.location))
                .min_by(|a, b| regions[a.index].id.cmp(&regions[b.index].id))
                .map(|candidate| candidate.index)
        })
        .collect();

    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut outside = 0usize;
    for assignment in assigned {
        match assignment {
            Some(index) => *counts.entry(regions[index].id.clone()).or_insert(0) += 1,
            None => outside += 1,
        }
    }

    info!(
        assigned = points.len() - outside,
        outside,
        regions_hit = counts.len(),
        "aggregated points into regions"
    );
    Ok(counts)
}

fn check_crs(points: &[PointFeature], regions: &[Region]) -> Result<(), PipelineError> {
    let (Some(first_point), Some(first_region)) = (points.first(), regions.first()) else {
        return Ok(());
    };

    if first_point.crs != first_region.crs {
        return Err(PipelineError::CoordinateSystemMismatch {
            points: first_point.crs.0.clone(),
            regions: first_region.crs.0.clone(),
        });
    }
    if let Some(bad) = points.iter().find(|p| p.crs != first_point.crs) {
        return Err(PipelineError::CoordinateSystemMismatch {
            points: bad.crs.0.clone(),
            regions: first_region.crs.0.clone(),
        });
    }
    if let Some(bad) = regions.iter().find(|r| r.crs != first_region.crs) {
        return Err(PipelineError::CoordinateSystemMismatch {
            points: first_point.crs.0.clone(),
            regions: bad.crs.0.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Crs;
    use geo::{LineString, MultiPolygon, Point, Polygon};
    use std::collections::HashMap;

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

    fn region(id: &str, geometry: MultiPolygon<f64>, crs: &str) -> Region {
        Region {
            id: id.to_string(),
            geometry,
            crs: Crs::new(crs),
            variables: HashMap::new(),
            derived: HashMap::new(),
        }
    }

    fn point(x: f64, y: f64, crs: &str) -> PointFeature {
        PointFeature {
            location: Point::new(x, y),
            crs: Crs::new(crs),
            status: None,
            access: None,
            fuel_type: None,
            owner_type: None,
        }
    }

    #[test]
    fn counts_points_per_containing_region() {
        let regions = vec![
            region("T1", square(0.0, 0.0), "EPSG:4269"),
            region("T2", square(1.0, 0.0), "EPSG:4269"),
        ];
        let points = vec![
            point(0.2, 0.2, "EPSG:4269"),
            point(0.5, 0.5, "EPSG:4269"),
            point(0.8, 0.8, "EPSG:4269"),
        ];

        let counts = aggregate(&points, &regions).unwrap();
        assert_eq!(counts.get("T1"), Some(&3));
        // Zero-count regions are absent, not present with 0.
        assert!(!counts.contains_key("T2"));
    }

    #[test]
    fn points_outside_every_region_are_dropped() {
        let regions = vec![region("T1", square(0.0, 0.0), "EPSG:4269")];
        let points = vec![point(5.0, 5.0, "EPSG:4269")];

        let counts = aggregate(&points, &regions).unwrap();
        assert!(counts.is_empty());
    }

    #[test]
    fn boundary_point_goes_to_lowest_id() {
        // (1.0, 0.5) lies on the shared edge of both squares.
        let regions = vec![
            region("T2", square(1.0, 0.0), "EPSG:4269"),
            region("T1", square(0.0, 0.0), "EPSG:4269"),
        ];
        let points = vec![point(1.0, 0.5, "EPSG:4269")];

        let counts = aggregate(&points, &regions).unwrap();
        assert_eq!(counts.get("T1"), Some(&1));
        assert!(!counts.contains_key("T2"));
    }

    #[test]
    fn mismatched_crs_fails_before_containment() {
        let regions = vec![region("T1", square(0.0, 0.0), "EPSG:4269")];
        let points = vec![point(0.5, 0.5, "EPSG:4326")];

        let err = aggregate(&points, &regions).unwrap_err();
        match err {
            PipelineError::CoordinateSystemMismatch { points, regions } => {
                assert_eq!(points, "EPSG:4326");
                assert_eq!(regions, "EPSG:4269");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn aggregation_is_idempotent() {
        let regions = vec![
            region("T1", square(0.0, 0.0), "EPSG:4269"),
            region("T2", square(1.0, 0.0), "EPSG:4269"),
        ];
        let points = vec![
            point(0.5, 0.5, "EPSG:4269"),
            point(1.5, 0.5, "EPSG:4269"),
            point(1.0, 0.5, "EPSG:4269"),
        ];

        let first = aggregate(&points, &regions).unwrap();
        let second = aggregate(&points, &regions).unwrap();
        assert_eq!(first, second);
    }
}
