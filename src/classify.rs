use crate::error::PipelineError;
use crate::types::{BivariateClass, ClassifiedRegion, JoinedRegion};
use tracing::warn;

/// Assigns each joined region a joint ordinal class over two numeric
/// fields, each partitioned independently into `k` natural-breaks bins.
///
/// Breaks are computed over every defined value of a field across the
/// whole input. Regions undefined in either field cannot be classified
/// and are excluded from the output. Bins are closed on the lower edge
/// and open on the upper edge, except the topmost bin which includes its
/// upper boundary. The break computation is a deterministic dynamic
/// program, so the same input multiset always yields the same bins.
pub fn classify(
    regions: Vec<JoinedRegion>,
    x_field: &str,
    y_field: &str,
    k: usize,
) -> Result<Vec<ClassifiedRegion>, PipelineError> {
    let x_bounds = field_breaks(&regions, x_field, k)?;
    let y_bounds = field_breaks(&regions, y_field, k)?;

    let total = regions.len();
    let mut classified = Vec::with_capacity(total);
    for joined in regions {
        let x = joined.region.attribute(x_field);
        let y = joined.region.attribute(y_field);
        let (Some(x), Some(y)) = (x, y) else {
            continue;
        };
        classified.push(ClassifiedRegion {
            class: BivariateClass {
                x_bin: bin_index(&x_bounds, x),
                y_bin: bin_index(&y_bounds, y),
            },
            joined,
        });
    }

    if classified.len() < total {
        warn!(
            excluded = total - classified.len(),
            x_field, y_field, "regions with an undefined classification field excluded"
        );
    }
    Ok(classified)
}

/// Collects the defined values of one field and computes its k+1 bin
/// boundaries. Fails when k < 2 or fewer than k distinct values exist,
/// since no breakpoints can be computed.
fn field_breaks(
    regions: &[JoinedRegion],
    field: &str,
    k: usize,
) -> Result<Vec<f64>, PipelineError> {
    let mut values: Vec<f64> = regions
        .iter()
        .filter_map(|r| r.region.attribute(field))
        .collect();
    values.sort_by(|a, b| a.total_cmp(b));

    let distinct = if values.is_empty() {
        0
    } else {
        1 + values.windows(2).filter(|w| w[0] != w[1]).count()
    };
    if k < 2 || distinct < k {
        return Err(PipelineError::InsufficientData {
            field: field.to_string(),
            k,
            distinct,
        });
    }

    Ok(natural_breaks(&values, k))
}

/// Fisher-Jenks natural breaks over sorted values: partition into k
/// contiguous classes minimizing the within-class sum of squared
/// deviations. Returns k+1 boundaries, bounds[0] = min and
/// bounds[k] = max, with each interior boundary the first value of the
/// class above it. O(k * n^2) via prefix sums.
fn natural_breaks(values: &[f64], k: usize) -> Vec<f64> {
    let n = values.len();
    debug_assert!(k >= 2 && n >= k);

    let mut s1 = vec![0.0; n + 1];
    let mut s2 = vec![0.0; n + 1];
    for (i, v) in values.iter().enumerate() {
        s1[i + 1] = s1[i] + v;
        s2[i + 1] = s2[i] + v * v;
    }
    // Sum of squared deviations of values[lo..hi].
    let sse = |lo: usize, hi: usize| -> f64 {
        let len = (hi - lo) as f64;
        let sum = s1[hi] - s1[lo];
        (s2[hi] - s2[lo]) - sum * sum / len
    };

    // cost[m][i]: minimal total SSE splitting values[..i] into m classes.
    // split[m][i]: start index of the last class in that optimum.
    let mut cost = vec![vec![f64::INFINITY; n + 1]; k + 1];
    let mut split = vec![vec![0usize; n + 1]; k + 1];
    cost[0][0] = 0.0;
    for m in 1..=k {
        for i in m..=n {
            let mut best = f64::INFINITY;
            let mut best_j = m - 1;
            for j in (m - 1)..i {
                if !cost[m - 1][j].is_finite() {
                    continue;
                }
                let c = cost[m - 1][j] + sse(j, i);
                if c < best {
                    best = c;
                    best_j = j;
                }
            }
            cost[m][i] = best;
            split[m][i] = best_j;
        }
    }

    let mut bounds = vec![0.0; k + 1];
    bounds[0] = values[0];
    bounds[k] = values[n - 1];
    let mut end = n;
    for m in (1..k).rev() {
        end = split[m + 1][end];
        bounds[m] = values[end];
    }
    bounds
}

/// 1-based bin for a value: bin m covers [bounds[m-1], bounds[m]), the
/// topmost bin also includes bounds[k].
fn bin_index(bounds: &[f64], value: f64) -> usize {
    let k = bounds.len() - 1;
    for m in 1..k {
        if value < bounds[m] {
            return m;
        }
    }
    k
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Crs, JoinedRegion, Region};
    use geo::MultiPolygon;
    use std::collections::HashMap;

    fn joined(id: &str, x: Option<f64>, y: Option<f64>) -> JoinedRegion {
        let mut derived = HashMap::new();
        derived.insert("x".to_string(), x);
        derived.insert("y".to_string(), y);
        JoinedRegion {
            region: Region {
                id: id.to_string(),
                geometry: MultiPolygon::new(vec![]),
                crs: Crs::new("EPSG:4269"),
                variables: HashMap::new(),
                derived,
            },
            count: 0,
            presence: false,
        }
    }

    #[test]
    fn splits_clustered_values_evenly() {
        // Two tight clusters: the k=2 break falls between 3 and 100.
        let values = [1.0, 2.0, 3.0, 100.0, 101.0, 102.0];
        let regions: Vec<JoinedRegion> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| joined(&format!("T{i}"), Some(v), Some(v)))
            .collect();

        let classified = classify(regions, "x", "y", 2).unwrap();
        assert_eq!(classified.iter().filter(|c| c.class.x_bin == 1).count(), 3);
        assert_eq!(classified.iter().filter(|c| c.class.x_bin == 2).count(), 3);
        assert_eq!(classified.iter().filter(|c| c.class.y_bin == 1).count(), 3);
    }

    #[test]
    fn bins_stay_in_range() {
        let regions: Vec<JoinedRegion> = (0..20)
            .map(|i| joined(&format!("T{i}"), Some(i as f64), Some((i * i) as f64)))
            .collect();

        let classified = classify(regions, "x", "y", 3).unwrap();
        assert_eq!(classified.len(), 20);
        for c in &classified {
            assert!((1..=3).contains(&c.class.x_bin));
            assert!((1..=3).contains(&c.class.y_bin));
        }
    }

    #[test]
    fn boundaries_are_monotonic_and_cover_values() {
        let mut values: Vec<f64> = vec![4.0, 9.0, 1.0, 16.0, 25.0, 2.0, 36.0, 49.0, 3.0];
        values.sort_by(|a, b| a.total_cmp(b));
        let bounds = natural_breaks(&values, 3);

        assert_eq!(bounds.len(), 4);
        assert!(bounds.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(bounds[0], 1.0);
        assert_eq!(bounds[3], 49.0);
        for &v in &values {
            let bin = bin_index(&bounds, v);
            assert!(v >= bounds[bin - 1]);
            if bin < 3 {
                assert!(v < bounds[bin]);
            } else {
                assert!(v <= bounds[bin]);
            }
        }
    }

    #[test]
    fn undefined_field_values_are_excluded() {
        let mut regions: Vec<JoinedRegion> = (0..5)
            .map(|i| joined(&format!("T{i}"), Some(i as f64), Some(i as f64)))
            .collect();
        regions.push(joined("T9", None, Some(1.0)));

        let classified = classify(regions, "x", "y", 2).unwrap();
        assert_eq!(classified.len(), 5);
        assert!(classified.iter().all(|c| c.joined.region.id != "T9"));
    }

    #[test]
    fn too_few_distinct_values_fails() {
        let regions = vec![
            joined("T1", Some(1.0), Some(1.0)),
            joined("T2", Some(1.0), Some(2.0)),
            joined("T3", Some(1.0), Some(3.0)),
        ];
        let err = classify(regions, "x", "y", 2).unwrap_err();
        match err {
            PipelineError::InsufficientData { field, k, distinct } => {
                assert_eq!(field, "x");
                assert_eq!(k, 2);
                assert_eq!(distinct, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn k_below_two_fails() {
        let regions = vec![
            joined("T1", Some(1.0), Some(1.0)),
            joined("T2", Some(2.0), Some(2.0)),
        ];
        assert!(matches!(
            classify(regions, "x", "y", 1),
            Err(PipelineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn breaks_are_deterministic() {
        let regions = || {
            (0..30)
                .map(|i| {
                    joined(
                        &format!("T{i}"),
                        Some(((i * 37) % 13) as f64),
                        Some(((i * 17) % 11) as f64),
                    )
                })
                .collect::<Vec<_>>()
        };

        let a = classify(regions(), "x", "y", 4).unwrap();
        let b = classify(regions(), "x", "y", 4).unwrap();
        let bins_a: Vec<_> = a.iter().map(|c| c.class).collect();
        let bins_b: Vec<_> = b.iter().map(|c| c.class).collect();
        assert_eq!(bins_a, bins_b);
    }
}
