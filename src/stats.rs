use crate::types::JoinedRegion;
use std::fmt;

/// Summary of one attribute over a presence group of joined regions.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub presence: bool,
    pub regions: usize,
    pub defined: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
}

impl fmt::Display for GroupSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.presence { "with stations" } else { "without stations" };
        write!(f, "{label}: {} regions", self.regions)?;
        match (self.mean, self.median) {
            (Some(mean), Some(median)) => write!(f, ", mean {mean:.1}, median {median:.1}"),
            _ => write!(f, ", no defined values"),
        }
    }
}

/// Summarizes `field` over the joined set, split by station presence.
/// Always returns two entries, absence first.
pub fn summarize_by_presence(regions: &[JoinedRegion], field: &str) -> Vec<GroupSummary> {
    [false, true]
        .iter()
        .map(|&presence| {
            let group: Vec<&JoinedRegion> =
                regions.iter().filter(|r| r.presence == presence).collect();
            let mut values: Vec<f64> = group
                .iter()
                .filter_map(|r| r.region.attribute(field))
                .collect();
            values.sort_by(|a, b| a.total_cmp(b));

            let mean = if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            };

            GroupSummary {
                presence,
                regions: group.len(),
                defined: values.len(),
                mean,
                median: median(&values),
            }
        })
        .collect()
}

fn median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    Some(if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    })
}
