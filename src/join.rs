use crate::config::DerivedConfig;
use crate::error::PipelineError;
use crate::types::{JoinedRegion, Region};
use std::collections::HashMap;
use tracing::info;

/// Merges aggregated counts back onto the region collection.
#[derive(Debug)]
pub struct AttributeJoiner {
    required: String,
}

impl AttributeJoiner {
    /// `required` must name a configured derived attribute or a fetched
    /// variable code; a typo fails here, before any join runs.
    pub fn new(
        required: &str,
        derived: &[DerivedConfig],
        variables: &[String],
    ) -> Result<Self, PipelineError> {
        let known = derived.iter().any(|d| d.name == required)
            || variables.iter().any(|v| v == required);
        if !known {
            return Err(PipelineError::UnknownAttribute {
                name: required.to_string(),
            });
        }
        Ok(Self {
            required: required.to_string(),
        })
    }

    /// For every region: count defaults to 0 when absent from the map,
    /// presence = count > 0. Regions whose required attribute is
    /// undefined are dropped entirely, not zero-filled; output order
    /// follows input order minus the drops. Pure and total.
    pub fn join(&self, regions: Vec<Region>, counts: &HashMap<String, u64>) -> Vec<JoinedRegion> {
        let total = regions.len();
        let mut joined = Vec::with_capacity(total);

        for region in regions {
            if region.attribute(&self.required).is_none() {
                continue;
            }
            let count = counts.get(&region.id).copied().unwrap_or(0);
            joined.push(JoinedRegion {
                presence: count > 0,
                count,
                region,
            });
        }

        if joined.len() < total {
            info!(
                dropped = total - joined.len(),
                required = %self.required,
                "dropped regions with undefined required attribute"
            );
        }
        joined
    }
}
