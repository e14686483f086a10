use geo::{MultiPolygon, Point};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// A named coordinate reference system, e.g. "EPSG:4269".
///
/// Compared exactly; the pipeline never reprojects. Two datasets must
/// declare the same system before any geometric join runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Crs(pub String);

impl Crs {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A survey estimate with its margin of error.
///
/// `value: None` means the variable is undefined for the region (the
/// source published no usable figure). Undefined is an explicit variant
/// here, never a NaN sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub value: Option<f64>,
    pub moe: Option<f64>,
}

/// A raw point record as decoded from the station API or a CSV snapshot.
/// Location fields are optional until the loader validates them.
#[derive(Debug, Clone, Default)]
pub struct RawPointRecord {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub attributes: HashMap<String, String>,
}

/// A raw polygon record as decoded from the census API: one tract's
/// geometry plus its variable estimates, keyed by variable code.
#[derive(Debug, Clone)]
pub struct RawPolygonRecord {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub variables: HashMap<String, Estimate>,
}

/// A geo-located station. Anonymous: stations carry no identity, only
/// the code attributes the source publishes (all optional).
#[derive(Debug, Clone)]
pub struct PointFeature {
    pub location: Point<f64>,
    pub crs: Crs,
    pub status: Option<String>,
    pub access: Option<String>,
    pub fuel_type: Option<String>,
    pub owner_type: Option<String>,
}

/// A polygon region (census tract) with raw variable estimates and
/// derived percentage attributes (0-100, or undefined when the
/// denominator was absent or zero).
#[derive(Debug, Clone)]
pub struct Region {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub crs: Crs,
    pub variables: HashMap<String, Estimate>,
    pub derived: HashMap<String, Option<f64>>,
}

impl Region {
    /// Looks up a numeric attribute by name: derived attributes first,
    /// then raw variable estimates. `None` means the attribute is
    /// undefined for this region.
    pub fn attribute(&self, name: &str) -> Option<f64> {
        if let Some(value) = self.derived.get(name) {
            return *value;
        }
        self.variables.get(name).and_then(|e| e.value)
    }
}

/// A region with its aggregated station count joined on.
#[derive(Debug, Clone)]
pub struct JoinedRegion {
    pub region: Region,
    pub count: u64,
    pub presence: bool,
}

/// 1-based bin indices of a bivariate classification, each in 1..=k.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BivariateClass {
    pub x_bin: usize,
    pub y_bin: usize,
}

/// A joined region with its joint ordinal class label.
#[derive(Debug, Clone)]
pub struct ClassifiedRegion {
    pub joined: JoinedRegion,
    pub class: BivariateClass,
}
