use thiserror::Error;

/// Fatal pipeline errors. Each one is a data-integrity precondition:
/// if violated, downstream results would be meaningless rather than
/// degraded, so nothing is retried or recovered locally.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("point record {index} is missing required location field '{field}'")]
    MalformedRecord { index: usize, field: &'static str },

    #[error("region id '{id}' appears more than once with differing geometry")]
    DuplicateIdentifier { id: String },

    #[error("coordinate reference systems differ: points use '{points}', regions use '{regions}'")]
    CoordinateSystemMismatch { points: String, regions: String },

    #[error("'{name}' is not a configured derived attribute or fetched variable")]
    UnknownAttribute { name: String },

    #[error("cannot compute {k} classes for field '{field}': only {distinct} distinct defined values")]
    InsufficientData {
        field: String,
        k: usize,
        distinct: usize,
    },
}
