use thiserror::Error;

/// Errors raised while preparing a probe.
///
/// Exchange failures are not represented here; they are classified into
/// [`crate::ErrorKind`] and reported as metric values.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid target name '{target}': {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: hickory_proto::error::ProtoError,
    },
}

/// Result type alias using the probe [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
