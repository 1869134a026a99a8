use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading, processing or rendering volumes.
#[derive(Error, Debug)]
pub enum VolumeError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid VTI document: {0}")]
    Vti(String),

    #[error("Invalid DICOM file {path}: {message}")]
    Dicom { path: PathBuf, message: String },

    #[error("No DICOM files found in {0}")]
    EmptyDirectory(PathBuf),

    #[error("Volume of {dims:?} needs {expected} values, got {got}")]
    ShapeMismatch {
        dims: [usize; 3],
        expected: usize,
        got: usize,
    },

    #[error("Unknown {kind} '{name}'")]
    UnknownName { kind: &'static str, name: String },

    #[error("Configuration index {index} out of range (1..={len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Failed to decode base64 data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Failed to serialize configuration: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VolumeError>;

/// Attach `path` to an I/O error.
pub(crate) fn io_err(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> VolumeError {
    let path = path.into();
    move |source| VolumeError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = VolumeError::UnknownName {
            kind: "colormap",
            name: "rainbow".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown colormap 'rainbow'");
        let err = VolumeError::IndexOutOfRange { index: 9, len: 5 };
        assert_eq!(err.to_string(), "Configuration index 9 out of range (1..=5)");
    }

    #[test]
    fn test_io_err_keeps_path() {
        let err = io_err("/tmp/x.vti")(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(err.to_string().starts_with("Failed to access /tmp/x.vti"));
    }
}
