use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplatError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Out of range: {0}")]
    OutOfRange(String),
    #[error("Codec error: {0}")]
    CodecError(String),
}

pub type Status = Result<(), SplatError>;

impl From<std::io::Error> for SplatError {
    fn from(err: std::io::Error) -> Self {
        SplatError::IoError(err.to_string())
    }
}

pub fn ok_status() -> Status {
    Ok(())
}

pub fn invalid_parameter(msg: impl Into<String>) -> SplatError {
    SplatError::InvalidParameter(msg.into())
}

pub fn error_status(msg: impl Into<String>) -> SplatError {
    SplatError::CodecError(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = invalid_parameter("bad stride");
        assert_eq!(format!("{}", err), "Invalid parameter: bad stride");
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.ply");
        let err: SplatError = io_err.into();
        assert!(matches!(err, SplatError::IoError(_)));
    }
}
