use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExifError {
    #[error("Unknown projection type: {0}")]
    UnsupportedProjection(String),
    
    #[error("Calibration for projection '{projection}' is missing '{parameter}'")]
    IncompleteCalibration {
        projection: String,
        parameter: &'static str,
    },
    
    #[error("XMP parse error: {0}")]
    Xmp(String),
    
    #[error("EXIF parse error: {0}")]
    Exif(#[from] exif::Error),
    
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExifError>;
