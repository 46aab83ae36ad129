use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConditioningError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Missing garment image: {0}")]
    MissingGarment(&'static str),

    #[error("Image {name} has zero extent ({width}x{height})")]
    EmptyImage {
        name: &'static str,
        width: u32,
        height: u32,
    },

    #[error("Invalid target resolution {width}x{height}")]
    InvalidResolution { width: usize, height: usize },

    #[error("Shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Tensor data error: {0}")]
    TensorData(String),
}
