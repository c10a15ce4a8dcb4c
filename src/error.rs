use thiserror::Error;

/// Failure to obtain a model handle from a [`ModelProvider`](crate::provider::ModelProvider).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("model resource not found: {0}")]
    NotFound(String),
    #[error("model download failed: {0}")]
    Download(String),
    #[error("unsupported model file {0}: expected a `.mpk` record")]
    Unsupported(String),
    #[error("model record could not be decoded: {0}")]
    Decode(String),
    #[error("io error while loading model: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure raised by a model while running.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("missing input tensor `{0}`")]
    MissingInput(String),
    #[error("input shape {found:?} does not match expected {expected:?}")]
    Shape {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("model runtime error: {0}")]
    Runtime(String),
}

/// Everything that can abort a single prediction request.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("resampling failed: {0}")]
    Resampling(String),
    #[error("model unavailable: {0}")]
    ModelUnavailable(#[from] LoadError),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("invalid bitmap: {0}")]
    Bitmap(String),
    #[error("invalid sketch: {0}")]
    Sketch(String),
}

impl From<RunError> for PipelineError {
    fn from(err: RunError) -> Self {
        PipelineError::Inference(err.to_string())
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
