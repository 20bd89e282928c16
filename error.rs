use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Decode Error: {0}")]
    Decode(String),

    #[error("Encode Error: {0}")]
    Encode(String),

    #[error("Preprocess Error: {0}")]
    Preprocess(String),

    #[error("Model Unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Inference Error: {0}")]
    Inference(String),

    #[error("Remote Detection Error: {0}")]
    RemoteApi(String),

    #[error("Watermark Error: {0}")]
    Watermark(String),

    #[error("Config Error: {0}")]
    Config(String),

    #[error("Processing Error: {0}")]
    Processing(String),

    #[error("Initialization Failed: {0}")]
    Init(String),
}

impl Error {
    /// Errors raised while detecting plates. The pipeline absorbs these into an
    /// empty region list instead of failing the upload.
    pub fn is_detection_failure(&self) -> bool {
        matches!(
            self,
            Self::ModelUnavailable(_) | Self::Inference(_) | Self::RemoteApi(_) | Self::Preprocess(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::RemoteApi(format!("{err}"))
    }
}
