use thiserror::Error;

#[derive(Error, Debug)]
pub enum LanternError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Model service unreachable: {0}")]
    ModelUnavailable(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Tool error: {0}")]
    Tool(String),

    /// A tool declined to run the input. The message is the observation.
    #[error("{0}")]
    Refused(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Document error: {0}")]
    Document(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl LanternError {
    /// Whether this error means the model service cannot be reached.
    ///
    /// Connectivity failures abort the whole pipeline; every other error is
    /// absorbed into the agent transcript or a degraded response.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, LanternError::ModelUnavailable(_))
    }
}

impl serde::Serialize for LanternError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LanternError>;
