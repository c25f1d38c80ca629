use serde::Serialize;

/// Failures that abort a whole request. Everything else degrades.
#[derive(Debug, thiserror::Error)]
pub enum StylistError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Suggestion service unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for StylistError {
    fn from(err: sqlx::Error) -> Self {
        StylistError::Storage(err.to_string())
    }
}

/// Recovered failures reported alongside a successful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    MalformedUpstreamOutput,
    UndecodableImage,
    ClothingAnalysisUnavailable,
    ImageGenerationFailed,
}

impl Degradation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Degradation::MalformedUpstreamOutput => "malformed_upstream_output",
            Degradation::UndecodableImage => "undecodable_image",
            Degradation::ClothingAnalysisUnavailable => "clothing_analysis_unavailable",
            Degradation::ImageGenerationFailed => "image_generation_failed",
        }
    }
}
