use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ExtractError {
    #[error("Image could not be decoded: {0}")]
    MalformedImage(String),

    #[error("Engine '{engine}' failed on variant '{variant}': {reason}")]
    EngineUnavailable {
        engine: String,
        variant: String,
        reason: String,
    },

    #[error("No detections found by any engine/variant combination")]
    NoDetectionsFound,

    #[error("Translation failed: {0}")]
    TranslationFailed(String),

    #[error("Entity recognizer failed: {0}")]
    RecognizerFailed(String),

    #[error("Preprocessing failed: {0}")]
    PreprocessingError(String),

    #[error("Failed to initialize OCR engine: {0}")]
    InitializationError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Stable taxonomy name, used as the prefix of rendered diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::MalformedImage(_) => "MalformedImage",
            ExtractError::EngineUnavailable { .. } => "EngineUnavailable",
            ExtractError::NoDetectionsFound => "NoDetectionsFound",
            ExtractError::TranslationFailed(_) => "TranslationFailed",
            ExtractError::RecognizerFailed(_) => "RecognizerFailed",
            ExtractError::PreprocessingError(_) => "PreprocessingError",
            ExtractError::InitializationError(_) => "InitializationError",
            ExtractError::ConfigError(_) => "ConfigError",
            ExtractError::Internal(_) => "Internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_unavailable_message_names_engine_and_variant() {
        let err = ExtractError::EngineUnavailable {
            engine: "tesseract-eng".to_string(),
            variant: "binarized".to_string(),
            reason: "timed out after 50ms".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("tesseract-eng"));
        assert!(message.contains("binarized"));
        assert_eq!(err.kind(), "EngineUnavailable");
    }
}
