use crate::syntax::DocumentId;
use thiserror::Error;

/// Errors from the outer, fallible surface of the engine.
///
/// Inference and resolution never fail; they degrade to `unknown`.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            AnalysisError::ModuleNotFound("a.b".to_string()).to_string(),
            "Module not found: a.b"
        );
        assert_eq!(
            AnalysisError::DocumentNotFound(DocumentId(3)).to_string(),
            "Document not found: doc#3"
        );
    }

    #[test]
    fn test_io_error_converts() {
        fn read() -> Result<String, AnalysisError> {
            Ok(std::fs::read_to_string("/definitely/not/here.lua")?)
        }
        assert!(matches!(read(), Err(AnalysisError::Io(_))));
    }
}
