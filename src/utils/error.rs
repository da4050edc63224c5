use std::fmt;

/// Error type for loading the model bundle and scoring tables
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Validation errors (e.g., empty input, bad parameters)
    ValidationError(String),
    /// Input table does not match what a pipeline step expects
    SchemaError(String),
    /// Scoring or matrix computation errors
    ModelError(String),
    /// Model artifact could not be read or resolved
    ArtifactError(String),
    /// CSV input could not be parsed
    CsvError(String),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::ValidationError(msg) => write!(f, "ValidationError: {}", msg),
            AnalysisError::SchemaError(msg) => write!(f, "SchemaError: {}", msg),
            AnalysisError::ModelError(msg) => write!(f, "ModelError: {}", msg),
            AnalysisError::ArtifactError(msg) => write!(f, "ArtifactError: {}", msg),
            AnalysisError::CsvError(msg) => write!(f, "CsvError: {}", msg),
        }
    }
}

impl std::error::Error for AnalysisError {}

impl From<csv::Error> for AnalysisError {
    fn from(err: csv::Error) -> Self {
        AnalysisError::CsvError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnalysisError::ValidationError("records is empty".to_string());
        assert_eq!(err.to_string(), "ValidationError: records is empty");

        let err = AnalysisError::SchemaError("column 'DMBTR' not found".to_string());
        assert_eq!(err.to_string(), "SchemaError: column 'DMBTR' not found");

        let err = AnalysisError::ArtifactError("unknown step".to_string());
        assert_eq!(err.to_string(), "ArtifactError: unknown step");
    }

    #[test]
    fn test_csv_error_conversion() {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader("a,b\n1,2,3\n".as_bytes());
        let err = reader.records().next().unwrap().unwrap_err();
        let converted: AnalysisError = err.into();
        assert!(matches!(converted, AnalysisError::CsvError(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<AnalysisError>();
        assert_sync::<AnalysisError>();
    }
}
