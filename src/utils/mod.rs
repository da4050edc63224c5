/// Utility modules for error handling and type conversions
pub mod error;
pub mod type_convert;

// Re-export commonly used types
pub use error::AnalysisError;
pub use type_convert::{is_missing_token, parse_integer, parse_number};
