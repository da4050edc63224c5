/// Cell texts treated as missing when reading CSV input
pub const MISSING_TOKENS: [&str; 9] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None", "#N/A"];

/// Check whether a raw cell should be read as a missing value
pub fn is_missing_token(raw: &str) -> bool {
    MISSING_TOKENS.contains(&raw.trim())
}

/// Parse a cell as an integer, ignoring surrounding whitespace
pub fn parse_integer(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}

/// Parse a cell as a finite floating point number
///
/// # Returns
/// * `Some(value)` for decimal and scientific notation
/// * `None` for text, empty cells and non-finite spellings such as `inf`
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tokens() {
        assert!(is_missing_token(""));
        assert!(is_missing_token("  NA "));
        assert!(is_missing_token("NaN"));
        assert!(!is_missing_token("0"));
        assert!(!is_missing_token("abc"));
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer("42"), Some(42));
        assert_eq!(parse_integer(" -7 "), Some(-7));
        assert_eq!(parse_integer("4.5"), None);
        assert_eq!(parse_integer("abc"), None);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("12.5"), Some(12.5));
        assert_eq!(parse_number(" 1e3 "), Some(1000.0));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("inf"), None);
    }
}
