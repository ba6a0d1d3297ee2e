use chrono::NaiveDate;

use crate::{Error, Result};

/// Parse a calendar date in `YYYY-MM-DD` form.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| {
        Error::Validation(format!(
            "Invalid date '{}': expected YYYY-MM-DD",
            input
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        let date = parse_date("2024-03-01").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        let err = parse_date("01/03/2024").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert!(parse_date("2024-02-30").is_err());
    }
}
