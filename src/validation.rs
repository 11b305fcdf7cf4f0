use crate::crawler::models::parse_address;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid address format: {0}")]
    InvalidAddress(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Decodes a hex address (`0x` prefix and `chain:` qualifier optional).
pub fn validate_address(address: &str) -> Result<Vec<u8>, ValidationError> {
    if address.trim().is_empty() {
        return Err(ValidationError::MissingParameter("address".to_string()));
    }

    parse_address("address", address)
        .map_err(|_| ValidationError::InvalidAddress(address.to_string()))
}

/// Splits a comma separated list of titles, dropping blanks and duplicates.
pub fn parse_titles(raw: Option<&str>) -> Vec<String> {
    let mut titles: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .collect();
    titles.sort();
    titles.dedup();
    titles
}

pub fn validate_offset(offset: Option<i64>) -> Result<i64, ValidationError> {
    match offset {
        Some(v) if v < 0 => Err(ValidationError::InvalidParameter(
            "offset must not be negative".to_string(),
        )),
        Some(v) => Ok(v),
        None => Ok(0),
    }
}

pub fn validate_limit(limit: Option<i64>) -> Result<i64, ValidationError> {
    match limit {
        Some(v) if !(1..=1000).contains(&v) => Err(ValidationError::InvalidParameter(
            "limit must be between 1 and 1000".to_string(),
        )),
        Some(v) => Ok(v),
        None => Ok(100),
    }
}
