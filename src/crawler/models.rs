use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("Record is not a JSON object")]
    NotAnObject,

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid hex in {field}: {value}")]
    InvalidHex { field: &'static str, value: String },

    #[error("Invalid number in {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },
}

/// One page of history as returned by the explorer.
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    /// `None` when the API answered `"result": null`.
    pub records: Option<Vec<Value>>,
}

/// Raw explorer response envelope.
#[derive(Debug, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Value,
}

/// A transfer extracted from a history record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub from: Vec<u8>,
    /// Empty for contract creations.
    pub to: Option<Vec<u8>>,
    pub hash: Vec<u8>,
    pub amount: u128,
    pub block_number: u64,
}

/// Parsed records of a page plus how many had to be skipped.
#[derive(Debug, Default)]
pub struct ExtractedPage {
    pub records: Vec<ParsedRecord>,
    pub skipped: usize,
    /// Highest readable block on the page, skipped records included.
    pub highest_block: Option<u64>,
}

impl ExtractedPage {
    /// Running watermark: the highest block seen, never below `current`.
    pub fn watermark(&self, current: u64) -> u64 {
        self.highest_block.map_or(current, |block| block.max(current))
    }

    fn observe_block(&mut self, block: u64) {
        self.highest_block = Some(self.highest_block.map_or(block, |seen| seen.max(block)));
    }
}

/// Parses every record of a page, skipping (and logging) malformed ones.
pub fn extract_page(records: &[Value], task_id: i64, url: &str) -> ExtractedPage {
    let mut page = ExtractedPage::default();

    for record in records {
        match parse_record(record) {
            Ok(parsed) => {
                page.observe_block(parsed.block_number);
                page.records.push(parsed);
            }
            Err(e) => {
                warn!("Task {}: skipping malformed record from {}: {} ({})", task_id, url, e, record);
                page.skipped += 1;
                // A bad address must not hold the cursor back
                if let Ok(block) = parse_block(record) {
                    page.observe_block(block);
                }
            }
        }
    }

    page
}

pub fn parse_record(record: &Value) -> Result<ParsedRecord, RecordError> {
    let object = record.as_object().ok_or(RecordError::NotAnObject)?;

    let from = match object.get("from").and_then(Value::as_str) {
        Some(value) => parse_address("from", value)?,
        None => return Err(RecordError::MissingField("from")),
    };

    let to = match object.get("to") {
        Some(Value::String(value)) if !value.trim().is_empty() => Some(parse_address("to", value)?),
        Some(Value::String(_)) | Some(Value::Null) => None,
        Some(other) => {
            return Err(RecordError::InvalidHex {
                field: "to",
                value: other.to_string(),
            })
        }
        None => return Err(RecordError::MissingField("to")),
    };

    let hash = match object.get("hash").and_then(Value::as_str) {
        Some(value) => parse_address("hash", value)?,
        None => return Err(RecordError::MissingField("hash")),
    };

    let amount = match object.get("value").or_else(|| object.get("amount")) {
        Some(value) => parse_quantity("value", value)?,
        None => return Err(RecordError::MissingField("value")),
    };

    let block_number = parse_block(record)?;

    Ok(ParsedRecord {
        from,
        to,
        hash,
        amount,
        block_number,
    })
}

/// Block number of a record. Blocks are stored as SQLite INTEGER, so values
/// past `i64::MAX` are rejected.
pub fn parse_block(record: &Value) -> Result<u64, RecordError> {
    let value = record
        .get("blockNumber")
        .ok_or(RecordError::MissingField("blockNumber"))?;
    let block = parse_quantity("blockNumber", value)?;

    i64::try_from(block)
        .ok()
        .and_then(|block| u64::try_from(block).ok())
        .ok_or_else(|| RecordError::InvalidNumber {
            field: "blockNumber",
            value: value.to_string(),
        })
}

/// Decodes a hex identifier, tolerating a `0x` prefix and a `chain:` qualifier
/// (e.g. `arbitrum:0xabc`).
pub fn parse_address(field: &'static str, value: &str) -> Result<Vec<u8>, RecordError> {
    let invalid = || RecordError::InvalidHex {
        field,
        value: value.to_string(),
    };

    let trimmed = value.trim();
    let unqualified = trimmed.rsplit(':').next().unwrap_or(trimmed);
    let digits = unqualified
        .strip_prefix("0x")
        .or_else(|| unqualified.strip_prefix("0X"))
        .unwrap_or(unqualified);

    if digits.is_empty() {
        return Err(invalid());
    }

    hex::decode(digits).map_err(|_| invalid())
}

/// Integers arrive as JSON numbers, decimal strings or `0x` hex strings.
pub fn parse_quantity(field: &'static str, value: &Value) -> Result<u128, RecordError> {
    let invalid = || RecordError::InvalidNumber {
        field,
        value: value.to_string(),
    };

    match value {
        Value::Number(number) => number.as_u64().map(u128::from).ok_or_else(invalid),
        Value::String(text) => {
            let text = text.trim();
            match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                Some(digits) => u128::from_str_radix(digits, 16).map_err(|_| invalid()),
                None => text.parse::<u128>().map_err(|_| invalid()),
            }
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_explorer_record() {
        let record = json!({
            "from": "0xAA",
            "to": "0xBB",
            "hash": "0x01",
            "value": "100",
            "blockNumber": "5"
        });

        let parsed = parse_record(&record).unwrap();
        assert_eq!(parsed.from, vec![0xaa]);
        assert_eq!(parsed.to, Some(vec![0xbb]));
        assert_eq!(parsed.hash, vec![0x01]);
        assert_eq!(parsed.amount, 100);
        assert_eq!(parsed.block_number, 5);
    }

    #[test]
    fn strips_chain_qualifier_and_accepts_integers() {
        let record = json!({
            "from": "arbitrum:0x0a0b",
            "to": "0X0c",
            "hash": "ff",
            "amount": 7,
            "blockNumber": "0x10"
        });

        let parsed = parse_record(&record).unwrap();
        assert_eq!(parsed.from, vec![0x0a, 0x0b]);
        assert_eq!(parsed.to, Some(vec![0x0c]));
        assert_eq!(parsed.hash, vec![0xff]);
        assert_eq!(parsed.amount, 7);
        assert_eq!(parsed.block_number, 16);
    }

    #[test]
    fn amounts_beyond_u64_survive() {
        let wei = "340282366920938463463374607431768211455";
        let parsed = parse_quantity("value", &json!(wei)).unwrap();
        assert_eq!(parsed, u128::MAX);
    }

    #[test]
    fn contract_creation_has_no_recipient() {
        let record = json!({
            "from": "0xaa",
            "to": "",
            "hash": "0x02",
            "value": "0",
            "blockNumber": "9"
        });

        assert_eq!(parse_record(&record).unwrap().to, None);
    }

    #[test]
    fn malformed_records_report_the_field() {
        let bad_hex = json!({"from": "0xZZ", "to": "0xbb", "hash": "0x01", "value": "1", "blockNumber": "1"});
        assert!(matches!(
            parse_record(&bad_hex),
            Err(RecordError::InvalidHex { field: "from", .. })
        ));

        let missing = json!({"from": "0xaa", "to": "0xbb", "value": "1", "blockNumber": "1"});
        assert_eq!(parse_record(&missing), Err(RecordError::MissingField("hash")));

        let bad_block = json!({"from": "0xaa", "to": "0xbb", "hash": "0x01", "value": "1", "blockNumber": "soon"});
        assert!(matches!(
            parse_record(&bad_block),
            Err(RecordError::InvalidNumber { field: "blockNumber", .. })
        ));
    }

    #[test]
    fn extraction_skips_bad_records_and_tracks_watermark() {
        let records = vec![
            json!({"from": "0xaa", "to": "0xbb", "hash": "0x01", "value": "1", "blockNumber": "12"}),
            json!({"from": "nothex", "to": "0xbb", "hash": "0x02", "value": "1", "blockNumber": "99"}),
            json!({"from": "0xbb", "to": "0xaa", "hash": "0x03", "value": "2", "blockNumber": "15"}),
        ];

        let page = extract_page(&records, 1, "http://x/?start=10");
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.skipped, 1);
        assert_eq!(page.watermark(10), 99);
        assert_eq!(page.watermark(120), 120);
    }

    #[test]
    fn unreadable_blocks_do_not_count_toward_the_watermark() {
        let records = vec![
            json!({"from": "0xaa", "to": "0xbb", "hash": "0x01", "value": "1", "blockNumber": "4"}),
            json!({"from": "0xaa", "to": "0xbb", "hash": "0x02", "value": "1", "blockNumber": "later"}),
        ];

        let page = extract_page(&records, 1, "http://x/?start=0");
        assert_eq!(page.skipped, 1);
        assert_eq!(page.watermark(0), 4);
        assert_eq!(extract_page(&[], 1, "http://x/").watermark(7), 7);
    }

    #[test]
    fn blocks_past_i64_range_are_rejected() {
        let huge = json!({
            "from": "0xaa",
            "to": "0xbb",
            "hash": "0x01",
            "value": "1",
            "blockNumber": "9223372036854775808"
        });
        assert!(matches!(
            parse_record(&huge),
            Err(RecordError::InvalidNumber { field: "blockNumber", .. })
        ));

        let largest = json!({"blockNumber": "9223372036854775807"});
        assert_eq!(parse_block(&largest).unwrap(), i64::MAX as u64);

        // A skipped oversized block leaves the watermark alone
        let page = extract_page(&[huge], 1, "http://x/");
        assert_eq!(page.watermark(3), 3);
    }
}
