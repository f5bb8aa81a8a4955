//! Participant CSV parsing.
//!
//! Expects a header row with an `email` column and an optional
//! `display_name` column. Cells are trimmed and blank lines are ignored.

use serde::Deserialize;

use crate::db::ParticipantImport;
use crate::errors::AppError;

/// Maximum accepted upload size.
pub const MAX_CSV_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

/// Rows ready to import plus one message per rejected row.
#[derive(Debug, Default)]
pub struct ParsedCsv {
    pub rows: Vec<ParticipantImport>,
    pub errors: Vec<String>,
}

/// Parse an uploaded participant list.
///
/// Fails only if the file has no `email` header; bad rows are reported in
/// [`ParsedCsv::errors`] and skipped.
pub fn parse_participants(data: &[u8]) -> Result<ParsedCsv, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data);

    let headers = reader
        .headers()
        .map_err(|e| AppError::BadRequest(format!("Invalid CSV: {}", e)))?
        .clone();
    if !headers.iter().any(|h| h == "email") {
        return Err(AppError::BadRequest(
            "CSV must have an email column".to_string(),
        ));
    }

    let mut parsed = ParsedCsv::default();
    for (index, result) in reader.records().enumerate() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                parsed.errors.push(format!("Row {}: {}", index + 2, e));
                continue;
            }
        };
        // Physical line in the file, counting skipped blank lines.
        let line = raw
            .position()
            .map_or(index as u64 + 2, |position| position.line());
        let record: CsvRecord = match raw.deserialize(Some(&headers)) {
            Ok(record) => record,
            Err(e) => {
                parsed.errors.push(format!("Row {}: {}", line, e));
                continue;
            }
        };

        match record.email.filter(|email| !email.is_empty()) {
            Some(email) => parsed.rows.push(ParticipantImport {
                email,
                display_name: record.display_name.filter(|name| !name.is_empty()),
            }),
            None => parsed.errors.push(format!("Row {} missing email", line)),
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let data = b"email,display_name\nalice@example.com,Alice Johnson\n  bob@example.com , Bob \n";
        let parsed = parse_participants(data).unwrap();

        assert!(parsed.errors.is_empty());
        assert_eq!(
            parsed.rows,
            vec![
                ParticipantImport {
                    email: "alice@example.com".to_string(),
                    display_name: Some("Alice Johnson".to_string()),
                },
                ParticipantImport {
                    email: "bob@example.com".to_string(),
                    display_name: Some("Bob".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_missing_email_is_reported() {
        let data = b"email,display_name\n,Nobody\ncarol@example.com,\n";
        let parsed = parse_participants(data).unwrap();

        assert_eq!(parsed.errors, vec!["Row 2 missing email".to_string()]);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].display_name, None);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let data = b"email\n\ndave@example.com\n\n";
        let parsed = parse_participants(data).unwrap();

        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.rows.len(), 1);
    }

    #[test]
    fn test_error_line_counts_blank_lines() {
        let data = b"email,display_name\n\n\nalice@example.com,A\n,Nobody\n";
        let parsed = parse_participants(data).unwrap();

        assert_eq!(parsed.errors, vec!["Row 5 missing email".to_string()]);
        assert_eq!(parsed.rows.len(), 1);
    }

    #[test]
    fn test_requires_email_header() {
        let data = b"name\nAlice\n";
        let err = parse_participants(data).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
