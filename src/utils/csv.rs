// src/utils/csv.rs

use crate::error::AppError;

/// A parsed CSV file: one header row plus data records.
#[derive(Debug)]
pub struct CsvTable {
    headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Parses CSV text into a table. Empty lines are skipped; a file without
    /// a header row is rejected.
    pub fn parse(input: &str) -> Result<Self, AppError> {
        let mut lines = input
            .lines()
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .filter(|l| !l.trim().is_empty());

        let header_line = lines
            .next()
            .ok_or_else(|| AppError::BadRequest("CSV file is empty".to_string()))?;

        let headers = parse_csv_record(header_line)
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();

        let rows = lines.map(parse_csv_record).collect();

        Ok(CsvTable { headers, rows })
    }

    /// Index of a header column, or a `BadRequest` naming the missing column.
    pub fn required_column(&self, name: &str) -> Result<usize, AppError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| AppError::BadRequest(format!("CSV is missing column '{}'", name)))
    }

    /// Optional column lookup for columns that may be absent entirely.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Splits one CSV record into fields, honoring double-quote escaping
/// ("" inside a quoted field is a literal quote).
pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(buf);
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}
