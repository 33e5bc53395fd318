//! Decoder for the line-oriented text the contacts scripts print.
//!
//! ```text
//! DATA|<returned>|<total>        or   EMPTY|0|<total>
//! <name>|<label>: <phone>;...|<label>: <email>;...
//! ```
//!
//! Delimiters inside names or values are not escaped; a `|` in a name shifts
//! the remaining fields.

use crate::{ContactEntry, ContactRecord, DecodeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageHeader {
    Data { returned: usize, total: usize },
    Empty { total: usize },
}

impl PageHeader {
    pub(crate) fn total(self) -> usize {
        match self {
            Self::Data { total, .. } | Self::Empty { total } => total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DecodedPage {
    pub(crate) header: PageHeader,
    pub(crate) records: Vec<ContactRecord>,
}

fn parse_number(raw: &str) -> Result<usize, DecodeError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| DecodeError::BadNumber(raw.trim().to_string()))
}

/// A bare count, as printed by `count of people`.
pub(crate) fn parse_count(raw: &str) -> Result<usize, DecodeError> {
    parse_number(raw)
}

pub(crate) fn parse_header(line: &str) -> Result<PageHeader, DecodeError> {
    let parts: Vec<&str> = line.trim().split('|').collect();
    let [kind, returned, total] = parts.as_slice() else {
        return Err(DecodeError::BadHeader(line.trim().to_string()));
    };
    match kind.trim() {
        "DATA" => Ok(PageHeader::Data {
            returned: parse_number(returned)?,
            total: parse_number(total)?,
        }),
        "EMPTY" => Ok(PageHeader::Empty {
            total: parse_number(total)?,
        }),
        _ => Err(DecodeError::BadHeader(line.trim().to_string())),
    }
}

/// `_$!<Mobile>!$_` → `Mobile`; AppleScript's `missing value` → none.
pub(crate) fn clean_label(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("_$!<")
        .and_then(|rest| rest.strip_suffix(">!$_"))
        .unwrap_or(trimmed)
        .trim();
    if inner.is_empty() || inner == "missing value" {
        None
    } else {
        Some(inner.to_string())
    }
}

pub(crate) fn parse_entries(field: &str) -> Vec<ContactEntry> {
    field
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let (label, value) = match part.split_once(": ") {
                Some((label, value)) => (clean_label(label), value.trim()),
                None => (None, part),
            };
            (!value.is_empty()).then(|| ContactEntry {
                label,
                value: value.to_string(),
            })
        })
        .collect()
}

pub(crate) fn parse_record(line: &str) -> ContactRecord {
    let mut fields = line.splitn(3, '|');
    let name = fields.next().unwrap_or_default().trim().to_string();
    let phones = fields.next().map(parse_entries).unwrap_or_default();
    let emails = fields.next().map(parse_entries).unwrap_or_default();
    ContactRecord {
        name,
        phones,
        emails,
    }
}

pub(crate) fn decode_page(raw: &str) -> Result<DecodedPage, DecodeError> {
    let mut lines = raw.lines().map(str::trim).filter(|line| !line.is_empty());
    let header = parse_header(lines.next().ok_or(DecodeError::MissingHeader)?)?;
    let records = match header {
        PageHeader::Empty { .. } => Vec::new(),
        PageHeader::Data { .. } => lines.map(parse_record).collect(),
    };
    Ok(DecodedPage { header, records })
}
