use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use std::io::Read;

use crate::members::MemberId;

/// Parsed attendance row.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub line: usize,
    pub event_id: String,
    pub member_id: MemberId,
    pub attended: bool,
    pub checked_in_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub(crate) enum ParseError {
    Csv(csv::Error),
    Row { line: usize, reason: String },
}

pub(crate) fn parse_records<R: Read>(reader: R) -> Result<Vec<AttendanceRecord>, ParseError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();

    for (index, record) in csv_reader.deserialize::<AttendanceRow>().enumerate() {
        // header is line 1
        let line = index + 2;
        let row = record.map_err(ParseError::Csv)?;

        let Some(event_id) = row.event_id else {
            return Err(ParseError::Row {
                line,
                reason: "Event ID is required".to_string(),
            });
        };
        let Some(member_id) = row.member_id else {
            return Err(ParseError::Row {
                line,
                reason: "Member ID is required".to_string(),
            });
        };
        let attended = match row.attended.as_deref() {
            None => row.checked_in_at.is_some(),
            Some(raw) => parse_flag(raw).ok_or_else(|| ParseError::Row {
                line,
                reason: format!("Attended value '{raw}' is not a yes/no flag"),
            })?,
        };
        let checked_in_at = match row.checked_in_at.as_deref() {
            None => None,
            Some(raw) => Some(parse_datetime(raw).ok_or_else(|| ParseError::Row {
                line,
                reason: format!("Checked In At value '{raw}' is not a date or timestamp"),
            })?),
        };

        records.push(AttendanceRecord {
            line,
            event_id,
            member_id: MemberId(member_id),
            attended,
            checked_in_at,
        });
    }

    Ok(records)
}

#[derive(Debug, Deserialize)]
struct AttendanceRow {
    #[serde(rename = "Event ID", default, deserialize_with = "empty_string_as_none")]
    event_id: Option<String>,
    #[serde(rename = "Member ID", default, deserialize_with = "empty_string_as_none")]
    member_id: Option<String>,
    #[serde(rename = "Attended", default, deserialize_with = "empty_string_as_none")]
    attended: Option<String>,
    #[serde(
        rename = "Checked In At",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    checked_in_at: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "1" | "x" | "attended" => Some(true),
        "no" | "n" | "false" | "0" | "absent" => Some(false),
        _ => None,
    }
}

fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
