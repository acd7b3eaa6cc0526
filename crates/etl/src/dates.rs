//! Date normalization for onboarding and transaction columns.
//!
//! Parsing never fails loudly: anything that is not a `yyyy-MM-dd` date
//! (optionally followed by a time component) becomes `None`.

use chrono::NaiveDate;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a raw column value into a calendar date.
pub fn normalize_date(raw: Option<&str>) -> Option<NaiveDate> {
    let value = raw?.trim();
    if value.is_empty() {
        return None;
    }

    // Timestamps such as "2022-03-01 10:15:00" or "2022-03-01T10:15:00"
    // keep only their date part.
    let date_part = match value.char_indices().nth(10) {
        Some((idx, sep)) if sep == ' ' || sep == 'T' => &value[..idx],
        Some(_) => return None,
        None => value,
    };

    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}
