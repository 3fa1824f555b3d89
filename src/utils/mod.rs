use axum::http::{header, HeaderMap};
use chrono::NaiveDate;

/// Formats a date as "dd Mon yyyy" for display.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

/// Whether the client asked for a JSON reply (XHR or an `Accept` header).
pub fn wants_json(headers: &HeaderMap) -> bool {
    let xhr = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
    let accepts = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    xhr || accepts
}

/// Trims a form field, treating blank input as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses a requested quantity; missing, unparsable or zero input means 1.
pub fn parse_quantity(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|q| *q != 0)
        .unwrap_or(1)
}

/// Parses a stock level. Blank input yields `None`.
pub fn parse_stock(raw: Option<&str>) -> Result<Option<i64>, &'static str> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let stock: i64 = raw.parse().map_err(|_| "Stock must be a whole number")?;
    if stock < 0 {
        return Err("Stock cannot be negative");
    }
    Ok(Some(stock))
}

/// Parses an id from a form field.
pub fn parse_id(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse().ok())
}
