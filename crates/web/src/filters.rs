//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// First letter of a name, upper-cased, for avatar placeholders.
///
/// Usage in templates: `{{ post.author_name()|initial }}`
#[askama::filter_fn]
pub fn initial(name: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(name
        .to_string()
        .trim_start_matches('@')
        .chars()
        .next()
        .map_or_else(|| "?".to_string(), |c| c.to_uppercase().collect()))
}

/// Compact timestamp for feeds, e.g. `3 Mar 2026, 14:05`.
///
/// Usage in templates: `{{ post.created_at|short_date }}`
#[askama::filter_fn]
pub fn short_date(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    // `DateTime<Utc>` displays as `2026-03-03 14:05:09.123 UTC`
    let raw = value.to_string();
    let naive = raw.strip_suffix(" UTC").unwrap_or(&raw);
    Ok(
        chrono::NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f")
            .map_or_else(|_| raw.clone(), |d| d.format("%-d %b %Y, %H:%M").to_string()),
    )
}
