use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, TimeZone, Utc};

pub type Timestamp = DateTime<Utc>;

const DISPLAY_FORMAT: &str = "%b %-d, %Y %H:%M";
const DISPLAY_PARSE_FORMAT: &str = "%b %d, %Y %H:%M";

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Normalizes free text typed by the user: CRLF becomes LF, control characters other than
/// newline and tab are dropped, surrounding whitespace is trimmed. Applying it twice is a no-op.
pub fn sanitize_text(input: &str) -> String {
    let cleaned: String = input
        .replace("\r\n", "\n")
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    cleaned.trim().to_string()
}

/// Current time at millisecond precision, so it survives a trip through its ISO-8601 form.
pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(3)
}

pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(3))
}

/// Human-readable date used by the CSV export, e.g. `Jan 5, 2024 14:30` (UTC).
pub fn format_display_date(ts: &Timestamp) -> String {
    ts.format(DISPLAY_FORMAT).to_string()
}

pub fn parse_display_date(raw: &str) -> Option<Timestamp> {
    NaiveDateTime::parse_from_str(raw.trim(), DISPLAY_PARSE_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_id_is_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn sanitize_text_trims_and_drops_control_characters() {
        assert_eq!(sanitize_text("  hello  "), "hello");
        assert_eq!(sanitize_text("a\u{0}b\u{7}c"), "abc");
        assert_eq!(sanitize_text("line1\r\nline2\tend\r"), "line1\nline2\tend");
        assert_eq!(sanitize_text(" \u{0} x"), "x");
        assert_eq!(sanitize_text("Buy \"milk\", eggs"), "Buy \"milk\", eggs");
        assert_eq!(sanitize_text("   "), "");

        let once = sanitize_text(" \u{1b} padded \n ");
        assert_eq!(sanitize_text(&once), once);
    }

    #[test]
    fn timestamps_round_trip_through_iso_strings() {
        let ts = now();
        let raw = format_timestamp(&ts);
        assert!(raw.ends_with('Z'));
        assert_eq!(parse_timestamp(&raw), Some(ts));

        let js_style = parse_timestamp("2024-03-01T10:20:30.123Z").unwrap();
        assert_eq!(format_timestamp(&js_style), "2024-03-01T10:20:30.123Z");

        let with_offset = parse_timestamp("2024-03-01T12:20:30+02:00").unwrap();
        assert_eq!(format_timestamp(&with_offset), "2024-03-01T10:20:30.000Z");

        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn display_dates_are_human_readable_and_parse_back() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 5, 14, 30, 59).single().unwrap();
        let shown = format_display_date(&ts);
        assert_eq!(shown, "Jan 5, 2024 14:30");

        let back = parse_display_date(&shown).unwrap();
        assert_eq!(back, Utc.with_ymd_and_hms(2024, 1, 5, 14, 30, 0).single().unwrap());
        assert_eq!(parse_display_date("not a date"), None);
    }
}
