//! Telemetry record parsing.
//!
//! One record is a comma-separated list of `key: value` pairs, e.g.
//! `Light Detected: 1, Soil Humidity: 42.5, Distance: 33.0`. Some firmware
//! revisions emit the same fields as a JSON object instead, so that form is
//! tried first. Keys are matched case-insensitively with whitespace and
//! brackets ignored; unknown keys are skipped.

use serde_json::Value;

/// Keys accepted for the light flag.
const LIGHT_KEYS: &[&str] = &["light", "light_val", "lightdetected", "lightval"];

/// Keys accepted for the soil humidity percentage.
const SOIL_KEYS: &[&str] = &["soil", "soil_val", "soilhumidity", "soilval"];

/// Keys accepted for the distance reading.
const DISTANCE_KEYS: &[&str] = &["distance", "distance_cm", "range", "distance(cm)"];

/// A partial telemetry update parsed from one record.
///
/// `None` fields were absent or unparsable and must not disturb previously
/// known values. An update with no recognized field at all is noise.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryUpdate {
    /// Light detected flag (wire value 0/1).
    pub light: Option<bool>,
    /// Soil humidity in percent, clamped to [0, 100].
    pub soil_pct: Option<f64>,
    /// Obstacle distance in centimeters, never negative.
    pub distance_cm: Option<f64>,
}

impl TelemetryUpdate {
    /// Returns true if no recognized field was present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.light.is_none() && self.soil_pct.is_none() && self.distance_cm.is_none()
    }
}

/// Parses one framed record into a [`TelemetryUpdate`].
///
/// Never fails: a record with no recognized content parses to an empty
/// update, which callers treat as noise.
#[must_use]
pub fn parse_line(line: &str) -> TelemetryUpdate {
    let line = line.trim();
    if line.is_empty() {
        return TelemetryUpdate::default();
    }

    if let Some(update) = parse_json_object(line) {
        return update;
    }
    parse_key_values(line)
}

/// Returns true for a non-empty record that cannot plausibly hold telemetry.
///
/// Single characters and separator-free fragments are the typical result of
/// a baud mismatch or a half-torn connection, and a run of them is grounds
/// for reopening the link rather than parsing on.
#[must_use]
pub fn looks_corrupt(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && (line.len() < 5 || !line.contains([':', '{', '[']))
}

/// Accepts `{"light": 1, "soil": 0.42}`-style records.
fn parse_json_object(line: &str) -> Option<TelemetryUpdate> {
    let value: Value = serde_json::from_str(line).ok()?;
    let map = value.as_object()?;

    let mut fields = TelemetryUpdate::default();
    for (key, value) in map {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        assign(&mut fields, &normalize_key(key), &text);
    }
    Some(fields)
}

/// Accepts the comma-separated `key: value` wire form.
fn parse_key_values(line: &str) -> TelemetryUpdate {
    let mut fields = TelemetryUpdate::default();
    for part in line.split(',') {
        let Some((key, value)) = part.split_once(':') else {
            continue;
        };
        assign(&mut fields, &normalize_key(key), value);
    }
    fields
}

/// Lowercases and strips whitespace and brackets, so `Light Detected` and
/// `lightdetected` normalize the same way.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace() && *c != '[' && *c != ']')
        .flat_map(char::to_lowercase)
        .collect()
}

fn assign(fields: &mut TelemetryUpdate, key: &str, value: &str) {
    if LIGHT_KEYS.contains(&key) {
        if let Some(number) = coerce_numeric(value) {
            fields.light = Some(number != 0.0);
        }
    } else if SOIL_KEYS.contains(&key) {
        if let Some(number) = coerce_numeric(value) {
            fields.soil_pct = Some(scale_soil(number));
        }
    } else if DISTANCE_KEYS.contains(&key) {
        if let Some(number) = coerce_numeric(value) {
            if number >= 0.0 {
                fields.distance_cm = Some(number);
            }
        }
    }
}

/// A reading at or below 1.0 is a 0-1 ratio from older firmware; everything
/// is clamped to a percentage.
fn scale_soil(value: f64) -> f64 {
    let pct = if value <= 1.0 { value * 100.0 } else { value };
    pct.clamp(0.0, 100.0)
}

/// Extracts the first signed decimal number embedded in the value text,
/// tolerating unit suffixes (`"33.0cm"`) and stray brackets.
fn coerce_numeric(value: &str) -> Option<f64> {
    let bytes = value.as_bytes();
    let mut start = None;
    for (i, &b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() || (b == b'-' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            start = Some(i);
            break;
        }
    }
    let start = start?;

    let mut end = start;
    let mut seen_dot = false;
    for &b in &bytes[start..] {
        match b {
            b'-' if end == start => end += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            b if b.is_ascii_digit() => end += 1,
            _ => break,
        }
    }

    value[start..end].trim_end_matches('.').parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_record() {
        let update = parse_line("Light Detected: 1, Soil Humidity: 42.5, Distance: 33.0");

        assert_eq!(update.light, Some(true));
        assert_eq!(update.soil_pct, Some(42.5));
        assert_eq!(update.distance_cm, Some(33.0));
    }

    #[test]
    fn test_case_and_spacing_insensitive() {
        let update = parse_line("light detected:0,SOIL HUMIDITY : 70");

        assert_eq!(update.light, Some(false));
        assert_eq!(update.soil_pct, Some(70.0));
        assert_eq!(update.distance_cm, None);
    }

    #[test]
    fn test_partial_record_leaves_other_fields_unknown() {
        let update = parse_line("Distance: 12.0");

        assert_eq!(update.distance_cm, Some(12.0));
        assert_eq!(update.light, None);
        assert_eq!(update.soil_pct, None);
        assert!(!update.is_empty());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let update = parse_line("Water Level: 3, Light Detected: 1");

        assert_eq!(update.light, Some(true));
        assert_eq!(update.soil_pct, None);
    }

    #[test]
    fn test_no_recognized_keys_is_noise() {
        assert!(parse_line("Water Level: 3").is_empty());
        assert!(parse_line("hello world").is_empty());
        assert!(parse_line("").is_empty());
    }

    #[test]
    fn test_soil_ratio_scaled() {
        assert_eq!(parse_line("soil: 0.42").soil_pct, Some(42.0));
        assert_eq!(parse_line("soil: 1.0").soil_pct, Some(100.0));
        assert_eq!(parse_line("soil: 250").soil_pct, Some(100.0));
    }

    #[test]
    fn test_unit_suffix_coerced() {
        assert_eq!(parse_line("distance: 33.0cm").distance_cm, Some(33.0));
        assert_eq!(parse_line("[Distance (cm): 7]").distance_cm, Some(7.0));
    }

    #[test]
    fn test_negative_distance_rejected() {
        assert_eq!(parse_line("distance: -4.0").distance_cm, None);
    }

    #[test]
    fn test_alias_keys() {
        assert_eq!(parse_line("lightval: 1").light, Some(true));
        assert_eq!(parse_line("soil_val: 55").soil_pct, Some(55.0));
        assert_eq!(parse_line("range: 90").distance_cm, Some(90.0));
    }

    #[test]
    fn test_json_record() {
        let update = parse_line(r#"{"Light Detected": 1, "soil": 0.8, "distance": "21.5cm"}"#);

        assert_eq!(update.light, Some(true));
        assert_eq!(update.soil_pct, Some(80.0));
        assert_eq!(update.distance_cm, Some(21.5));
    }

    #[test]
    fn test_json_non_object_falls_through() {
        // A bare JSON array is not a telemetry object; treated as noise.
        assert!(parse_line("[1, 2, 3]").is_empty());
    }

    #[test]
    fn test_unparsable_value_left_unknown() {
        let update = parse_line("Light Detected: yes, Distance: 10");

        assert_eq!(update.light, None);
        assert_eq!(update.distance_cm, Some(10.0));
    }

    #[test]
    fn test_looks_corrupt() {
        assert!(looks_corrupt("x"));
        assert!(looks_corrupt("@#$%^&*"));
        assert!(!looks_corrupt(""));
        assert!(!looks_corrupt("Light Detected: 1"));
        assert!(!looks_corrupt(r#"{"soil": 1}"#));
    }
}
