//! Session settings decoded from the opaque blob handed over at mount.

use crate::shapes::SerializableColor;
use serde_json::{Map, Value};

/// Canvas and default drawing settings for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub background: SerializableColor,
    pub stroke_color: SerializableColor,
    pub stroke_width: f64,
    pub font_size: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            canvas_width: 800,
            canvas_height: 600,
            background: SerializableColor::white(),
            stroke_color: SerializableColor::black(),
            stroke_width: 2.0,
            font_size: 16.0,
        }
    }
}

impl SessionSettings {
    /// Decode leniently: unknown keys are ignored and bad fields keep their default.
    ///
    /// The blob may also arrive as a JSON-encoded string.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::from_map(map),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => Self::from_map(&map),
                Ok(_) => {
                    log::warn!("Session settings string is not an object, using defaults");
                    Self::default()
                }
                Err(e) => {
                    log::warn!("Failed to parse session settings: {}", e);
                    Self::default()
                }
            },
            Value::Null => Self::default(),
            other => {
                log::warn!("Ignoring session settings of unexpected type: {}", other);
                Self::default()
            }
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let defaults = Self::default();
        Self {
            canvas_width: field(map, "canvasWidth", dimension).unwrap_or(defaults.canvas_width),
            canvas_height: field(map, "canvasHeight", dimension).unwrap_or(defaults.canvas_height),
            background: field(map, "backgroundColor", color).unwrap_or(defaults.background),
            stroke_color: field(map, "strokeColor", color).unwrap_or(defaults.stroke_color),
            stroke_width: field(map, "strokeWidth", positive).unwrap_or(defaults.stroke_width),
            font_size: field(map, "fontSize", positive).unwrap_or(defaults.font_size),
        }
    }
}

/// Read one key, warning when it is present but unusable.
fn field<T>(map: &Map<String, Value>, key: &str, parse: fn(&Value) -> Option<T>) -> Option<T> {
    let value = map.get(key)?;
    let parsed = parse(value);
    if parsed.is_none() {
        log::warn!("Invalid session setting {}: {}", key, value);
    }
    parsed
}

fn dimension(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .filter(|v| *v > 0)
        .and_then(|v| u32::try_from(v).ok())
}

fn color(value: &Value) -> Option<SerializableColor> {
    value.as_str().and_then(SerializableColor::from_hex)
}

fn positive(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_for_null() {
        assert_eq!(SessionSettings::from_value(&Value::Null), SessionSettings::default());
    }

    #[test]
    fn test_known_keys() {
        let settings = SessionSettings::from_value(&json!({
            "canvasWidth": 1024,
            "canvasHeight": 768,
            "backgroundColor": "#f0f0f0",
            "strokeWidth": 5,
            "somethingElse": true
        }));
        assert_eq!(settings.canvas_width, 1024);
        assert_eq!(settings.canvas_height, 768);
        assert_eq!(settings.background, SerializableColor::new(0xf0, 0xf0, 0xf0, 255));
        assert_eq!(settings.stroke_width, 5.0);
        assert_eq!(settings.font_size, 16.0);
    }

    #[test]
    fn test_bad_field_falls_back() {
        let settings = SessionSettings::from_value(&json!({
            "canvasWidth": "wide",
            "strokeColor": "not a color",
            "fontSize": -3
        }));
        assert_eq!(settings, SessionSettings::default());
    }

    #[test]
    fn test_json_string_blob() {
        let settings = SessionSettings::from_value(&json!("{\"canvasWidth\": 640}"));
        assert_eq!(settings.canvas_width, 640);

        let broken = SessionSettings::from_value(&json!("{not json"));
        assert_eq!(broken, SessionSettings::default());
    }
}
