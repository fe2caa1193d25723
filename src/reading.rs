//! Typed view of a telemetry payload.
//!
//! Stations send loosely shaped JSON. The fields the server understands get a
//! named slot; everything else is kept in `extra` untouched.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::DecodeError;

/// One telemetry payload from a station.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reading {
    #[serde(
        default,
        deserialize_with = "station_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub station_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<Measure>,

    #[serde(default, alias = "wind_speed", skip_serializing_if = "Option::is_none")]
    pub windspeed: Option<Measure>,

    #[serde(default, alias = "winddirection", skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<Measure>,

    #[serde(default, alias = "weather_code", skip_serializing_if = "Option::is_none")]
    pub weathercode: Option<Measure>,

    /// Caller-supplied fields the server does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Reading {
    /// Builds a reading from a decoded JSON object.
    pub fn from_document(document: &Map<String, Value>) -> Result<Self, DecodeError> {
        serde_json::from_value(Value::Object(document.clone())).map_err(DecodeError::InvalidReading)
    }

    /// Numeric weather code. Only JSON numbers count; `"61"` is not a code.
    pub fn weather_code(&self) -> Option<i64> {
        match self.weathercode.as_ref()? {
            Measure::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
            }),
            // Codes sent as text are not looked up.
            Measure::Text(_) => None,
        }
    }
}

/// A numeric quantity that may arrive as a JSON number or as text such as
/// `"28.5 °C"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measure {
    Number(Number),
    Text(String),
}

impl Measure {
    /// Numeric value, reading the leading number out of text forms.
    pub fn value(&self) -> Option<f64> {
        match self {
            Measure::Number(n) => n.as_f64(),
            Measure::Text(s) => s
                .trim()
                .split(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+')))
                .next()
                .and_then(|prefix| prefix.parse().ok()),
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Number(n) => write!(f, "{n}"),
            Measure::Text(s) => f.write_str(s),
        }
    }
}

/// Where a station is: a `[lat, lon]` pair or a free-form description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    Coordinates([Number; 2]),
    Text(String),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Coordinates([lat, lon]) => write!(f, "[{lat}, {lon}]"),
            Location::Text(s) => f.write_str(s),
        }
    }
}

// Station ids are keys, but some clients send them as bare numbers.
fn station_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(Number),
    }

    Ok(Option::<Id>::deserialize(deserializer)?.map(|id| match id {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    }))
}
