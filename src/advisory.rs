//! Human-readable feedback derived from a reading.

use crate::reading::{Measure, Reading};

const HEAT_THRESHOLD_C: f64 = 30.0;
const COLD_THRESHOLD_C: f64 = 5.0;
const STRONG_WIND_KMH: f64 = 20.0;

/// Maps a WMO weather code to its description.
pub fn condition(code: i64) -> Option<&'static str> {
    let description = match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        95 => "Thunderstorm",
        _ => return None,
    };
    Some(description)
}

/// Feedback lines for every recognized field present in `reading`, in the
/// order temperature, wind, weather condition, location, time.
///
/// Absent fields are skipped. Fields present but not numeric produce a line
/// saying so instead of failing.
pub fn feedback(reading: &Reading) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(temp) = &reading.temperature {
        lines.push(match temp.value() {
            Some(t) if t > HEAT_THRESHOLD_C => format!(
                "High temperature of {}°C detected. Heat advisory in effect.",
                number(temp, t)
            ),
            Some(t) if t < COLD_THRESHOLD_C => format!(
                "Low temperature of {}°C detected. Cold weather alert.",
                number(temp, t)
            ),
            Some(t) => format!("Current temperature is {}°C. Normal range.", number(temp, t)),
            None => format!("Temperature value '{temp}' is not numeric."),
        });
    }

    if let Some(wind) = &reading.windspeed {
        lines.push(match wind.value() {
            Some(w) if w > STRONG_WIND_KMH => {
                format!("Strong winds at {} km/h. Exercise caution.", number(wind, w))
            }
            Some(w) => format!("Wind speed at {} km/h.", number(wind, w)),
            None => format!("Wind speed value '{wind}' is not numeric."),
        });
    }

    if let Some(raw) = &reading.weathercode {
        let text = match reading.weather_code() {
            Some(code) => condition(code)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("Unknown condition (code {code})")),
            None => format!("Unknown condition (code {raw})"),
        };
        lines.push(format!("Weather condition: {text}"));
    }

    if let Some(location) = &reading.location {
        lines.push(format!("Location: {location}"));
    }

    if let Some(time) = &reading.time {
        lines.push(format!("Time recorded: {time}"));
    }

    lines
}

// JSON numbers print as sent; text measures print their parsed value so the
// unit is not doubled.
fn number(measure: &Measure, value: f64) -> String {
    match measure {
        Measure::Number(n) => n.to_string(),
        Measure::Text(_) => value.to_string(),
    }
}
