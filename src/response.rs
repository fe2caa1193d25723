//! Acknowledgments sent back to stations.

use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::protocol::Framing;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub status: Status,
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather_feedback: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_received: Option<Map<String, Value>>,
}

impl Ack {
    pub fn success(
        message: impl Into<String>,
        weather_feedback: Vec<String>,
        data_received: Map<String, Value>,
    ) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            timestamp: now(),
            weather_feedback: Some(weather_feedback),
            data_received: Some(data_received),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            timestamp: now(),
            weather_feedback: None,
            data_received: None,
        }
    }
}

/// Serializes `ack` and frames it the way the request was framed.
pub fn encode(framing: Framing, ack: &Ack) -> serde_json::Result<Vec<u8>> {
    let body = serde_json::to_vec(ack)?;

    match framing {
        Framing::RawJson => Ok(body),
        Framing::HttpWrapped => {
            let status_line = match ack.status {
                Status::Success => "200 OK",
                Status::Error => "400 Bad Request",
            };
            let mut out = format!(
                "HTTP/1.1 {status_line}\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\
                 \r\n",
                body.len()
            )
            .into_bytes();
            out.extend_from_slice(&body);
            Ok(out)
        }
    }
}

fn now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn split_http(bytes: &[u8]) -> (String, Vec<u8>) {
        let text = std::str::from_utf8(bytes).unwrap();
        let (head, body) = text.split_once("\r\n\r\n").unwrap();
        (head.to_string(), body.as_bytes().to_vec())
    }

    #[test]
    fn test_raw_success_has_no_envelope() {
        let Value::Object(data) = json!({"station_id": "WS-1"}) else {
            unreachable!()
        };
        let ack = Ack::success("ok", vec!["Weather condition: Clear sky".into()], data);
        let bytes = encode(Framing::RawJson, &ack).unwrap();

        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["weather_feedback"][0], "Weather condition: Clear sky");
        assert_eq!(value["data_received"]["station_id"], "WS-1");
    }

    #[test]
    fn test_http_content_length_matches_body() {
        let ack = Ack::success("Weather data received – 30°C", Vec::new(), Map::new());
        let bytes = encode(Framing::HttpWrapped, &ack).unwrap();
        let (head, body) = split_http(&bytes);

        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Type: application/json"));
        assert!(head.contains("Connection: close"));
        assert!(head.contains(&format!("Content-Length: {}", body.len())));
        serde_json::from_slice::<Value>(&body).unwrap();
    }

    #[test]
    fn test_http_error_is_bad_request() {
        let bytes = encode(Framing::HttpWrapped, &Ack::error("Invalid JSON data received")).unwrap();
        let (head, body) = split_http(&bytes);

        assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "error");
        assert!(value.get("weather_feedback").is_none());
        assert!(value.get("data_received").is_none());
    }

    #[test]
    fn test_timestamp_format() {
        let ack = Ack::error("x");
        assert!(chrono::NaiveDateTime::parse_from_str(&ack.timestamp, TIMESTAMP_FORMAT).is_ok());
    }
}
