//! TinyG Response Parser
//!
//! This module classifies TinyG output lines. Each line is parsed into a
//! JSON tree and matched structurally:
//! - `{"er":{..,"st":204,..}}` is a hard-stop fault report
//! - `{"r":{..},"f":[rev,status,rx,checksum]}` is a command response
//! - any other JSON is telemetry, anything else is plain text

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tinyg_link_core::DecodeError;

/// Status code the controller uses for "shutdown occurred"
pub const HARD_STOP_STATUS: u64 = 204;

/// A decoded line of controller output
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolLine {
    /// The line as received
    pub raw: String,
    /// What the line means
    pub kind: LineKind,
}

/// Classification of a controller line
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    /// Hard-stop report; the session must be reset
    Fault(FaultReport),
    /// Response to a command or query
    Response(TinyGResponse),
    /// Any other JSON object
    Telemetry(Value),
    /// Non-JSON text such as the startup banner or prompt
    Text,
}

impl ProtocolLine {
    /// Check if the line is a hard-stop report
    pub fn is_fault(&self) -> bool {
        matches!(self.kind, LineKind::Fault(_))
    }

    /// The response payload, if this line is a response
    pub fn response(&self) -> Option<&TinyGResponse> {
        match &self.kind {
            LineKind::Response(response) => Some(response),
            _ => None,
        }
    }
}

/// Parsed `er` report carrying the hard-stop status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultReport {
    /// Status code (always [`HARD_STOP_STATUS`])
    #[serde(rename = "st")]
    pub status: u64,
    /// Controller message, e.g. "Limit switch hit - Shutdown occurred"
    #[serde(rename = "msg", default)]
    pub message: Option<String>,
    /// Firmware build reported alongside the fault
    #[serde(rename = "fb", default)]
    pub firmware_build: Option<f64>,
}

/// Response footer: `"f":[revision, status, rx_buffer, checksum]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, u64, u64, u64)", into = "(u64, u64, u64, u64)")]
pub struct Footer {
    /// Footer revision
    pub revision: u64,
    /// Status code of the command (0 = OK)
    pub status: u64,
    /// Free bytes in the controller's receive buffer
    pub rx_buffer: u64,
    /// Line checksum
    pub checksum: u64,
}

impl From<(u64, u64, u64, u64)> for Footer {
    fn from((revision, status, rx_buffer, checksum): (u64, u64, u64, u64)) -> Self {
        Self {
            revision,
            status,
            rx_buffer,
            checksum,
        }
    }
}

impl From<Footer> for (u64, u64, u64, u64) {
    fn from(footer: Footer) -> Self {
        (
            footer.revision,
            footer.status,
            footer.rx_buffer,
            footer.checksum,
        )
    }
}

/// Parsed `r` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TinyGResponse {
    /// The `r` body
    #[serde(rename = "r")]
    pub body: Map<String, Value>,
    /// The footer
    #[serde(rename = "f")]
    pub footer: Footer,
}

impl TinyGResponse {
    /// Numeric value reported for `key` (case-insensitive)
    pub fn setting(&self, key: &str) -> Option<f64> {
        self.body
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .and_then(|(_, v)| v.as_f64())
    }

    /// Every numeric setting in the body, keys lower-cased
    pub fn settings(&self) -> impl Iterator<Item = (String, f64)> + '_ {
        self.body
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|n| (k.to_ascii_lowercase(), n)))
    }

    /// Check if the footer status reports success
    pub fn is_success(&self) -> bool {
        self.footer.status == 0
    }
}

/// TinyG response parser
#[derive(Debug, Default, Clone, Copy)]
pub struct TinyGResponseParser;

impl TinyGResponseParser {
    /// Create a new parser
    pub fn new() -> Self {
        Self
    }

    /// Classify one line of controller output
    ///
    /// Fails only for text that starts like a JSON object but does not parse.
    pub fn parse(&self, line: &str) -> Result<ProtocolLine, DecodeError> {
        let trimmed = line.trim();

        if !trimmed.starts_with('{') {
            return Ok(ProtocolLine {
                raw: trimmed.to_string(),
                kind: LineKind::Text,
            });
        }

        let json: Value =
            serde_json::from_str(trimmed).map_err(|e| DecodeError::MalformedLine {
                line: trimmed.to_string(),
                reason: e.to_string(),
            })?;

        Ok(ProtocolLine {
            raw: trimmed.to_string(),
            kind: self.classify(json),
        })
    }

    fn classify(&self, json: Value) -> LineKind {
        let Some(obj) = json.as_object() else {
            return LineKind::Telemetry(json);
        };

        if let Some(report) = obj.get("er").and_then(parse_fault_report) {
            return LineKind::Fault(report);
        }

        if let (Some(Value::Object(body)), Some(footer)) =
            (obj.get("r"), obj.get("f").and_then(parse_footer))
        {
            return LineKind::Response(TinyGResponse {
                body: body.clone(),
                footer,
            });
        }

        LineKind::Telemetry(json)
    }
}

fn parse_fault_report(er: &Value) -> Option<FaultReport> {
    FaultReport::deserialize(er)
        .ok()
        .filter(|report| report.status == HARD_STOP_STATUS)
}

fn parse_footer(f: &Value) -> Option<Footer> {
    Footer::deserialize(f).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hard_stop() {
        let parser = TinyGResponseParser::new();
        let line = parser
            .parse(r#"{"er":{"fb":440.20,"st":204,"msg":"Limit switch hit - Shutdown occurred"}}"#)
            .unwrap();

        assert!(line.is_fault());
        match line.kind {
            LineKind::Fault(report) => {
                assert_eq!(report.status, HARD_STOP_STATUS);
                assert_eq!(
                    report.message.as_deref(),
                    Some("Limit switch hit - Shutdown occurred")
                );
                assert_eq!(report.firmware_build, Some(440.20));
            }
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_other_error_status_is_telemetry() {
        let parser = TinyGResponseParser::new();
        let line = parser
            .parse(r#"{"er":{"fb":440.20,"st":100,"msg":"Unrecognized command"}}"#)
            .unwrap();
        assert!(!line.is_fault());
        assert!(matches!(line.kind, LineKind::Telemetry(_)));
    }

    #[test]
    fn test_parse_config_response() {
        let parser = TinyGResponseParser::new();
        let line = parser.parse(r#"{"r":{"XVM":500},"f":[1,0,0,1]}"#).unwrap();
        let response = line.response().unwrap();

        assert_eq!(response.setting("xvm"), Some(500.0));
        assert_eq!(response.setting("yvm"), None);
        assert!(response.is_success());
        assert_eq!(
            response.settings().collect::<Vec<_>>(),
            vec![("xvm".to_string(), 500.0)]
        );
        assert_eq!(response.footer.checksum, 1);
    }

    #[test]
    fn test_response_requires_four_field_footer() {
        let parser = TinyGResponseParser::new();
        let line = parser.parse(r#"{"r":{"xvm":500},"f":[1,0,0]}"#).unwrap();
        assert!(matches!(line.kind, LineKind::Telemetry(_)));

        let line = parser.parse(r#"{"r":{"xvm":500}}"#).unwrap();
        assert!(line.response().is_none());
    }

    #[test]
    fn test_text_and_malformed_lines() {
        let parser = TinyGResponseParser::new();
        let line = parser.parse("tinyg [mm] ok>").unwrap();
        assert_eq!(line.kind, LineKind::Text);

        let err = parser.parse(r#"{"r":{"xvm":}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedLine { .. }));
    }
}
