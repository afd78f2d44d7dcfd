//! Client requests accepted by the gateway.
//!
//! A message body is a JSON object:
//!
//! ```json
//! {"action": "run", "program": [3,0,4,0,99], "input": [42]}
//! {"action": "additional_input", "input": [43]}
//! ```
//!
//! `action` may be omitted, in which case the request is a `run`. `input`
//! accepts a bare integer as shorthand for a one-element list.

use crate::error::{Error, Result};
use serde::Deserialize;

/// A validated client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Start a new program, discarding whatever the connection ran before
    Run { program: Vec<i64>, input: Vec<i64> },
    /// Feed a suspended program and resume it
    AdditionalInput { input: Vec<i64> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InputField {
    One(i64),
    Many(Vec<i64>),
}

impl From<InputField> for Vec<i64> {
    fn from(field: InputField) -> Self {
        match field {
            InputField::One(value) => vec![value],
            InputField::Many(values) => values,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    program: Option<Vec<i64>>,
    #[serde(default)]
    input: Option<InputField>,
}

impl Request {
    /// Parse and validate a message body
    pub fn parse(body: &str) -> Result<Self> {
        let raw: RawRequest = serde_json::from_str(body).map_err(|e| {
            Error::invalid_request(format!("body is not a request object: {}", e))
                .with_operation("request::parse")
                .set_source(e)
        })?;

        let input = raw
            .input
            .map(Vec::from)
            .ok_or_else(|| missing_field("input"))?;

        match raw.action.as_deref().unwrap_or("run") {
            "run" => {
                let program = raw.program.ok_or_else(|| missing_field("program"))?;
                Ok(Request::Run { program, input })
            }
            "additional_input" => Ok(Request::AdditionalInput { input }),
            other => Err(Error::invalid_request(format!("unknown action '{}'", other))
                .with_operation("request::parse")
                .with_context("action", other)),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Request::Run { .. } => "run",
            Request::AdditionalInput { .. } => "additional_input",
        }
    }
}

fn missing_field(field: &'static str) -> Error {
    Error::invalid_request(format!("missing required field '{}'", field))
        .with_operation("request::parse")
        .with_context("field", field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_run_request() {
        let request =
            Request::parse(r#"{"action": "run", "program": [3,0,4,0,99], "input": [42]}"#).unwrap();
        assert_eq!(
            request,
            Request::Run { program: vec![3, 0, 4, 0, 99], input: vec![42] }
        );
        assert_eq!(request.action(), "run");
    }

    #[test]
    fn test_action_defaults_to_run() {
        let request = Request::parse(r#"{"program": [23], "input": []}"#).unwrap();
        assert_eq!(request, Request::Run { program: vec![23], input: vec![] });
    }

    #[test]
    fn test_scalar_input() {
        let request = Request::parse(r#"{"program": [3,0,4,0,99], "input": 42}"#).unwrap();
        assert_eq!(
            request,
            Request::Run { program: vec![3, 0, 4, 0, 99], input: vec![42] }
        );
    }

    #[test]
    fn test_additional_input() {
        let request = Request::parse(r#"{"action": "additional_input", "input": [43]}"#).unwrap();
        assert_eq!(request, Request::AdditionalInput { input: vec![43] });
    }

    #[test]
    fn test_not_json() {
        let err = Request::parse("Hello").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_missing_fields() {
        let err = Request::parse(r#"{"msg": "hello"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let err = Request::parse(r#"{"input": [1]}"#).unwrap_err();
        assert!(err.message().contains("program"));

        let err = Request::parse(r#"{"action": "additional_input"}"#).unwrap_err();
        assert!(err.message().contains("input"));
    }

    #[test]
    fn test_unknown_action() {
        let err = Request::parse(r#"{"action": "stop", "input": []}"#).unwrap_err();
        assert!(err.message().contains("stop"));
    }

    #[test]
    fn test_wrong_types() {
        assert!(Request::parse(r#"{"program": "1,2,3", "input": []}"#).is_err());
        assert!(Request::parse(r#"{"program": [1], "input": ["a"]}"#).is_err());
        assert!(Request::parse("[1, 2, 3]").is_err());
    }
}
