// Wire protocol
// Newline-delimited JSON. A request names an operation, carries its
// parameters as an object and (except for user_login) a session token. The
// reply is status plus either operation data or an error message and code.

use omnifs_core::OmniError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub operation: String,
    #[serde(default)]
    pub session_id: String,
    /// Client-side correlation id; accepted but not echoed back.
    #[serde(default)]
    #[allow(dead_code)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Self {
            status: "success",
            data: Some(data),
            error_message: None,
            error_code: None,
        }
    }

    pub fn error(err: &OmniError) -> Self {
        Self {
            status: "error",
            data: None,
            error_message: Some(err.to_string()),
            error_code: Some(err.code()),
        }
    }
}

/// A required string parameter.
pub fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str, OmniError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| OmniError::InvalidArgument(format!("missing string parameter '{}'", key)))
}

/// A required unsigned integer parameter.
pub fn u64_param(params: &Value, key: &str) -> Result<u64, OmniError> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| OmniError::InvalidArgument(format!("missing integer parameter '{}'", key)))
}

/// A required signed integer parameter.
pub fn i64_param(params: &Value, key: &str) -> Result<i64, OmniError> {
    params
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| OmniError::InvalidArgument(format!("missing integer parameter '{}'", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_parsing() {
        let raw = r#"{
            "operation": "file_create",
            "session_id": "abc123",
            "request_id": "r-1",
            "parameters": {"path": "/a", "data": "hi"}
        }"#;
        let request: Request = serde_json::from_str(raw).unwrap();
        assert_eq!(request.operation, "file_create");
        assert_eq!(request.session_id, "abc123");
        assert_eq!(str_param(&request.parameters, "path").unwrap(), "/a");
    }

    #[test]
    fn test_login_request_may_omit_session() {
        let raw = r#"{"operation": "user_login", "parameters": {"username": "a", "password": "b"}}"#;
        let request: Request = serde_json::from_str(raw).unwrap();
        assert_eq!(request.session_id, "");
        assert!(request.request_id.is_none());
    }

    #[test]
    fn test_success_response_shape() {
        let response = Response::success(json!({"exists": true}));
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["status"], "success");
        assert_eq!(encoded["data"]["exists"], true);
        assert!(encoded.get("error_message").is_none());
    }

    #[test]
    fn test_error_response_carries_code_and_message() {
        let response = Response::error(&OmniError::NotFound("/x".to_string()));
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["status"], "error");
        assert_eq!(encoded["error_code"], -3);
        assert!(encoded["error_message"].as_str().unwrap().contains("/x"));
        assert!(encoded.get("data").is_none());
    }

    #[test]
    fn test_missing_params_reported() {
        let params = json!({"path": 7});
        assert!(str_param(&params, "path").is_err());
        assert!(u64_param(&params, "index").is_err());
    }
}
