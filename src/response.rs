//! Response envelope shared by every handler.
//!
//! [`format_response`] is the single place where a status code and a JSON
//! payload become a [`Response`]. Success and failure paths go through it
//! alike, so every reply carries the same CORS headers and content type.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Fixed CORS header set attached to every response.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET,POST,OPTIONS"),
    (
        "Access-Control-Allow-Headers",
        "Content-Type,X-Amz-Date,Authorization,X-Api-Key,X-Amz-Security-Token",
    ),
];

/// Content type of every response body.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A formatted response: status code, headers and serialized JSON body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Response {
    /// Parse the body back into JSON.
    ///
    /// Bodies are always produced from a `serde_json::Value`, so this only
    /// fails for responses built by hand.
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// Look up a header by exact name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }
}

/// Build the uniform envelope for a status code and payload.
///
/// Pure and deterministic: the same inputs always give the same response.
pub fn format_response(status_code: u16, payload: &Value) -> Response {
    let mut headers: BTreeMap<String, String> = CORS_HEADERS
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    headers.insert("Content-Type".to_string(), CONTENT_TYPE_JSON.to_string());

    Response {
        status_code,
        headers,
        body: payload.to_string(),
    }
}

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = axum::response::Response::new(Body::from(self.body));
        *response.status_mut() = status;

        let header_map = response.headers_mut();
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    header_map.insert(name, value);
                }
                _ => warn!(header = %name, "Dropping header that is not valid HTTP"),
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_response_headers() {
        let response = format_response(200, &json!([]));

        assert_eq!(response.status_code, 200);
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
        assert_eq!(
            response.header("Access-Control-Allow-Methods"),
            Some("GET,POST,OPTIONS")
        );
        assert_eq!(
            response.header("Access-Control-Allow-Headers"),
            Some("Content-Type,X-Amz-Date,Authorization,X-Api-Key,X-Amz-Security-Token")
        );
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.headers.len(), 4);
    }

    #[test]
    fn test_format_response_body_is_json() {
        let response = format_response(201, &json!({"message": "Data inserted successfully"}));

        assert_eq!(response.body, r#"{"message":"Data inserted successfully"}"#);
        assert_eq!(
            response.json().unwrap()["message"],
            "Data inserted successfully"
        );
    }

    #[test]
    fn test_format_response_is_deterministic() {
        let payload = json!({"error": "Internal server error", "details": "boom"});
        assert_eq!(format_response(500, &payload), format_response(500, &payload));
    }

    #[test]
    fn test_envelope_serializes_camel_case() {
        let response = format_response(400, &json!({"error": "bad"}));
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["statusCode"], 400);
        assert_eq!(value["headers"]["Content-Type"], "application/json");
        assert_eq!(value["body"], r#"{"error":"bad"}"#);
    }

    #[test]
    fn test_into_axum_response() {
        let response = format_response(404, &json!({})).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }
}
