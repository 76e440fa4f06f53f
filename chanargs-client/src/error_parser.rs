//! Error response parsing.
//!
//! Parses JSON error responses from unary calls, and the JSON payload of
//! EndStream frames, into [`ClientError`].

use chanargs_core::Code;
use http::StatusCode;
use serde::Deserialize;

use crate::ClientError;

/// JSON structure for error responses and the `error` field of EndStream frames.
#[derive(Deserialize)]
struct ErrorResponseJson {
    code: String,
    #[serde(default)]
    message: Option<String>,
}

/// EndStream frame JSON structure.
#[derive(Deserialize)]
struct EndStreamJson {
    #[serde(default)]
    error: Option<ErrorResponseJson>,
}

/// Parse a unary error response.
///
/// If the body cannot be parsed as an error, falls back to an error derived
/// from the HTTP status code.
pub(crate) fn parse_error_response(status: StatusCode, body: &[u8]) -> ClientError {
    match serde_json::from_slice::<ErrorResponseJson>(body) {
        Ok(error_json) => {
            let code = error_json
                .code
                .parse()
                .unwrap_or_else(|_| http_status_to_code(status));
            match error_json.message {
                Some(message) => ClientError::new(code, message),
                None => ClientError::from_code(code),
            }
        }
        Err(_) => {
            let code = http_status_to_code(status);
            let message = if body.is_empty() {
                status.canonical_reason().unwrap_or("Unknown error")
            } else {
                std::str::from_utf8(body).unwrap_or("Unknown error")
            };
            ClientError::new(code, message)
        }
    }
}

/// Parse an EndStream frame payload. `Ok(None)` means the call succeeded.
pub(crate) fn parse_end_stream(payload: &[u8]) -> Result<Option<ClientError>, ClientError> {
    if payload.is_empty() || payload == b"{}" {
        return Ok(None);
    }

    let end_stream: EndStreamJson = serde_json::from_slice(payload)
        .map_err(|e| ClientError::Protocol(format!("invalid EndStream JSON: {}", e)))?;

    Ok(end_stream.error.map(|e| {
        let code = e.code.parse().unwrap_or(Code::Unknown);
        match e.message {
            Some(message) => ClientError::new(code, message),
            None => ClientError::from_code(code),
        }
    }))
}

/// Map HTTP status codes to error codes.
fn http_status_to_code(status: StatusCode) -> Code {
    match status {
        StatusCode::BAD_REQUEST => Code::Internal,
        StatusCode::UNAUTHORIZED => Code::Unauthenticated,
        StatusCode::FORBIDDEN => Code::PermissionDenied,
        StatusCode::NOT_FOUND => Code::Unimplemented,
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => Code::Unavailable,
        _ => Code::Unknown,
    }
}
