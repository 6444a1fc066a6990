//! HTTP response building helpers
//!
//! Every endpoint answers with the same envelope: successes carry
//! `response_code`, `info_lines` and `response`; failures carry
//! `response_code` and `error_lines`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::EligibilityError;

/// Result type alias for handlers
pub type HandlerResult = Result<Response<Full<Bytes>>, EligibilityError>;

#[derive(Serialize)]
struct Annotated<'a, T: Serialize> {
    response_code: u16,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    info_lines: Vec<&'a str>,
    response: &'a T,
}

#[derive(Serialize)]
struct Failure<'a> {
    response_code: u16,
    error_lines: Vec<&'a str>,
}

fn lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').collect()
    }
}

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut resp = Response::new(Full::new(Bytes::from(json)));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    resp
}

/// Payload plus human readable info text
pub fn annotated<T: Serialize>(
    status: StatusCode,
    payload: &T,
    info: &str,
) -> Response<Full<Bytes>> {
    json_response(
        status,
        &Annotated {
            response_code: status.as_u16(),
            info_lines: lines(info),
            response: payload,
        },
    )
}

/// Failure with human readable explanation
pub fn failure(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(
        status,
        &Failure {
            response_code: status.as_u16(),
            error_lines: lines(message),
        },
    )
}

/// Build a 404 Not Found response
pub fn not_found() -> Response<Full<Bytes>> {
    failure(StatusCode::NOT_FOUND, "Not Found")
}

/// Build a 405 Method Not Allowed response
pub fn method_not_allowed() -> Response<Full<Bytes>> {
    failure(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// Convert an EligibilityError to an appropriate HTTP response
pub fn error_response(err: EligibilityError) -> Response<Full<Bytes>> {
    let status = match &err {
        EligibilityError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EligibilityError::Auth(_) => StatusCode::UNAUTHORIZED,
        EligibilityError::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        if err.is_consistency_violation() {
            error!(error = %err, "Upstream data consistency violation");
        } else {
            error!(error = %err, "Request failed");
        }
    }

    let message = match &err {
        EligibilityError::InvalidInput(msg) | EligibilityError::Auth(msg) => msg.clone(),
        other => other.to_string(),
    };
    failure(status, &message)
}

/// Wrap a handler result into an HTTP response
pub fn from_result(result: HandlerResult) -> Response<Full<Bytes>> {
    result.unwrap_or_else(error_response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_annotated_envelope() {
        let resp = annotated(StatusCode::OK, &vec![1, 2], "line one\nline two");
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["response_code"], 200);
        assert_eq!(v["info_lines"][1], "line two");
        assert_eq!(v["response"][0], 1);
    }

    #[tokio::test]
    async fn test_error_response_invalid_input() {
        let resp = error_response(EligibilityError::InvalidInput("bad limit".into()));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let v = body_json(resp).await;
        assert_eq!(v["error_lines"][0], "bad limit");
    }

    #[test]
    fn test_error_response_double_deal_is_internal() {
        let resp = error_response(EligibilityError::DoubleDeal {
            piece_cid: "P1".into(),
            provider_id: "SP1".into(),
            first_deal_id: 10,
            second_deal_id: 11,
        });
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_response_auth_and_pool() {
        assert_eq!(
            error_response(EligibilityError::Auth("missing".into())).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            error_response(EligibilityError::Pool("exhausted".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
