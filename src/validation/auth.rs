//! Authorization rejection recognition
//!
//! Auth-protected inference routes reject requests before they reach the
//! runtime. The gateway reports the reason in an `x-ext-auth-reason` header;
//! `grpcurl` prints it among the response trailers.

use crate::error::{Error, Result};
use crate::transport::InvocationResult;
use serde::{Deserialize, Serialize};

/// Header carrying the rejection reason
pub const AUTH_REASON_HEADER: &str = "x-ext-auth-reason";

/// Reason reported when no credential is sent
pub const REASON_MISSING_CREDENTIAL: &str = "credential not found";

/// Reason reported when a credential is sent but rejected
pub const REASON_REJECTED_CREDENTIAL: &str = "not authenticated";

const GRPC_REJECTION_CODES: [&str; 2] = ["Unauthenticated", "PermissionDenied"];

/// A recognized authorization rejection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRejection {
    pub reason: Option<String>,
    pub status_code: Option<u16>,
    /// gRPC status name, when reported
    pub grpc_code: Option<String>,
}

/// Reason an authorization test expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthExpectation {
    /// No token was supplied
    MissingCredential,
    /// A token was supplied and refused
    RejectedCredential,
    /// Any other reason substring
    Reason(String),
}

impl AuthExpectation {
    /// Expectation implied by whether a token was sent
    pub fn for_token(token_supplied: bool) -> Self {
        if token_supplied {
            AuthExpectation::RejectedCredential
        } else {
            AuthExpectation::MissingCredential
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            AuthExpectation::MissingCredential => REASON_MISSING_CREDENTIAL,
            AuthExpectation::RejectedCredential => REASON_REJECTED_CREDENTIAL,
            AuthExpectation::Reason(reason) => reason,
        }
    }
}

/// Recognize an authorization rejection, if `result` is one
pub fn detect_auth_rejection(result: &InvocationResult) -> Option<AuthRejection> {
    let reason = result
        .header(AUTH_REASON_HEADER)
        .map(str::to_string)
        .or_else(|| line_value(&result.raw_output, AUTH_REASON_HEADER));

    let status_code = result
        .status_code
        .filter(|code| *code == 401 || *code == 403);

    let grpc_code = line_value(&result.raw_output, "code")
        .filter(|code| GRPC_REJECTION_CODES.contains(&code.as_str()));

    if reason.is_none() && status_code.is_none() && grpc_code.is_none() {
        return None;
    }

    let reason = reason.or_else(|| {
        grpc_code
            .as_ref()
            .and_then(|_| line_value(&result.raw_output, "message"))
    });

    Some(AuthRejection {
        reason,
        status_code,
        grpc_code,
    })
}

/// Assert that `result` is a rejection carrying the expected reason
pub fn validate_auth_rejection(
    result: &InvocationResult,
    expectation: &AuthExpectation,
) -> Result<AuthRejection> {
    let rejection = detect_auth_rejection(result).ok_or_else(|| {
        Error::Authorization(format!(
            "expected rejection with reason {:?}, but the request was not rejected",
            expectation.reason()
        ))
    })?;

    let expected = expectation.reason().to_ascii_lowercase();
    let matched = match &rejection.reason {
        Some(reason) => reason.to_ascii_lowercase().contains(&expected),
        None => result.raw_output.to_ascii_lowercase().contains(&expected),
    };

    if matched {
        Ok(rejection)
    } else {
        Err(Error::Authorization(format!(
            "expected reason {:?}, got {:?}",
            expectation.reason(),
            rejection.reason.as_deref().unwrap_or("<none>")
        )))
    }
}

/// Value of the first `name: value` line, matched case-insensitively
fn line_value(raw: &str, name: &str) -> Option<String> {
    raw.lines().find_map(|line| {
        let (key, value) = line.trim().split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_reason() {
        let result = InvocationResult::failed("")
            .with_status(401, "HTTP/1.1 401 Unauthorized")
            .with_header("x-ext-auth-reason", "credential not found");
        let rejection = detect_auth_rejection(&result).unwrap();
        assert_eq!(rejection.reason.as_deref(), Some("credential not found"));
        assert!(validate_auth_rejection(&result, &AuthExpectation::for_token(false)).is_ok());
        assert!(validate_auth_rejection(&result, &AuthExpectation::for_token(true)).is_err());
    }

    #[test]
    fn test_grpcurl_trailer_reason() {
        let raw = "Response trailers received:\n\
                   x-ext-auth-reason: not authenticated\n\
                   Sent 1 request and received 0 responses\n\
                   ERROR:\n  Code: Unauthenticated\n  Message: Unauthorized";
        let result = InvocationResult::failed(raw);
        let rejection = detect_auth_rejection(&result).unwrap();
        assert_eq!(rejection.grpc_code.as_deref(), Some("Unauthenticated"));
        assert_eq!(rejection.reason.as_deref(), Some("not authenticated"));
    }

    #[test]
    fn test_grpc_message_used_without_header() {
        let result =
            InvocationResult::failed("ERROR:\n  Code: PermissionDenied\n  Message: forbidden");
        let rejection = detect_auth_rejection(&result).unwrap();
        assert_eq!(rejection.reason.as_deref(), Some("forbidden"));
        assert!(validate_auth_rejection(
            &result,
            &AuthExpectation::Reason("forbidden".to_string())
        )
        .is_ok());
    }

    #[test]
    fn test_accepted_request_is_not_rejection() {
        let result = InvocationResult::ok(r#"{"generated_text": "74 degrees F"}"#)
            .with_status(200, "HTTP/1.1 200 OK");
        assert!(detect_auth_rejection(&result).is_none());
        let err = validate_auth_rejection(&result, &AuthExpectation::MissingCredential);
        assert!(matches!(err, Err(Error::Authorization(_))));
    }
}
