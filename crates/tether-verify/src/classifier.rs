//! Best-effort mapping from probe diagnostics to [`ErrorCode`]s.

use tether_core::connection::ErrorCode;

/// Checked in order; the first code with a matching needle wins.
const RULES: &[(ErrorCode, &[&str])] = &[
    (ErrorCode::Connection, &["connection refused"]),
    (
        ErrorCode::Network,
        &[
            "no such host",
            "network is unreachable",
            "host is unreachable",
            "no route to host",
            "name resolution",
            "could not resolve",
            "name or service not known",
            "i/o timeout",
            "connection timed out",
        ],
    ),
    (
        ErrorCode::Authentication,
        &[
            "authentication failed",
            "unable to authenticate",
            "auth fail",
            "login incorrect",
            "login failed",
            "permission denied",
            "access denied",
            "invalidaccesskeyid",
            "signaturedoesnotmatch",
            "invalid_grant",
            "invalid_client",
            "unauthorized",
        ],
    ),
    (
        ErrorCode::ResourceNotFound,
        &[
            "directory not found",
            "no such file or directory",
            "nosuchbucket",
            "bucket not found",
            "path not found",
            "object not found",
        ],
    ),
    (
        ErrorCode::InvalidParams,
        &[
            "didn't find section in config file",
            "invalid parameter",
            "couldn't parse",
            "unknown backend",
        ],
    ),
];

/// Classify the diagnostic text of a failed probe. Never called on success
/// and never yields [`ErrorCode::Timeout`].
pub fn classify(diagnostic: &str) -> ErrorCode {
    let haystack = diagnostic.to_lowercase();
    RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|needle| haystack.contains(needle)))
        .map(|(code, _)| *code)
        .unwrap_or(ErrorCode::Unknown)
}

/// User-facing text for a classified failure.
pub fn describe(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::Connection => {
            "Connection refused. Check that the host and port are correct and the service is running."
        }
        ErrorCode::Network => {
            "Network error. The host could not be resolved or reached."
        }
        ErrorCode::Authentication => {
            "Authentication failed. Check the username, password or access keys."
        }
        ErrorCode::ResourceNotFound => {
            "The configured path, bucket or directory was not found."
        }
        ErrorCode::InvalidParams => {
            "The provider settings are invalid for this storage type."
        }
        ErrorCode::Timeout => "Connection test timed out.",
        ErrorCode::Unknown => "Connection test failed.",
    }
}
