use subtle::ConstantTimeEq;

/// Header carrying the shared API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Constant-time string comparison for API keys
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Whether a request may pass the API key check.
///
/// With no key configured every request passes; otherwise the provided key
/// must match exactly.
pub fn api_key_matches(expected: Option<&str>, provided: Option<&str>) -> bool {
    match (expected, provided) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(expected), Some(provided)) => constant_time_compare(expected, provided),
    }
}
