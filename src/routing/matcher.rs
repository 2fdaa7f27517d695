//! Routing header names and lookups.

use reqwest::header::HeaderMap;

/// Base64 PKCS#12 archive for inline certificates.
pub const CERTIFICATE_HEADER: &str = "x-certificate";
/// Identity of the caller; names the cache entry.
pub const CLIENT_ID_HEADER: &str = "x-client-id";
/// PKCS#12 passphrase.
pub const CLIENT_SECRET_HEADER: &str = "x-client-secret";
/// Directory holding `<client-id>/<file-name>` archives.
pub const DIR_BASE_HEADER: &str = "x-dir-base";
pub const FILE_NAME_HEADER: &str = "x-file-name";

/// Every header that steers routing. None of them are sent upstream by default.
pub const ROUTING_HEADERS: [&str; 5] = [
    CERTIFICATE_HEADER,
    CLIENT_ID_HEADER,
    CLIENT_SECRET_HEADER,
    DIR_BASE_HEADER,
    FILE_NAME_HEADER,
];

/// Non-blank, trimmed value of `name`. Values that are not visible ASCII count as absent.
pub fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// True if `name` is one of [`ROUTING_HEADERS`], ignoring case.
pub fn is_routing_header(name: &str) -> bool {
    ROUTING_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Remove every routing header from `headers`.
pub fn strip_routing_headers(headers: &mut HeaderMap) {
    for name in ROUTING_HEADERS {
        headers.remove(name);
    }
}
