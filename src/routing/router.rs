//! Default vs certificate-bound route decision.

use std::path::PathBuf;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::certificates::{CertificateSource, Identity};
use crate::config::CertificateConfig;
use crate::error::{ApiError, ApiResult};
use crate::routing::matcher::{
    header_value, CERTIFICATE_HEADER, CLIENT_ID_HEADER, CLIENT_SECRET_HEADER, DIR_BASE_HEADER,
    FILE_NAME_HEADER,
};

/// Which transport a call goes out on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Shared client, no client certificate.
    Default,
    /// Client bound to the caller's certificate.
    CertBound(CertificateParams),
}

/// Everything needed to resolve and bind one identity's certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateParams {
    pub identity: Identity,
    pub source: CertificateSource,
}

impl CertificateParams {
    /// Routing headers that select this identity on a later call.
    pub fn to_headers(&self) -> ApiResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        insert(&mut headers, CLIENT_ID_HEADER, self.identity.as_str())?;
        insert(&mut headers, CLIENT_SECRET_HEADER, self.source.passphrase())?;
        match &self.source {
            CertificateSource::Inline { encoded, .. } => {
                insert(&mut headers, CERTIFICATE_HEADER, encoded)?;
            }
            CertificateSource::FileRef { dir, file_name, .. } => {
                insert(&mut headers, DIR_BASE_HEADER, &dir.to_string_lossy())?;
                insert(&mut headers, FILE_NAME_HEADER, file_name)?;
            }
        }
        Ok(headers)
    }
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) -> ApiResult<()> {
    let value = HeaderValue::from_str(value).map_err(|e| ApiError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    headers.insert(name, value);
    Ok(())
}

/// Decide how a call with these headers is dispatched.
///
/// A certificate-bound route needs a client id, a secret, and either an
/// inline certificate or a file reference. For file references a missing
/// `X-Dir-Base` or `X-File-Name` falls back to `defaults`, but at least one of
/// them must be sent. Anything less routes to the default client.
pub fn classify_route(headers: &HeaderMap, defaults: &CertificateConfig) -> RouteDecision {
    let Some(identity) = header_value(headers, CLIENT_ID_HEADER).and_then(Identity::new) else {
        return RouteDecision::Default;
    };
    let Some(secret) = header_value(headers, CLIENT_SECRET_HEADER) else {
        return RouteDecision::Default;
    };

    if let Some(encoded) = header_value(headers, CERTIFICATE_HEADER) {
        return RouteDecision::CertBound(CertificateParams {
            identity,
            source: CertificateSource::inline(encoded, secret),
        });
    }

    let dir_header = header_value(headers, DIR_BASE_HEADER);
    let file_header = header_value(headers, FILE_NAME_HEADER);
    if dir_header.is_none() && file_header.is_none() {
        return RouteDecision::Default;
    }

    let dir = dir_header
        .map(PathBuf::from)
        .or_else(|| {
            defaults
                .dir_base
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(PathBuf::from)
        });
    let file_name = file_header
        .map(str::to_string)
        .or_else(|| Some(defaults.file_name.clone()).filter(|f| !f.trim().is_empty()));

    match (dir, file_name) {
        (Some(dir), Some(file_name)) => RouteDecision::CertBound(CertificateParams {
            identity,
            source: CertificateSource::file(dir, file_name, secret),
        }),
        _ => {
            tracing::debug!(
                identity = %identity,
                "Incomplete certificate file reference, using default client"
            );
            RouteDecision::Default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_no_identity_routes_default() {
        let decision = classify_route(&HeaderMap::new(), &CertificateConfig::default());
        assert_eq!(decision, RouteDecision::Default);

        let decision = classify_route(
            &headers(&[(CERTIFICATE_HEADER, "AAAA"), (CLIENT_SECRET_HEADER, "pw")]),
            &CertificateConfig::default(),
        );
        assert_eq!(decision, RouteDecision::Default);
    }

    #[test]
    fn test_missing_secret_routes_default() {
        let decision = classify_route(
            &headers(&[(CLIENT_ID_HEADER, "acme"), (CERTIFICATE_HEADER, "AAAA")]),
            &CertificateConfig::default(),
        );
        assert_eq!(decision, RouteDecision::Default);
    }

    #[test]
    fn test_inline_certificate() {
        let decision = classify_route(
            &headers(&[
                (CLIENT_ID_HEADER, "acme"),
                (CLIENT_SECRET_HEADER, "pw"),
                (CERTIFICATE_HEADER, "AAAA"),
                (FILE_NAME_HEADER, "ignored.p12"),
            ]),
            &CertificateConfig::default(),
        );
        let RouteDecision::CertBound(params) = decision else {
            panic!("expected certificate-bound route");
        };
        assert_eq!(params.identity.as_str(), "acme");
        assert_eq!(params.source, CertificateSource::inline("AAAA", "pw"));
    }

    #[test]
    fn test_file_reference_with_defaults() {
        let defaults = CertificateConfig {
            dir_base: Some("/etc/certs".to_string()),
            ..Default::default()
        };
        let decision = classify_route(
            &headers(&[
                (CLIENT_ID_HEADER, "acme"),
                (CLIENT_SECRET_HEADER, "pw"),
                (FILE_NAME_HEADER, "acme.p12"),
            ]),
            &defaults,
        );
        let RouteDecision::CertBound(params) = decision else {
            panic!("expected certificate-bound route");
        };
        assert_eq!(
            params.source.path_for(&params.identity),
            Some(PathBuf::from("/etc/certs/acme/acme.p12"))
        );
    }

    #[test]
    fn test_file_reference_without_dir_routes_default() {
        let decision = classify_route(
            &headers(&[
                (CLIENT_ID_HEADER, "acme"),
                (CLIENT_SECRET_HEADER, "pw"),
                (FILE_NAME_HEADER, "acme.p12"),
            ]),
            &CertificateConfig::default(),
        );
        assert_eq!(decision, RouteDecision::Default);
    }

    #[test]
    fn test_params_round_trip_through_headers() {
        let params = CertificateParams {
            identity: Identity::new("acme").unwrap(),
            source: CertificateSource::file("/srv/certs", "client.p12", "pw"),
        };
        let decision = classify_route(&params.to_headers().unwrap(), &CertificateConfig::default());
        assert_eq!(decision, RouteDecision::CertBound(params));
    }
}
