//! Bound client registry.
//!
//! # Responsibilities
//! - Build one transport per identity, presenting that identity's certificate
//! - Hand the same transport to every caller using the identity
//! - Provide the certificate-less default transport
//! - Trust extra root certificates for upstreams behind a private CA
//!
//! # Design Decisions
//! - Transports are never rebuilt implicitly; rotation goes through `forget`
//! - Construction is single-flight, so concurrent first calls share one client

use std::path::Path;
use std::sync::Arc;

use crate::cache::OnceMap;
use crate::certificates::{CertificateMaterial, Identity};
use crate::error::{ApiError, ApiResult};
use crate::observability::metrics;

const USER_AGENT: &str = concat!("cert-relay/", env!("CARGO_PKG_VERSION"));

/// A transport permanently associated with one certificate.
#[derive(Debug)]
pub struct BoundClient {
    identity: Identity,
    client: reqwest::Client,
    fingerprint: [u8; 32],
}

impl BoundClient {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Transport presenting the identity's certificate.
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }
}

/// Registry of identity-scoped transports.
#[derive(Debug)]
pub struct BoundClientRegistry {
    clients: OnceMap<Identity, BoundClient>,
    default_client: reqwest::Client,
    roots: Vec<reqwest::Certificate>,
}

impl BoundClientRegistry {
    /// Create an empty registry with a certificate-less default transport.
    pub fn new() -> ApiResult<Self> {
        Self::with_root_certificates(Vec::new())
    }

    /// Like [`new`](Self::new), with every transport also trusting `roots`.
    pub fn with_root_certificates(roots: Vec<reqwest::Certificate>) -> ApiResult<Self> {
        let default_client = base_builder(&roots)
            .build()
            .map_err(|e| ApiError::Configuration(format!("default transport: {e}")))?;

        Ok(Self {
            clients: OnceMap::new(),
            default_client,
            roots,
        })
    }

    /// Transport used when a call carries no certificate routing.
    pub fn default_client(&self) -> &reqwest::Client {
        &self.default_client
    }

    /// Return the transport for `identity`, creating it from `material` on first use.
    ///
    /// A cached transport built from different material is refused with
    /// [`ApiError::CertificateMismatch`].
    pub async fn client_for(
        &self,
        identity: &Identity,
        material: &CertificateMaterial,
    ) -> ApiResult<Arc<BoundClient>> {
        let bound = match self.clients.get(identity) {
            Some(client) => client,
            None => self.build(identity, material).await?,
        };

        if bound.fingerprint != *material.fingerprint() {
            return Err(ApiError::CertificateMismatch {
                identity: identity.to_string(),
            });
        }
        Ok(bound)
    }

    async fn build(
        &self,
        identity: &Identity,
        material: &CertificateMaterial,
    ) -> ApiResult<Arc<BoundClient>> {
        self.clients
            .get_or_try_init(identity, || async {
                let client = base_builder(&self.roots)
                    .use_native_tls()
                    .identity(material.tls_identity().clone())
                    .build()
                    .map_err(|e| ApiError::CertificateDecode {
                        identity: identity.to_string(),
                        reason: format!("transport rejected certificate: {e}"),
                    })?;

                metrics::record_bound_client_created();
                tracing::info!(
                    identity = %identity,
                    origin = material.origin(),
                    "Bound client created"
                );

                Ok(BoundClient {
                    identity: identity.clone(),
                    client,
                    fingerprint: *material.fingerprint(),
                })
            })
            .await
    }

    pub fn get(&self, identity: &Identity) -> Option<Arc<BoundClient>> {
        self.clients.get(identity)
    }

    /// Drop the transport for one identity; the next call rebuilds it.
    pub fn forget(&self, identity: &Identity) -> bool {
        let removed = self.clients.remove(identity);
        if removed {
            tracing::info!(identity = %identity, "Bound client dropped");
        }
        removed
    }

    pub fn forget_all(&self) -> usize {
        let removed = self.clients.clear();
        tracing::info!(count = removed, "Bound client registry cleared");
        removed
    }

    pub fn identities(&self) -> Vec<Identity> {
        let mut ids = self.clients.keys();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Read PEM root certificates, one or more per file.
pub fn load_root_certificates<P: AsRef<Path>>(paths: &[P]) -> ApiResult<Vec<reqwest::Certificate>> {
    let mut roots = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let pem = std::fs::read(path).map_err(|e| {
            ApiError::Configuration(format!("root certificate {}: {e}", path.display()))
        })?;
        let certs = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
            ApiError::Configuration(format!("root certificate {}: {e}", path.display()))
        })?;
        if certs.is_empty() {
            return Err(ApiError::Configuration(format!(
                "root certificate {}: no certificates found",
                path.display()
            )));
        }
        roots.extend(certs);
    }
    if !roots.is_empty() {
        tracing::info!(count = roots.len(), "Extra root certificates loaded");
    }
    Ok(roots)
}

fn base_builder(roots: &[reqwest::Certificate]) -> reqwest::ClientBuilder {
    roots.iter().cloned().fold(
        reqwest::Client::builder().user_agent(USER_AGENT),
        reqwest::ClientBuilder::add_root_certificate,
    )
}
