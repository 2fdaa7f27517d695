//! Per-identity certificate cache.
//!
//! # Responsibilities
//! - Decode a PKCS#12 archive from an inline blob or a file
//! - Cache the decoded material per identity for the process lifetime
//! - Decode exactly once per identity, even under concurrent first use
//! - Refuse cached material to callers whose credentials differ from the loader's

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::cache::OnceMap;
use crate::certificates::source::{certificate_path, CertificateSource, Identity};
use crate::error::{ApiError, ApiResult};
use crate::observability::metrics;

/// A decoded client certificate plus private key, ready for the TLS handshake.
pub struct CertificateMaterial {
    identity: Identity,
    tls_identity: reqwest::Identity,
    origin: &'static str,
    path: Option<PathBuf>,
    fingerprint: [u8; 32],
}

impl CertificateMaterial {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Identity handed to the transport builder.
    pub fn tls_identity(&self) -> &reqwest::Identity {
        &self.tls_identity
    }

    /// "inline" or "file".
    pub fn origin(&self) -> &'static str {
        self.origin
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// Fingerprint of the source this material was loaded from.
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }
}

impl fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("identity", &self.identity)
            .field("origin", &self.origin)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Thread-safe certificate cache keyed by identity.
#[derive(Debug, Default)]
pub struct CertificateStore {
    cache: OnceMap<Identity, CertificateMaterial>,
    decodes: AtomicU64,
}

impl CertificateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached material for `identity`, loading it from `source` on first use.
    ///
    /// Later calls for the same identity reuse the cached material without a
    /// second decode, provided `source` has the same fingerprint; otherwise they
    /// fail with [`ApiError::CertificateMismatch`]. Use [`forget`](Self::forget)
    /// to pick up a rotated certificate.
    pub async fn resolve(
        &self,
        identity: &Identity,
        source: &CertificateSource,
    ) -> ApiResult<Arc<CertificateMaterial>> {
        let material = match self.cache.get(identity) {
            Some(material) => material,
            None => {
                self.cache
                    .get_or_try_init(identity, || async {
                        let result = self.load(identity, source).await;
                        metrics::record_certificate_load(result.is_ok());
                        result
                    })
                    .await?
            }
        };

        if material.fingerprint != source.fingerprint() {
            tracing::warn!(
                identity = %identity,
                origin = source.kind(),
                "Credentials do not match cached certificate"
            );
            return Err(ApiError::CertificateMismatch {
                identity: identity.to_string(),
            });
        }
        Ok(material)
    }

    /// Cached material without triggering a load.
    pub fn get(&self, identity: &Identity) -> Option<Arc<CertificateMaterial>> {
        self.cache.get(identity)
    }

    /// Drop the cached material for one identity.
    pub fn forget(&self, identity: &Identity) -> bool {
        let removed = self.cache.remove(identity);
        if removed {
            tracing::info!(identity = %identity, "Certificate evicted");
        }
        removed
    }

    /// Drop every cached certificate.
    pub fn forget_all(&self) -> usize {
        let removed = self.cache.clear();
        tracing::info!(count = removed, "Certificate cache cleared");
        removed
    }

    pub fn identities(&self) -> Vec<Identity> {
        let mut ids = self.cache.keys();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Successful decodes since construction.
    pub fn decode_count(&self) -> u64 {
        self.decodes.load(Ordering::Relaxed)
    }

    async fn load(
        &self,
        identity: &Identity,
        source: &CertificateSource,
    ) -> ApiResult<CertificateMaterial> {
        tracing::debug!(identity = %identity, origin = source.kind(), "Loading client certificate");

        let der = match source {
            CertificateSource::Inline { encoded, .. } => {
                STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| ApiError::CertificateDecode {
                        identity: identity.to_string(),
                        reason: format!("invalid base64: {e}"),
                    })?
            }
            CertificateSource::FileRef { dir, file_name, .. } => {
                let path = certificate_path(dir, identity, file_name);
                if !is_path_segment(identity.as_str()) || !is_path_segment(file_name) {
                    return Err(ApiError::CertificateNotFound {
                        identity: identity.to_string(),
                        path,
                        reason: "client id and file name must be single path segments".to_string(),
                    });
                }
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| ApiError::CertificateNotFound {
                        identity: identity.to_string(),
                        path,
                        reason: e.to_string(),
                    })?
            }
        };

        let passphrase = source.passphrase().to_owned();
        let decoded = tokio::task::spawn_blocking(move || {
            reqwest::Identity::from_pkcs12_der(&der, &passphrase)
        })
        .await
        .map_err(|e| ApiError::CertificateDecode {
            identity: identity.to_string(),
            reason: format!("decode task failed: {e}"),
        })?;

        let tls_identity = decoded.map_err(|e| ApiError::CertificateDecode {
            identity: identity.to_string(),
            reason: e.to_string(),
        })?;

        self.decodes.fetch_add(1, Ordering::Relaxed);
        tracing::info!(identity = %identity, origin = source.kind(), "Client certificate loaded");

        Ok(CertificateMaterial {
            identity: identity.clone(),
            tls_identity,
            origin: source.kind(),
            path: source.path_for(identity),
            fingerprint: source.fingerprint(),
        })
    }
}

fn is_path_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}
