//! Identities and the places a client certificate can come from.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Key under which a certificate and its bound client are cached.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(Arc<str>);

impl Identity {
    /// Create an identity from a client id. Blank ids are rejected.
    pub fn new(client_id: impl AsRef<str>) -> Option<Self> {
        let id = client_id.as_ref().trim();
        if id.is_empty() {
            None
        } else {
            Some(Self(Arc::from(id)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Secret material for one identity: an inline PKCS#12 blob or a file reference.
#[derive(Clone, PartialEq, Eq)]
pub enum CertificateSource {
    /// Base64-encoded PKCS#12 archive.
    Inline { encoded: String, passphrase: String },
    /// PKCS#12 file at `dir/<identity>/file_name`.
    FileRef {
        dir: PathBuf,
        file_name: String,
        passphrase: String,
    },
}

impl CertificateSource {
    pub fn inline(encoded: impl Into<String>, passphrase: impl Into<String>) -> Self {
        CertificateSource::Inline {
            encoded: encoded.into(),
            passphrase: passphrase.into(),
        }
    }

    pub fn file(
        dir: impl Into<PathBuf>,
        file_name: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        CertificateSource::FileRef {
            dir: dir.into(),
            file_name: file_name.into(),
            passphrase: passphrase.into(),
        }
    }

    pub fn passphrase(&self) -> &str {
        match self {
            CertificateSource::Inline { passphrase, .. }
            | CertificateSource::FileRef { passphrase, .. } => passphrase,
        }
    }

    /// Location of the archive for file-based sources.
    pub fn path_for(&self, identity: &Identity) -> Option<PathBuf> {
        match self {
            CertificateSource::Inline { .. } => None,
            CertificateSource::FileRef { dir, file_name, .. } => {
                Some(certificate_path(dir, identity, file_name))
            }
        }
    }

    /// SHA-256 over the variant, its location or blob, and the passphrase.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.kind().as_bytes());
        match self {
            CertificateSource::Inline { encoded, .. } => {
                hasher.update([0]);
                hasher.update(encoded.trim().as_bytes());
            }
            CertificateSource::FileRef { dir, file_name, .. } => {
                hasher.update([0]);
                hasher.update(dir.as_os_str().as_encoded_bytes());
                hasher.update([0]);
                hasher.update(file_name.as_bytes());
            }
        }
        hasher.update([0]);
        hasher.update(self.passphrase().as_bytes());
        hasher.finalize().into()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CertificateSource::Inline { .. } => "inline",
            CertificateSource::FileRef { .. } => "file",
        }
    }
}

pub(crate) fn certificate_path(dir: &Path, identity: &Identity, file_name: &str) -> PathBuf {
    dir.join(identity.as_str()).join(file_name)
}

// Passphrases and blobs never reach logs.
impl fmt::Debug for CertificateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateSource::Inline { encoded, .. } => f
                .debug_struct("Inline")
                .field("encoded_len", &encoded.len())
                .field("passphrase", &"<redacted>")
                .finish(),
            CertificateSource::FileRef { dir, file_name, .. } => f
                .debug_struct("FileRef")
                .field("dir", dir)
                .field("file_name", file_name)
                .field("passphrase", &"<redacted>")
                .finish(),
        }
    }
}
