//! Scoped temporary storage for the retrieved certificate.
//!
//! The PEM blob captured from the handshake is staged in a named temporary
//! file. The file is owned by [`CertificateArtifact`] and removed when the
//! value drops, on every exit path including early error returns and panic
//! unwinds.

use std::fs;
use std::io::Write;
use std::path::Path;

use openssl::x509::X509;
use tempfile::NamedTempFile;

use crate::error::CheckError;

/// A certificate artifact staged on disk for the lifetime of one check.
pub struct CertificateArtifact {
    file: NamedTempFile,
}

impl CertificateArtifact {
    /// Creates an empty artifact file in the system temp directory.
    pub fn new() -> Result<Self, CheckError> {
        let file = tempfile::Builder::new()
            .prefix("certdays-")
            .suffix(".pem")
            .tempfile()?;
        Ok(CertificateArtifact { file })
    }

    /// Writes the PEM bytes captured from the handshake into the artifact.
    pub fn write_pem(&mut self, pem: &[u8]) -> Result<(), CheckError> {
        self.file.write_all(pem)?;
        self.file.flush()?;
        Ok(())
    }

    /// Size of the artifact in bytes.
    pub fn len(&self) -> Result<u64, CheckError> {
        Ok(self.file.as_file().metadata()?.len())
    }

    /// True when the artifact holds at most one byte, which counts as a
    /// failed retrieval.
    pub fn is_trivial(&self) -> Result<bool, CheckError> {
        Ok(self.len()? <= 1)
    }

    /// Path of the underlying temporary file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Reads the artifact back and parses it as a single PEM certificate.
    pub fn read_x509(&self) -> Result<X509, CheckError> {
        let pem = fs::read(self.path())?;
        X509::from_pem(&pem).map_err(|e| CheckError::CertificateError {
            reason: format!("failed to parse certificate artifact: {}", e),
        })
    }
}
