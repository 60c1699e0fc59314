//! Error types for the certificate expiry pipeline.
//!
//! Each pipeline stage reports its failure as a typed variant instead of an
//! inspected child-process exit status. The variant decides the process exit
//! code via [`CheckError::exit_code`].

use std::fmt;
use std::io;

/// Error type for certificate expiry check failures.
///
/// Returned when any stage of the pipeline fails: resolution, connection,
/// handshake, artifact handling, or certificate parsing.
#[derive(Debug)]
pub enum CheckError {
    /// DNS resolution failed for the given hostname
    DnsResolution {
        /// The hostname that failed to resolve
        hostname: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TCP connection failed to the target address
    ConnectionFailed {
        /// The address (host:port) that connection failed to
        address: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TLS handshake failed
    HandshakeFailed {
        /// Details about why the handshake failed
        details: String,
    },

    /// Certificate retrieval, artifact, or parsing error
    CertificateError {
        /// Description of what went wrong
        reason: String,
    },

    /// Network operation timeout
    Timeout {
        /// Description of which operation timed out
        operation: String,
    },

    /// Invalid input provided on the command line
    InvalidInput {
        /// Which field/parameter was invalid
        field: String,
        /// Why it was invalid
        reason: String,
    },

    /// OpenSSL error occurred
    OpenSSLError {
        /// The underlying OpenSSL error
        details: String,
    },

    /// Generic I/O error
    IoError {
        /// The underlying I/O error
        source: io::Error,
    },

    /// A generic error with a custom message
    Other {
        /// Error message
        message: String,
    },
}

impl CheckError {
    /// Process exit code for this failure.
    ///
    /// 255 is reserved for DNS failures and 2 for usage errors; everything
    /// else maps to 254 so no failure ever collides with exit 1, which means
    /// "certificate expired".
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::DnsResolution { .. } => 255,
            Self::InvalidInput { .. } => 2,
            _ => 254,
        }
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DnsResolution { hostname, .. } => {
                write!(
                    f,
                    "Failed to resolve hostname: {}. Check that the hostname is spelled correctly and your DNS configuration is working.",
                    hostname
                )
            }
            Self::ConnectionFailed { address, .. } => {
                write!(
                    f,
                    "Connection failed to: {}. Verify the host is running a TLS service and is reachable.",
                    address
                )
            }
            Self::HandshakeFailed { details } => {
                write!(f, "TLS handshake failed: {}", details)
            }
            Self::CertificateError { reason } => {
                write!(f, "Certificate error: {}", reason)
            }
            Self::Timeout { operation } => {
                write!(f, "Operation timed out: {}", operation)
            }
            Self::InvalidInput { field, reason } => {
                write!(f, "Invalid input for '{}': {}", field, reason)
            }
            Self::OpenSSLError { details } => {
                write!(f, "OpenSSL error: {}", details)
            }
            Self::IoError { source } => {
                write!(f, "I/O error: {}", source)
            }
            Self::Other { message } => {
                write!(f, "{}", message)
            }
        }
    }
}

impl std::error::Error for CheckError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DnsResolution { source, .. } => Some(source),
            Self::ConnectionFailed { source, .. } => Some(source),
            Self::IoError { source } => Some(source),
            _ => None,
        }
    }
}

// Conversion implementations for compatibility

impl From<io::Error> for CheckError {
    fn from(e: io::Error) -> Self {
        Self::IoError { source: e }
    }
}

impl From<&str> for CheckError {
    fn from(s: &str) -> Self {
        Self::Other {
            message: s.to_string(),
        }
    }
}

impl From<String> for CheckError {
    fn from(s: String) -> Self {
        Self::Other { message: s }
    }
}

impl From<openssl::error::ErrorStack> for CheckError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::OpenSSLError {
            details: e.to_string(),
        }
    }
}

impl<S: fmt::Debug> From<openssl::ssl::HandshakeError<S>> for CheckError {
    fn from(e: openssl::ssl::HandshakeError<S>) -> Self {
        Self::HandshakeFailed {
            details: format!("{}", e),
        }
    }
}
