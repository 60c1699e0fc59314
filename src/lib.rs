//! Checks a host's TLS certificate and reports the days left until expiry.
//!
//! The check is one linear pipeline: resolve the hostname, fetch the leaf
//! certificate over an SNI-aware handshake, stage it as a PEM artifact,
//! parse the `notAfter` field, and compare it against the current time.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use openssl::asn1::Asn1Time;
use openssl::ssl::{Ssl, SslContext, SslMethod, SslVerifyMode};
use openssl::x509::X509Ref;
use serde::{Deserialize, Serialize};
use url::Url;

pub mod artifact;
pub mod error;
pub mod metrics;

use artifact::CertificateArtifact;
use error::CheckError;

const SECONDS_PER_DAY: i64 = 86_400;

/// Default connect/read timeout in seconds.
pub static TIMEOUT: u64 = 30;

/// A host to check, reduced to hostname and port.
///
/// Accepts the spellings `example.com`, `example.com:8443`, and URL forms
/// such as `https://secure.example.com:9443`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    pub host: String,
    pub port: u16,
}

impl HostTarget {
    /// Parses a host spelling, falling back to `default_port` when the input
    /// does not carry one.
    pub fn parse(input: &str, default_port: u16) -> Result<HostTarget, CheckError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CheckError::InvalidInput {
                field: "hostname".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }

        if trimmed.contains("://") {
            let url = Url::parse(trimmed).map_err(|e| CheckError::InvalidInput {
                field: "hostname".to_string(),
                reason: e.to_string(),
            })?;
            let host = url.host_str().ok_or_else(|| CheckError::InvalidInput {
                field: "hostname".to_string(),
                reason: "URL carries no host".to_string(),
            })?;
            return Ok(HostTarget {
                host: host.to_string(),
                port: url.port().unwrap_or(default_port),
            });
        }

        match trimmed.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(CheckError::InvalidInput {
                        field: "hostname".to_string(),
                        reason: "missing hostname before port".to_string(),
                    });
                }
                let port = port.parse::<u16>().map_err(|_| CheckError::InvalidInput {
                    field: "hostname".to_string(),
                    reason: format!("invalid port '{}'", port),
                })?;
                Ok(HostTarget {
                    host: host.to_string(),
                    port,
                })
            }
            None => Ok(HostTarget {
                host: trimmed.to_string(),
                port: default_port,
            }),
        }
    }
}

/// Resolves a hostname to socket addresses.
pub trait Resolver {
    fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, CheckError>;
}

/// Resolver backed by the operating system resolver.
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, CheckError> {
        let addresses: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| CheckError::DnsResolution {
                hostname: host.to_string(),
                source: e,
            })?
            .collect();
        if addresses.is_empty() {
            return Err(CheckError::DnsResolution {
                hostname: host.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "hostname resolved to no addresses"),
            });
        }
        Ok(addresses)
    }
}

/// Retrieves the leaf certificate presented by a host, PEM encoded.
pub trait CertificateFetcher {
    fn fetch_pem(&self, host: &str, addr: SocketAddr) -> Result<Vec<u8>, CheckError>;
}

/// Fetcher that performs a real TLS handshake via OpenSSL.
///
/// Verification is disabled: the point is to read the certificate, not to
/// evaluate trust in it.
pub struct TlsCertificateFetcher {
    timeout: Duration,
}

impl TlsCertificateFetcher {
    pub fn new(timeout: Duration) -> Self {
        TlsCertificateFetcher { timeout }
    }
}

impl CertificateFetcher for TlsCertificateFetcher {
    fn fetch_pem(&self, host: &str, addr: SocketAddr) -> Result<Vec<u8>, CheckError> {
        let mut builder = SslContext::builder(SslMethod::tls())?;
        builder.set_verify(SslVerifyMode::empty());
        let context = builder.build();

        let mut ssl = Ssl::new(&context)?;
        ssl.set_hostname(host)?;

        let tcp_stream = TcpStream::connect_timeout(&addr, self.timeout).map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut {
                CheckError::Timeout {
                    operation: format!("connecting to {}", addr),
                }
            } else {
                CheckError::ConnectionFailed {
                    address: addr.to_string(),
                    source: e,
                }
            }
        })?;
        tcp_stream.set_read_timeout(Some(self.timeout))?;

        let stream = ssl.connect(tcp_stream)?;
        let cert = stream
            .ssl()
            .peer_certificate()
            .ok_or_else(|| CheckError::CertificateError {
                reason: format!("no certificate presented by {}", host),
            })?;
        Ok(cert.to_pem()?)
    }
}

/// Outcome of one expiry check.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExpiryReport {
    pub hostname: String,
    pub not_after: String,
    pub expiry_epoch: i64,
    pub checked_epoch: i64,
    pub days_left: i64,
    pub is_valid: bool,
}

impl ExpiryReport {
    pub fn new(
        hostname: &str,
        not_after: String,
        expiry_epoch: i64,
        checked_epoch: i64,
    ) -> ExpiryReport {
        ExpiryReport {
            hostname: hostname.to_string(),
            not_after,
            expiry_epoch,
            checked_epoch,
            days_left: (expiry_epoch - checked_epoch) / SECONDS_PER_DAY,
            is_valid: expiry_epoch > checked_epoch,
        }
    }
}

/// Runs the expiry pipeline: resolve, fetch, stage, parse, decide.
pub struct ExpiryChecker<R = SystemResolver, F = TlsCertificateFetcher> {
    resolver: R,
    fetcher: F,
}

impl ExpiryChecker {
    pub fn new(timeout: Duration) -> ExpiryChecker {
        ExpiryChecker {
            resolver: SystemResolver,
            fetcher: TlsCertificateFetcher::new(timeout),
        }
    }
}

impl<R: Resolver, F: CertificateFetcher> ExpiryChecker<R, F> {
    pub fn with_parts(resolver: R, fetcher: F) -> ExpiryChecker<R, F> {
        ExpiryChecker { resolver, fetcher }
    }

    pub fn check(&self, target: &HostTarget) -> Result<ExpiryReport, CheckError> {
        let addresses = self.resolver.resolve(&target.host, target.port)?;
        let addr = addresses
            .into_iter()
            .next()
            .ok_or_else(|| CheckError::DnsResolution {
                hostname: target.host.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "hostname resolved to no addresses"),
            })?;

        let pem = self.fetcher.fetch_pem(&target.host, addr)?;

        let mut artifact = CertificateArtifact::new()?;
        artifact.write_pem(&pem)?;
        if artifact.is_trivial()? {
            return Err(CheckError::CertificateError {
                reason: format!("empty certificate received from {}", target.host),
            });
        }

        let cert = artifact.read_x509()?;
        let not_after = cert.not_after().to_string();
        let expiry_epoch = not_after_epoch(&cert)?;
        let checked_epoch = unix_now()?;

        Ok(ExpiryReport::new(
            &target.host,
            not_after,
            expiry_epoch,
            checked_epoch,
        ))
    }
}

fn not_after_epoch(cert: &X509Ref) -> Result<i64, CheckError> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(cert.not_after())?;
    Ok(i64::from(diff.days) * SECONDS_PER_DAY + i64::from(diff.secs))
}

fn unix_now() -> Result<i64, CheckError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| CheckError::Other {
            message: format!("system clock is before the Unix epoch: {}", e),
        })?;
    Ok(now.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::asn1::Asn1Time;
    use openssl::hash::MessageDigest;
    use openssl::nid::Nid;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::x509::{X509, X509NameBuilder};

    fn mint_certificate(not_after: &Asn1Time) -> Vec<u8> {
        let rsa = Rsa::generate(2048).unwrap();
        let key = PKey::from_rsa(rsa).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, "localhost").unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::from_unix(unix_now().unwrap() - SECONDS_PER_DAY).unwrap())
            .unwrap();
        builder.set_not_after(not_after).unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        builder.build().to_pem().unwrap()
    }

    struct FailingResolver;

    impl Resolver for FailingResolver {
        fn resolve(&self, host: &str, _port: u16) -> Result<Vec<SocketAddr>, CheckError> {
            Err(CheckError::DnsResolution {
                hostname: host.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "lookup failed"),
            })
        }
    }

    struct FixedResolver;

    impl Resolver for FixedResolver {
        fn resolve(&self, _host: &str, port: u16) -> Result<Vec<SocketAddr>, CheckError> {
            Ok(vec![SocketAddr::from(([127, 0, 0, 1], port))])
        }
    }

    struct PemFetcher(Vec<u8>);

    impl CertificateFetcher for PemFetcher {
        fn fetch_pem(&self, _host: &str, _addr: SocketAddr) -> Result<Vec<u8>, CheckError> {
            Ok(self.0.clone())
        }
    }

    struct RefusingFetcher;

    impl CertificateFetcher for RefusingFetcher {
        fn fetch_pem(&self, _host: &str, addr: SocketAddr) -> Result<Vec<u8>, CheckError> {
            Err(CheckError::ConnectionFailed {
                address: addr.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            })
        }
    }

    #[test]
    fn test_parse_bare_hostname() {
        let target = HostTarget::parse("example.com", 443).unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 443);
    }

    #[test]
    fn test_parse_hostname_with_port() {
        let target = HostTarget::parse("example.com:8443", 443).unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 8443);
    }

    #[test]
    fn test_parse_url_forms() {
        let plain = HostTarget::parse("https://secure.example.com", 443).unwrap();
        assert_eq!(plain.host, "secure.example.com");
        assert_eq!(plain.port, 443);

        let with_port = HostTarget::parse("https://secure.example.com:9443", 443).unwrap();
        assert_eq!(with_port.host, "secure.example.com");
        assert_eq!(with_port.port, 9443);
    }

    #[test]
    fn test_parse_rejects_empty_hostname() {
        let err = HostTarget::parse("  ", 443).unwrap_err();
        assert!(matches!(err, CheckError::InvalidInput { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        assert!(HostTarget::parse("example.com:notaport", 443).is_err());
        assert!(HostTarget::parse("example.com:99999", 443).is_err());
        assert!(HostTarget::parse(":443", 443).is_err());
    }

    #[test]
    fn test_day_difference_truncates_toward_zero() {
        let now = 1_700_000_000;

        let almost_a_day = ExpiryReport::new("h", String::new(), now + SECONDS_PER_DAY - 1, now);
        assert_eq!(almost_a_day.days_left, 0);
        assert!(almost_a_day.is_valid);

        let ten_days = ExpiryReport::new("h", String::new(), now + 10 * SECONDS_PER_DAY + 5, now);
        assert_eq!(ten_days.days_left, 10);

        let just_expired = ExpiryReport::new("h", String::new(), now - 1, now);
        assert_eq!(just_expired.days_left, 0);
        assert!(!just_expired.is_valid);

        let three_days_ago = ExpiryReport::new("h", String::new(), now - 3 * SECONDS_PER_DAY - 5, now);
        assert_eq!(three_days_ago.days_left, -3);
    }

    #[test]
    fn test_expiring_this_instant_is_invalid() {
        let now = 1_700_000_000;
        let report = ExpiryReport::new("h", String::new(), now, now);
        assert_eq!(report.days_left, 0);
        assert!(!report.is_valid);
    }

    #[test]
    fn test_check_reports_dns_failure() {
        let checker = ExpiryChecker::with_parts(FailingResolver, RefusingFetcher);
        let target = HostTarget::parse("nosuchhost.invalid", 443).unwrap();
        let err = checker.check(&target).unwrap_err();
        assert!(matches!(err, CheckError::DnsResolution { .. }));
        assert_eq!(err.exit_code(), 255);
    }

    #[test]
    fn test_check_reports_refused_connection() {
        let checker = ExpiryChecker::with_parts(FixedResolver, RefusingFetcher);
        let target = HostTarget::parse("localhost", 443).unwrap();
        let err = checker.check(&target).unwrap_err();
        assert!(matches!(err, CheckError::ConnectionFailed { .. }));
        assert_eq!(err.exit_code(), 254);
    }

    #[test]
    fn test_check_rejects_trivial_artifact() {
        let checker = ExpiryChecker::with_parts(FixedResolver, PemFetcher(Vec::new()));
        let target = HostTarget::parse("localhost", 443).unwrap();
        let err = checker.check(&target).unwrap_err();
        assert!(matches!(err, CheckError::CertificateError { .. }));
        assert_eq!(err.exit_code(), 254);
    }

    #[test]
    fn test_check_reports_days_for_future_certificate() {
        let not_after = Asn1Time::from_unix(unix_now().unwrap() + 30 * SECONDS_PER_DAY).unwrap();
        let pem = mint_certificate(&not_after);

        let checker = ExpiryChecker::with_parts(FixedResolver, PemFetcher(pem));
        let target = HostTarget::parse("localhost", 443).unwrap();
        let report = checker.check(&target).unwrap();

        assert_eq!(report.hostname, "localhost");
        assert!(report.is_valid);
        assert!((29..=30).contains(&report.days_left));
        assert!(!report.not_after.is_empty());
    }

    #[test]
    fn test_check_reports_expired_certificate() {
        let not_after = Asn1Time::from_unix(unix_now().unwrap() - 3 * SECONDS_PER_DAY - 5).unwrap();
        let pem = mint_certificate(&not_after);

        let checker = ExpiryChecker::with_parts(FixedResolver, PemFetcher(pem));
        let target = HostTarget::parse("localhost", 443).unwrap();
        let report = checker.check(&target).unwrap();

        assert!(!report.is_valid);
        assert!(report.days_left <= -2);
    }

    #[test]
    fn test_not_after_epoch_round_trips() {
        let expiry = unix_now().unwrap() + 14 * SECONDS_PER_DAY;
        let pem = mint_certificate(&Asn1Time::from_unix(expiry).unwrap());
        let cert = X509::from_pem(&pem).unwrap();
        assert_eq!(not_after_epoch(&cert).unwrap(), expiry);
    }
}
