//! Certificate inspection for `check-ssl` and the status report

use crate::config::EnvConfig;
use crate::error::OpsError;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};
use x509_parser::prelude::*;

/// Renewal warning window, matching the certificate authority's recommendation
pub const RENEWAL_WINDOW_DAYS: i64 = 30;

/// Summary of the leaf certificate in a PEM chain
#[derive(Debug, Clone)]
pub struct CertReport {
    pub subject: String,
    pub issuer: String,
    pub domains: Vec<String>,
    pub not_after: DateTime<Utc>,
    pub days_remaining: i64,
}

impl CertReport {
    pub fn is_expired(&self) -> bool {
        self.days_remaining < 0
    }

    pub fn needs_renewal(&self) -> bool {
        self.days_remaining < RENEWAL_WINDOW_DAYS
    }
}

/// Inspect the certificate chain issued for the primary domain
pub fn inspect_live_cert(config: &EnvConfig) -> anyhow::Result<CertReport> {
    inspect(&config.live_cert_path())
}

/// Parse the first (leaf) certificate of a PEM chain and summarise it
pub fn inspect(path: &Path) -> anyhow::Result<CertReport> {
    if !path.exists() {
        return Err(OpsError::MissingCertificate(path.to_path_buf()).into());
    }

    let file = File::open(path)
        .map_err(|e| anyhow::anyhow!("failed to open certificate {}: {}", path.display(), e))?;
    let mut reader = BufReader::new(file);

    let leaf = rustls_pemfile::certs(&mut reader)
        .next()
        .ok_or_else(|| anyhow::anyhow!("no certificates found in {}", path.display()))?
        .map_err(|e| anyhow::anyhow!("failed to parse PEM from {}: {}", path.display(), e))?;

    let (_, cert) = X509Certificate::from_der(leaf.as_ref())
        .map_err(|e| anyhow::anyhow!("failed to parse X.509 certificate: {}", e))?;

    let not_after_ts = cert.validity().not_after.timestamp();
    let now_ts = Utc::now().timestamp();

    let mut domains = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                domains.push(dns.to_string());
            }
        }
    }

    let report = CertReport {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        domains,
        not_after: DateTime::from_timestamp(not_after_ts, 0)
            .ok_or_else(|| anyhow::anyhow!("certificate notAfter is out of range"))?,
        days_remaining: days_remaining(not_after_ts, now_ts),
    };

    if report.is_expired() {
        warn!(path = %path.display(), "Certificate has expired");
    } else if report.needs_renewal() {
        warn!(
            days_remaining = report.days_remaining,
            "Certificate expires soon, renewal needed"
        );
    } else {
        debug!(days_remaining = report.days_remaining, "Certificate validity check passed");
    }

    Ok(report)
}

/// Whole days until expiry; negative once the certificate has expired
pub fn days_remaining(expiry_ts: i64, now_ts: i64) -> i64 {
    (expiry_ts - now_ts).div_euclid(24 * 60 * 60)
}
