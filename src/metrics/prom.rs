use lazy_static::lazy_static;
use prometheus::{labels, register_gauge, Gauge};

use crate::ExpiryReport;

lazy_static! {
    static ref CERTDAYS_DAYS_BEFORE_EXPIRED: Gauge =
        register_gauge!("certdays_days_before_expired", "days before expiration").unwrap();
    static ref CERTDAYS_NOT_AFTER_TIMESTAMP: Gauge = register_gauge!(
        "certdays_not_after_timestamp_seconds",
        "certificate notAfter as unix time"
    )
    .unwrap();
}

/// Function to push metrics to prometheus
/// # Arguments
/// * `report` - Outcome of the expiry check
/// * `prometheus_address` - String of prometheus address
pub fn push_report(report: &ExpiryReport, prometheus_address: &str) {
    CERTDAYS_DAYS_BEFORE_EXPIRED.set(report.days_left as f64);
    CERTDAYS_NOT_AFTER_TIMESTAMP.set(report.expiry_epoch as f64);

    let metric_families = prometheus::gather();
    let prometheus_client = prometheus::push_metrics(
        "certdays",
        labels! {
            "instance".to_owned() => "certdays".to_owned(),
            "job".to_owned() => "certdays".to_owned(),
            "host".to_owned() => report.hostname.to_owned(),
            "expired".to_owned() => (!report.is_valid).to_string(),
        },
        &format!("{}/metrics/job", prometheus_address),
        metric_families,
        None,
    );

    if let Err(e) = prometheus_client {
        eprintln!("Failed to push metrics to prometheus: {}", e);
    }
}
