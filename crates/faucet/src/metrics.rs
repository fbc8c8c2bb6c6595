//! Prometheus metrics for claim admission and resolution.

use drip_common::{ClaimStatus, FaucetError, FaucetResult};
use prometheus::{
    histogram_opts, opts, Encoder, Histogram, IntCounter, IntCounterVec, Registry, TextEncoder,
};
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct FaucetMetrics {
    registry: Registry,

    pub claims_admitted_total: IntCounter,
    pub claims_rejected_total: IntCounterVec,
    pub claim_admission_time: Histogram,
    pub receipts_resolved_total: IntCounterVec,
}

impl FaucetMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let claims_admitted_total = IntCounter::with_opts(opts!(
            "drip_claims_admitted_total",
            "Claims admitted and recorded as pending"
        ))?;

        let claims_rejected_total = IntCounterVec::new(
            opts!(
                "drip_claims_rejected_total",
                "Claims refused, by error code"
            ),
            &["reason"],
        )?;

        let claim_admission_time = Histogram::with_opts(histogram_opts!(
            "drip_claim_admission_seconds",
            "Time spent admitting a claim, lock wait included"
        ))?;

        let receipts_resolved_total = IntCounterVec::new(
            opts!(
                "drip_receipts_resolved_total",
                "Pending receipts resolved by the disbursement processor"
            ),
            &["status"],
        )?;

        registry.register(Box::new(claims_admitted_total.clone()))?;
        registry.register(Box::new(claims_rejected_total.clone()))?;
        registry.register(Box::new(claim_admission_time.clone()))?;
        registry.register(Box::new(receipts_resolved_total.clone()))?;

        Ok(Self {
            registry,
            claims_admitted_total,
            claims_rejected_total,
            claim_admission_time,
            receipts_resolved_total,
        })
    }

    pub fn record_admitted(&self, elapsed: Duration) {
        self.claims_admitted_total.inc();
        self.claim_admission_time.observe(elapsed.as_secs_f64());
    }

    pub fn record_rejected(&self, error: &FaucetError, elapsed: Duration) {
        self.claims_rejected_total
            .with_label_values(&[error.code()])
            .inc();
        self.claim_admission_time.observe(elapsed.as_secs_f64());
        debug!("Recorded rejected claim: {}", error.code());
    }

    pub fn record_resolved(&self, status: ClaimStatus) {
        self.receipts_resolved_total
            .with_label_values(&[status.as_str()])
            .inc();
    }

    pub fn rejected(&self, code: &str) -> u64 {
        self.claims_rejected_total.with_label_values(&[code]).get()
    }

    /// Text exposition format
    pub fn gather(&self) -> FaucetResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| FaucetError::Internal(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| FaucetError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_export() {
        let metrics = FaucetMetrics::new().unwrap();
        metrics.record_admitted(Duration::from_millis(3));
        metrics.record_rejected(
            &FaucetError::WeeklyClaimLimitExceeded { count: 3, limit: 3 },
            Duration::from_millis(1),
        );
        metrics.record_resolved(ClaimStatus::Verified);

        assert_eq!(metrics.claims_admitted_total.get(), 1);
        assert_eq!(metrics.rejected("WEEKLY_CLAIM_LIMIT_EXCEEDED"), 1);
        assert_eq!(metrics.rejected("USER_NOT_VERIFIED"), 0);

        let text = metrics.gather().unwrap();
        assert!(text.contains("drip_claims_admitted_total 1"));
        assert!(text.contains("reason=\"WEEKLY_CLAIM_LIMIT_EXCEEDED\""));
        assert!(text.contains("status=\"verified\""));
    }
}
