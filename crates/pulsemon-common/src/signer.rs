//! Keyed integrity signatures over a metric's canonical representation.
//!
//! The signature is an HMAC-SHA256 digest, hex-encoded, over the string
//! `"{id}:{kind}:{value}"` where a counter prints its delta as an integer
//! and a gauge prints its reading with six fractional digits. Sign and
//! verify are reproducible for any `(id, kind, value, key)` tuple.

use crate::metric::{Metric, MetricKind};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignError {
    /// Signing requires a shared key; an empty key means signing is
    /// disabled end-to-end and callers must skip this module entirely.
    #[error("cannot sign metric with an empty key")]
    EmptyKey,

    /// The metric carries no value for its declared kind, so there is
    /// nothing to canonicalize.
    #[error("cannot sign metric '{id}' without a value")]
    MissingValue { id: String },
}

fn canonical(metric: &Metric) -> Result<String, SignError> {
    let missing = || SignError::MissingValue {
        id: metric.id.clone(),
    };
    match metric.kind {
        MetricKind::Counter => {
            let delta = metric.delta.ok_or_else(missing)?;
            Ok(format!("{}:counter:{}", metric.id, delta))
        }
        MetricKind::Gauge => {
            let reading = metric.reading.ok_or_else(missing)?;
            Ok(format!("{}:gauge:{:.6}", metric.id, reading))
        }
    }
}

fn digest(metric: &Metric, key: &str) -> Result<String, SignError> {
    if key.is_empty() {
        return Err(SignError::EmptyKey);
    }
    let data = canonical(metric)?;
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts keys of any length"));
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Computes the keyed digest and attaches it to the metric.
pub fn sign(metric: &mut Metric, key: &str) -> Result<(), SignError> {
    let signature = digest(metric, key)?;
    metric.signature = Some(signature);
    Ok(())
}

/// Recomputes the digest and compares it to the attached signature.
///
/// Returns `Ok(false)` when the metric is well-formed but the comparison
/// fails (including an absent signature); errors only when the metric
/// cannot be canonicalized.
pub fn verify(metric: &Metric, key: &str) -> Result<bool, SignError> {
    let expected = digest(metric, key)?;
    Ok(metric.signature.as_deref() == Some(expected.as_str()))
}
