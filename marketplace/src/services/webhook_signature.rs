// marketplace/src/services/webhook_signature.rs

//! `t=<unix>,v1=<hex>` webhook signatures: HMAC-SHA256 over `"<t>." + body`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
  #[error("signature header missing")]
  MissingHeader,

  #[error("signature header malformed")]
  Malformed,

  #[error("timestamp outside tolerance")]
  TimestampOutOfTolerance,

  #[error("no signature matched")]
  Mismatch,

  #[error("webhook secret unusable")]
  InvalidSecret,
}

fn keyed_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
  let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
  mac.update(timestamp.to_string().as_bytes());
  mac.update(b".");
  mac.update(payload);
  Ok(mac)
}

/// Checks `header` against `payload`. Returns the signed timestamp.
///
/// Any `v1` entry may match, so secrets can be rotated. Comparison is
/// constant time.
pub fn verify(
  header: Option<&str>,
  payload: &[u8],
  secret: &str,
  tolerance: Duration,
  now_unix: i64,
) -> Result<i64, SignatureError> {
  let header = header.ok_or(SignatureError::MissingHeader)?;

  let mut timestamp = None;
  let mut candidates = Vec::new();
  for part in header.split(',') {
    match part.trim().split_once('=') {
      Some(("t", value)) => timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::Malformed)?),
      Some(("v1", value)) => candidates.push(value),
      _ => {}
    }
  }
  let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
  if candidates.is_empty() {
    return Err(SignatureError::Malformed);
  }

  if now_unix.abs_diff(timestamp) > tolerance.as_secs() {
    return Err(SignatureError::TimestampOutOfTolerance);
  }

  let mac = keyed_mac(secret, timestamp, payload)?;
  let matched = candidates.into_iter().any(|candidate| match hex::decode(candidate) {
    Ok(bytes) => mac.clone().verify_slice(&bytes).is_ok(),
    Err(_) => false,
  });

  if matched {
    Ok(timestamp)
  } else {
    Err(SignatureError::Mismatch)
  }
}

/// Header value for `payload`, as the gateway would send it.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, SignatureError> {
  let mac = keyed_mac(secret, timestamp, payload)?;
  Ok(format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes())))
}
