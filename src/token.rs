//!
//! Rotating shared-secret tokens
//! -----------------------------
//! A token is the lowercase hex SHA-256 digest of the current UTC time,
//! truncated to the minute and formatted as `YYYY.MM.DD.HH.mm`, concatenated
//! with the shared secret. Possession of the secret is proven without ever
//! transmitting it; a token is only useful inside the acceptance window.
//!
//! Validation accepts a candidate that matches any minute in the closed range
//! `[now - tolerance, now + tolerance]`, covering clock drift and short
//! network delay. With the default tolerance of 5 minutes that is an
//! 11-minute window. The scheme is stateless: no nonce store, no sessions,
//! bounded replay inside the window is accepted.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

/// Acceptance window half-width used by the reference deployment.
pub const DEFAULT_TOLERANCE_MINUTES: i64 = 5;

const TIME_FORMAT: &str = "%Y.%m.%d.%H.%M";

/// Derive the token for `time` (UTC, truncated to the minute).
pub fn generate(secret: &str, time: DateTime<Utc>) -> String {
    let stamped = format!("{}{}", time.format(TIME_FORMAT), secret);
    let digest = Sha256::digest(stamped.as_bytes());
    hex::encode(digest)
}

/// Check `candidate` against every minute in the closed window
/// `[now - tolerance_minutes, now + tolerance_minutes]`.
///
/// Each comparison is constant-time so a near-miss cannot be distinguished
/// from a far-miss by response latency.
pub fn validate(
    candidate: &str,
    secret: &str,
    now: DateTime<Utc>,
    tolerance_minutes: i64,
) -> bool {
    let mut ok = false;
    for offset in -tolerance_minutes..=tolerance_minutes {
        let expected = generate(secret, now + Duration::minutes(offset));
        // No early exit: every window slot is checked regardless of outcome.
        ok |= constant_time_eq(candidate.as_bytes(), expected.as_bytes());
    }
    ok
}

/// Byte-wise constant-time equality over equal-length inputs.
///
/// Token digests have a fixed public length, so rejecting on a length
/// mismatch leaks nothing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}
