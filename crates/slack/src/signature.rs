use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";

const SIGNATURE_PREFIX: &str = "v0=";
const DEFAULT_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("request is missing the `{0}` header")]
    MissingHeader(&'static str),
    #[error("request timestamp `{0}` is not a unix timestamp")]
    MalformedTimestamp(String),
    #[error("request timestamp is outside the accepted window")]
    StaleTimestamp,
    #[error("signature does not carry the `v0` version prefix")]
    UnsupportedVersion,
    #[error("signature does not match the request body")]
    Mismatch,
}

/// Recomputes Slack's documented `v0` request signature: HMAC-SHA256 over
/// `v0:{timestamp}:{body}` under the app's signing secret. Comparison is
/// constant time via `Mac::verify_slice`.
pub struct SignatureVerifier {
    signing_secret: String,
    tolerance_secs: i64,
}

impl SignatureVerifier {
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self { signing_secret: signing_secret.into(), tolerance_secs: DEFAULT_TIMESTAMP_TOLERANCE_SECS }
    }

    pub fn with_tolerance(signing_secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self { signing_secret: signing_secret.into(), tolerance_secs: tolerance_secs.max(0) }
    }

    pub fn verify(
        &self,
        timestamp: &str,
        signature: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let request_ts = timestamp
            .trim()
            .parse::<i64>()
            .map_err(|_| SignatureError::MalformedTimestamp(timestamp.to_string()))?;

        if (now.timestamp() - request_ts).abs() > self.tolerance_secs {
            return Err(SignatureError::StaleTimestamp);
        }

        let provided = signature
            .strip_prefix(SIGNATURE_PREFIX)
            .ok_or(SignatureError::UnsupportedVersion)?;
        let provided = decode_hex(provided).ok_or(SignatureError::Mismatch)?;

        self.mac(timestamp, body).verify_slice(&provided).map_err(|_| SignatureError::Mismatch)
    }

    /// Produces the `v0=...` header value for a body; the test-side twin of
    /// [`SignatureVerifier::verify`].
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> String {
        let digest = self.mac(timestamp, body).finalize().into_bytes();
        format!("{SIGNATURE_PREFIX}{}", encode_hex(digest.as_slice()))
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .expect("hmac accepts keys of any length");
        mac.update(b"v0:");
        mac.update(timestamp.trim().as_bytes());
        mac.update(b":");
        mac.update(body);
        mac
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 {
        return None;
    }

    let mut output = Vec::with_capacity(input.len() / 2);
    let bytes = input.as_bytes();
    for pair in bytes.chunks_exact(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        output.push(((hi << 4) | lo) as u8);
    }
    Some(output)
}
