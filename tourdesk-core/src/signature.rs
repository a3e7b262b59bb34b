use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature timestamp outside tolerance")]
    TimestampOutsideTolerance,
    #[error("signature mismatch")]
    Mismatch,
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

/// Verifies provider webhook signatures of the form `t=<unix>,v1=<hex>`, where
/// the HMAC-SHA256 covers `"<t>.<raw body>"`.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
    tolerance_seconds: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<Vec<u8>>, tolerance_seconds: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_seconds: i64::try_from(tolerance_seconds).unwrap_or(i64::MAX),
        }
    }

    pub fn verify(
        &self,
        raw_body: &[u8],
        signature_header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        if signature_header.trim().is_empty() {
            return Err(SignatureError::MissingHeader);
        }

        let mut timestamp: Option<&str> = None;
        let mut candidates: Vec<Vec<u8>> = Vec::new();
        for part in signature_header.split(',') {
            let (key, value) = part.trim().split_once('=').ok_or(SignatureError::MalformedHeader)?;
            match key {
                "t" => timestamp = Some(value),
                // Unparseable candidates are skipped; another v1 may still match.
                "v1" => {
                    if let Ok(bytes) = hex::decode(value) {
                        candidates.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
        let issued_at: i64 = timestamp.parse().map_err(|_| SignatureError::MalformedHeader)?;
        if candidates.is_empty() {
            return Err(SignatureError::Mismatch);
        }
        if (now.timestamp() - issued_at).abs() > self.tolerance_seconds {
            return Err(SignatureError::TimestampOutsideTolerance);
        }

        for candidate in &candidates {
            let mac = self.mac(timestamp, raw_body)?;
            // verify_slice compares in constant time
            if mac.verify_slice(candidate).is_ok() {
                return Ok(());
            }
        }

        Err(SignatureError::Mismatch)
    }

    /// Header value a provider would send for `raw_body` at `timestamp`.
    pub fn sign(&self, raw_body: &[u8], timestamp: i64) -> String {
        let digest = match self.mac(&timestamp.to_string(), raw_body) {
            Ok(mac) => hex::encode(mac.finalize().into_bytes()),
            Err(_) => String::new(),
        };
        format!("t={},v1={}", timestamp, digest)
    }

    fn mac(&self, timestamp: &str, raw_body: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| SignatureError::Mismatch)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(raw_body);
        Ok(mac)
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"********")
            .field("tolerance_seconds", &self.tolerance_seconds)
            .finish()
    }
}
