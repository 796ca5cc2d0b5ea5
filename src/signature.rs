use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Revolut-Signature";
pub const TIMESTAMP_HEADER: &str = "Revolut-Request-Timestamp";

const VERSION_PREFIX: &str = "v1=";
const DIGEST_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMode {
    Strict,
    /// Accept unsigned deliveries when no secret is configured. Local development only.
    Permissive,
}

impl SignatureMode {
    pub fn from_env_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("permissive") {
            SignatureMode::Permissive
        } else {
            SignatureMode::Strict
        }
    }
}

fn signed_message(timestamp: &str, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(4 + timestamp.len() + payload.len());
    message.extend_from_slice(b"v1.");
    message.extend_from_slice(timestamp.as_bytes());
    message.push(b'.');
    message.extend_from_slice(payload);
    message
}

fn mac_for(secret: &str) -> Option<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes()).ok()
}

/// Produces the `v1=<hex>` header value the gateway would send.
pub fn sign_payload(secret: &str, payload: &[u8], timestamp: &str) -> String {
    let Some(mut mac) = mac_for(secret) else {
        return String::new();
    };
    mac.update(&signed_message(timestamp, payload));
    format!("{VERSION_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// HMAC-SHA256 over `v1.{timestamp}.{payload}`. The header may carry several
/// comma-separated `v1=` signatures during secret rotation; any match passes.
pub fn verify_signature(secret: &str, payload: &[u8], signature_header: &str, timestamp: &str) -> bool {
    if secret.is_empty() || timestamp.is_empty() {
        return false;
    }
    if !signature_header.trim_start().starts_with(VERSION_PREFIX) {
        return false;
    }

    let message = signed_message(timestamp, payload);
    signature_header
        .split(',')
        .filter_map(|part| part.trim().strip_prefix(VERSION_PREFIX))
        .filter_map(|hex_sig| hex::decode(hex_sig).ok())
        .filter(|bytes| bytes.len() == DIGEST_LEN)
        .any(|candidate| {
            let Some(mut mac) = mac_for(secret) else {
                return false;
            };
            mac.update(&message);
            mac.verify_slice(&candidate).is_ok()
        })
}

#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    mode: SignatureMode,
    tolerance_secs: Option<i64>,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>, mode: SignatureMode, tolerance_secs: Option<i64>) -> Self {
        let secret = secret.filter(|s| !s.is_empty());
        if secret.is_none() {
            match mode {
                SignatureMode::Permissive => tracing::warn!(
                    "WEBHOOK_SECRET is not set and signature mode is PERMISSIVE: webhooks will be accepted WITHOUT authentication"
                ),
                SignatureMode::Strict => tracing::warn!(
                    "WEBHOOK_SECRET is not set: every webhook delivery will be rejected"
                ),
            }
        }

        Self {
            secret,
            mode,
            tolerance_secs,
        }
    }

    pub fn verify(&self, payload: &[u8], signature_header: &str, timestamp: &str) -> bool {
        let Some(secret) = self.secret.as_deref() else {
            if self.mode == SignatureMode::Permissive {
                tracing::warn!("accepting unsigned webhook in permissive mode");
                return true;
            }
            return false;
        };

        if !self.timestamp_is_fresh(timestamp, chrono::Utc::now().timestamp_millis()) {
            tracing::warn!(timestamp, "webhook timestamp outside tolerance");
            return false;
        }

        verify_signature(secret, payload, signature_header, timestamp)
    }

    fn timestamp_is_fresh(&self, timestamp: &str, now_ms: i64) -> bool {
        let Some(tolerance) = self.tolerance_secs else {
            return true;
        };
        match timestamp.trim().parse::<i64>() {
            Ok(sent_ms) => (now_ms - sent_ms).abs() <= tolerance * 1000,
            Err(_) => false,
        }
    }
}
