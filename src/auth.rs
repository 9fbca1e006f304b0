use base64::engine::{Engine, general_purpose::STANDARD_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Issues and checks `<user_id>:<expires>:<signature>` bearer tokens.
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn sign(&self, payload: &str) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(payload.as_bytes());
        Some(STANDARD_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    pub fn issue_token(&self, user_id: &str, ttl: Duration) -> Option<String> {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp().saturating_add(ttl);
        let payload = format!("{}:{}", user_id, expires);
        match self.sign(&payload) {
            Some(signature) => Some(format!("{}:{}", payload, signature)),
            None => {
                warn!(user_id, "failed to sign token payload");
                None
            }
        }
    }

    /// The user id carried by a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Option<String> {
        let mut segments = token.trim().rsplitn(3, ':');
        let signature = segments.next()?;
        let expires: i64 = segments.next()?.parse().ok()?;
        let user_id = segments.next()?;
        if user_id.is_empty() || expires <= Utc::now().timestamp() {
            return None;
        }
        let expected = self.sign(&format!("{}:{}", user_id, expires))?;
        if expected != signature {
            return None;
        }
        Some(user_id.to_string())
    }
}
