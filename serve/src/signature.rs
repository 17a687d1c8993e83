//! Webhook signature validation: lowercase-hex HMAC-SHA256 over the raw body,
//! compared in constant time. Two secrets may be live at once so a secret
//! rotation never drops deliveries.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// One previous secret kept valid until its grace deadline (24h by default).
#[derive(Clone)]
pub struct PreviousSecret {
    pub secret: String,
    pub valid_until: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Default)]
pub struct SignatureValidator {
    secret: String,
    previous: Option<PreviousSecret>,
}

impl SignatureValidator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            previous: None,
        }
    }

    /// Accepts the outgoing secret during a rotation window.
    pub fn with_previous(mut self, secret: impl Into<String>, grace: chrono::Duration) -> Self {
        self.previous = Some(PreviousSecret {
            secret: secret.into(),
            valid_until: chrono::Utc::now() + grace,
        });
        self
    }

    /// Dev mode: an empty primary secret skips validation entirely.
    pub fn dev_mode(&self) -> bool {
        self.secret.is_empty()
    }

    /// Constant-time check of `header` against HMAC of `body` under the
    /// current secret, falling back to the previous secret inside its grace
    /// window.
    pub fn verify(&self, body: &[u8], header: &str) -> bool {
        if self.verify_with(&self.secret, body, header) {
            return true;
        }
        if let Some(prev) = &self.previous {
            if chrono::Utc::now() <= prev.valid_until
                && self.verify_with(&prev.secret, body, header)
            {
                return true;
            }
        }
        false
    }

    fn verify_with(&self, secret: &str, body: &[u8], header: &str) -> bool {
        if secret.is_empty() {
            return false;
        }
        let expected = sign(secret, body);
        // Compare the hex strings, not the raw MACs: the header is
        // attacker-supplied text and must not shortcut on length or prefix.
        expected.as_bytes().ct_eq(header.as_bytes()).into()
    }
}

/// Lowercase-hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_signature_verifies() {
        let v = SignatureValidator::new("secret");
        let body = br#"{"event":"documents.update"}"#;
        assert!(v.verify(body, &sign("secret", body)));
    }

    #[test]
    fn tampered_body_rejected() {
        let v = SignatureValidator::new("secret");
        let sig = sign("secret", b"original");
        assert!(!v.verify(b"tampered", &sig));
    }

    #[test]
    fn wrong_secret_rejected() {
        let v = SignatureValidator::new("secret");
        let body = b"payload";
        assert!(!v.verify(body, &sign("other", body)));
    }

    #[test]
    fn uppercase_hex_rejected() {
        let v = SignatureValidator::new("secret");
        let body = b"payload";
        let upper = sign("secret", body).to_uppercase();
        assert!(!v.verify(body, &upper));
    }

    #[test]
    fn previous_secret_accepted_within_grace() {
        let v = SignatureValidator::new("new-secret")
            .with_previous("old-secret", chrono::Duration::hours(24));
        let body = b"payload";
        assert!(v.verify(body, &sign("old-secret", body)));
        assert!(v.verify(body, &sign("new-secret", body)));
    }

    #[test]
    fn previous_secret_rejected_after_grace() {
        let v = SignatureValidator::new("new-secret")
            .with_previous("old-secret", chrono::Duration::hours(-1));
        let body = b"payload";
        assert!(!v.verify(body, &sign("old-secret", body)));
    }

    #[test]
    fn empty_secret_is_dev_mode() {
        let v = SignatureValidator::new("");
        assert!(v.dev_mode());
        assert!(!v.verify(b"x", "anything"));
    }
}
