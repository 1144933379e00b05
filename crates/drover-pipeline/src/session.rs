//! Sign-in-with-Ethereum session material.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Serialize;

const DOMAIN: &str = "app.heyelsa.ai";
const SIWE_CHAIN_ID: u64 = 8453;
const NONCE_LEN: usize = 17;

/// A signed login, attached to every authenticated request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub sign_in_message: String,
    pub signature: String,
}

/// A random alphanumeric SIWE nonce.
pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

/// The SIWE message for `address`, valid for one day from `issued_at`.
pub fn siwe_message(address: &str, nonce: &str, issued_at: DateTime<Utc>) -> String {
    let expires_at = issued_at + Duration::days(1);
    format!(
        "{DOMAIN} wants you to sign in with your Ethereum account:\n\
         {address}\n\
         \n\
         \n\
         URI: https://{DOMAIN}\n\
         Version: 1\n\
         Chain ID: {SIWE_CHAIN_ID}\n\
         Nonce: {nonce}\n\
         Issued At: {}\n\
         Expiration Time: {}",
        issued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        expires_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_nonce_shape() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), 17);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(nonce, generate_nonce());
    }

    #[test]
    fn test_siwe_message_layout() {
        let issued = DateTime::parse_from_rfc3339("2025-03-04T05:06:07.089Z")
            .unwrap()
            .with_timezone(&Utc);
        let message = siwe_message(
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
            "abcDEF1234567890x",
            issued,
        );
        let expected = "app.heyelsa.ai wants you to sign in with your Ethereum account:\n\
                        0x70997970C51812dc3A010C7d01b50e0d17dc79C8\n\n\n\
                        URI: https://app.heyelsa.ai\n\
                        Version: 1\n\
                        Chain ID: 8453\n\
                        Nonce: abcDEF1234567890x\n\
                        Issued At: 2025-03-04T05:06:07.089Z\n\
                        Expiration Time: 2025-03-05T05:06:07.089Z";
        assert_eq!(message, expected);
    }

    #[test]
    fn test_session_body_fields() {
        let session = Session {
            sign_in_message: "msg".into(),
            signature: "0xsig".into(),
        };
        assert_eq!(
            serde_json::to_value(&session).unwrap(),
            serde_json::json!({"sign_in_message": "msg", "signature": "0xsig"})
        );
    }
}
