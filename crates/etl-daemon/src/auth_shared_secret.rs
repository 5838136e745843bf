//! A minimal HMAC-SHA256 bearer-token `JwtValidator` (§6).
//!
//! Token issuance lives entirely outside this exercise's scope — an operator
//! mints compact `header.payload.signature` tokens with whatever issuer they
//! run, and this validator only needs to check the signature and read the
//! claims. It mirrors `etl-crypto::EncryptedFieldCodec` in shape: one secret
//! key resolved once at boot, constant-time verification, no silent fallback
//! on a bad signature.

use base64::Engine;
use etl_types::{Identity, JwtValidator};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashSet;

type HmacSha256 = Hmac<Sha256>;

const ENV_JWT_SECRET: &str = "ETL_JWT_SHARED_SECRET";

pub struct SharedSecretValidator {
    secret: Vec<u8>,
}

impl SharedSecretValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Reads the shared secret from `ETL_JWT_SHARED_SECRET`. Falls back to an
    /// empty secret (rejecting every token) if unset, rather than failing
    /// daemon boot over a missing identity-provider integration the exercise
    /// doesn't otherwise specify.
    pub fn from_env() -> Self {
        let secret = std::env::var(ENV_JWT_SECRET).unwrap_or_default();
        Self::new(secret.into_bytes())
    }
}

impl JwtValidator for SharedSecretValidator {
    fn validate(&self, bearer_token: &str) -> Result<Identity, String> {
        if self.secret.is_empty() {
            return Err("no JWT signing secret configured".to_string());
        }

        let mut parts = bearer_token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err("malformed token: expected header.payload.signature".to_string());
        };

        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|e| e.to_string())?;
        mac.update(format!("{header_b64}.{payload_b64}").as_bytes());
        let signature = b64_decode(sig_b64)?;
        mac.verify_slice(&signature).map_err(|_| "signature verification failed".to_string())?;

        let payload_bytes = b64_decode(payload_b64)?;
        let claims: serde_json::Value =
            serde_json::from_slice(&payload_bytes).map_err(|e| format!("malformed claims: {e}"))?;

        let username = claims
            .get("sub")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "claims missing 'sub'".to_string())?
            .to_string();

        let roles: HashSet<String> = claims
            .get("roles")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|r| r.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        Ok(Identity::new(username, roles))
    }
}

fn b64_decode(segment: &str) -> Result<Vec<u8>, String> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| format!("malformed base64url segment: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &[u8], header: &str, payload: &str) -> String {
        let header_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(header);
        let payload_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload);
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(format!("{header_b64}.{payload_b64}").as_bytes());
        let sig = mac.finalize().into_bytes();
        let sig_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(sig);
        format!("{header_b64}.{payload_b64}.{sig_b64}")
    }

    #[test]
    fn accepts_a_correctly_signed_token_and_reads_roles() {
        let validator = SharedSecretValidator::new(b"topsecret".to_vec());
        let token = sign(b"topsecret", r#"{"alg":"HS256"}"#, r#"{"sub":"alice","roles":["ADMIN"]}"#);
        let identity = validator.validate(&token).unwrap();
        assert_eq!(identity.username, "alice");
        assert!(identity.is_admin());
    }

    #[test]
    fn rejects_a_token_signed_with_a_different_secret() {
        let validator = SharedSecretValidator::new(b"topsecret".to_vec());
        let token = sign(b"wrong-secret", r#"{"alg":"HS256"}"#, r#"{"sub":"alice","roles":[]}"#);
        assert!(validator.validate(&token).is_err());
    }

    #[test]
    fn rejects_a_malformed_token() {
        let validator = SharedSecretValidator::new(b"topsecret".to_vec());
        assert!(validator.validate("not-a-jwt").is_err());
    }

    #[test]
    fn empty_secret_rejects_everything() {
        let validator = SharedSecretValidator::from_env();
        assert!(validator.validate("anything").is_err());
    }
}
