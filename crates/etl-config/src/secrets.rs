//! Runtime secret resolution.
//!
//! This module is the single source of truth for turning env var *names*
//! (as stored in the boot config YAML) into values.
//!
//! # Contract
//! - Config YAML stores only env var NAMES (e.g. `"ETL_ENCRYPTION_KEY"`).
//! - At startup, callers invoke [`resolve_secrets`] once.
//! - The returned `ResolvedSecrets` is passed into constructors; never
//!   scatter `std::env::var` calls across the codebase.
//! - `Debug` redacts every field.
//! - Error messages reference the env var NAME, never the value.

use anyhow::{bail, Result};
use base64::Engine;
use serde_json::Value;

/// All runtime-resolved secrets for one process instantiation. Built once
/// at startup via [`resolve_secrets`]; pass to constructors.
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// 32-byte AES-256 key material for `etl-crypto`'s
    /// `EncryptedFieldCodec`, base64-decoded from the named env var.
    pub encryption_key: Vec<u8>,
    /// Control-plane database connection string.
    pub control_db_url: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("encryption_key", &"<REDACTED>")
            .field("control_db_url", &"<REDACTED>")
            .finish()
    }
}

struct SecretEnvNames {
    encryption_key_var: String,
    control_db_url_var: String,
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Returns `None` if the variable is unset or its value is blank. Never
/// returns the value in an error path — callers report the NAME only.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        encryption_key_var: read_str_at(config_json, "/encryption/key_env")
            .unwrap_or_else(|| "ETL_ENCRYPTION_KEY".to_string()),
        control_db_url_var: read_str_at(config_json, "/database/url_env")
            .unwrap_or_else(|| "ETL_CONTROL_DB_URL".to_string()),
    }
}

/// Resolve all secrets from the environment.
///
/// Both the encryption key and the control-plane database URL are required
/// — there is no deployment mode where the control-plane database or the
/// field codec's key can be absent.
///
/// # Errors
/// Returns `Err` naming the missing or malformed env var. The value is
/// never mentioned.
pub fn resolve_secrets(config_json: &Value) -> Result<ResolvedSecrets> {
    let names = parse_env_names(config_json);

    let key_b64 = resolve_env(&names.encryption_key_var).ok_or_else(|| {
        anyhow::anyhow!(
            "SECRETS_MISSING: required env var '{}' (encryption key, base64) is not set or empty",
            names.encryption_key_var
        )
    })?;

    let encryption_key = base64::engine::general_purpose::STANDARD
        .decode(key_b64.trim())
        .map_err(|_| {
            anyhow::anyhow!(
                "SECRETS_INVALID: env var '{}' is not valid base64",
                names.encryption_key_var
            )
        })?;

    if encryption_key.len() != 32 {
        bail!(
            "SECRETS_INVALID: env var '{}' must decode to exactly 32 bytes, got {}",
            names.encryption_key_var,
            encryption_key.len()
        );
    }

    let control_db_url = resolve_env(&names.control_db_url_var).ok_or_else(|| {
        anyhow::anyhow!(
            "SECRETS_MISSING: required env var '{}' (control-plane database URL) is not set or empty",
            names.control_db_url_var
        )
    })?;

    Ok(ResolvedSecrets {
        encryption_key,
        control_db_url,
    })
}
