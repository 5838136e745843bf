//! Scenario: secret resolution fails closed and never echoes values.
//!
//! Uses globally-unique sentinel env var names that are never set in CI, so
//! these tests don't need `std::env::set_var` and don't race on shared
//! process env state.

use base64::Engine;
use etl_config::resolve_secrets;
use serde_json::json;

#[test]
fn missing_encryption_key_fails_closed() {
    let cfg = json!({
        "encryption": { "key_env": "ETL_CFG_TEST_SENTINEL_KEY_A1" },
        "database": { "url_env": "ETL_CFG_TEST_SENTINEL_DB_A1" },
    });
    let result = resolve_secrets(&cfg);
    assert!(result.is_err());
    let msg = result.unwrap_err().to_string();
    assert!(msg.contains("SECRETS_MISSING"));
    assert!(msg.contains("ETL_CFG_TEST_SENTINEL_KEY_A1"));
}

#[test]
fn non_32_byte_key_is_rejected() {
    std::env::set_var("ETL_CFG_TEST_SENTINEL_KEY_B2", "dG9vc2hvcnQ=");
    std::env::set_var("ETL_CFG_TEST_SENTINEL_DB_B2", "postgres://localhost/ignored");

    let cfg = json!({
        "encryption": { "key_env": "ETL_CFG_TEST_SENTINEL_KEY_B2" },
        "database": { "url_env": "ETL_CFG_TEST_SENTINEL_DB_B2" },
    });
    let result = resolve_secrets(&cfg);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("SECRETS_INVALID"));

    std::env::remove_var("ETL_CFG_TEST_SENTINEL_KEY_B2");
    std::env::remove_var("ETL_CFG_TEST_SENTINEL_DB_B2");
}

#[test]
fn well_formed_key_resolves_and_debug_is_redacted() {
    let key = base64::engine::general_purpose::STANDARD.encode([9u8; 32]);
    std::env::set_var("ETL_CFG_TEST_SENTINEL_KEY_C3", &key);
    std::env::set_var("ETL_CFG_TEST_SENTINEL_DB_C3", "postgres://localhost/etl_test");

    let cfg = json!({
        "encryption": { "key_env": "ETL_CFG_TEST_SENTINEL_KEY_C3" },
        "database": { "url_env": "ETL_CFG_TEST_SENTINEL_DB_C3" },
    });
    let secrets = resolve_secrets(&cfg).expect("well-formed key must resolve");
    assert_eq!(secrets.encryption_key.len(), 32);

    let debug_str = format!("{:?}", secrets);
    assert!(debug_str.contains("REDACTED"));
    assert!(!debug_str.contains("etl_test"));

    std::env::remove_var("ETL_CFG_TEST_SENTINEL_KEY_C3");
    std::env::remove_var("ETL_CFG_TEST_SENTINEL_DB_C3");
}
