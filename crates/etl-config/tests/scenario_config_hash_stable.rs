//! Scenario: layered config hashing is deterministic and order-insensitive.

use etl_config::load_layered_yaml;
use std::fs::File;
use std::io::Write as _;
use std::path::PathBuf;

struct TempYaml(PathBuf);

impl TempYaml {
    fn new(name: &str, contents: &str) -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("etl-config-scenario-{name}-{}.yaml", std::process::id()));
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        Self(path)
    }

    fn path(&self) -> &str {
        self.0.to_str().unwrap()
    }
}

impl Drop for TempYaml {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[test]
fn same_input_produces_identical_hash() {
    let a = TempYaml::new("a", "scheduler:\n  poll_seconds: 5\n  worker_count: 3\n");
    let loaded_1 = load_layered_yaml(&[a.path()]).unwrap();
    let loaded_2 = load_layered_yaml(&[a.path()]).unwrap();
    assert_eq!(loaded_1.config_hash, loaded_2.config_hash);
    assert_eq!(loaded_1.canonical_json, loaded_2.canonical_json);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let original = TempYaml::new(
        "orig",
        "scheduler:\n  poll_seconds: 5\n  worker_count: 3\n",
    );
    let reordered = TempYaml::new(
        "reord",
        "scheduler:\n  worker_count: 3\n  poll_seconds: 5\n",
    );
    let loaded_1 = load_layered_yaml(&[original.path()]).unwrap();
    let loaded_2 = load_layered_yaml(&[reordered.path()]).unwrap();
    assert_eq!(loaded_1.config_hash, loaded_2.config_hash);
}

#[test]
fn later_layer_overrides_earlier() {
    let base = TempYaml::new("base", "scheduler:\n  poll_seconds: 5\nlock:\n  stale_hours: 2\n");
    let overlay = TempYaml::new("overlay", "scheduler:\n  poll_seconds: 15\n");
    let loaded = load_layered_yaml(&[base.path(), overlay.path()]).unwrap();
    assert_eq!(loaded.u64_at("/scheduler/poll_seconds", 0), 15);
    assert_eq!(loaded.u64_at("/lock/stale_hours", 0), 2);
}

#[test]
fn hash_is_64_hex_chars() {
    let a = TempYaml::new("hexlen", "scheduler:\n  poll_seconds: 5\n");
    let loaded = load_layered_yaml(&[a.path()]).unwrap();
    assert_eq!(loaded.config_hash.len(), 64);
    assert!(loaded.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn different_values_produce_different_hash() {
    let a = TempYaml::new("diff_a", "scheduler:\n  poll_seconds: 5\n");
    let b = TempYaml::new("diff_b", "scheduler:\n  poll_seconds: 6\n");
    let loaded_a = load_layered_yaml(&[a.path()]).unwrap();
    let loaded_b = load_layered_yaml(&[b.path()]).unwrap();
    assert_ne!(loaded_a.config_hash, loaded_b.config_hash);
}
