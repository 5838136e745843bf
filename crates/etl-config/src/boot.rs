use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

/// Load + merge YAML files in order, then canonicalize to JSON and hash.
/// Later files override earlier files via deep-merge. Used once at process
/// start to build the boot configuration (pool sizes, lock thresholds,
/// replica identity overrides, encryption key env var name, ...).
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(&s).with_context(|| format!("parse yaml: {p}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

impl LoadedConfig {
    /// Read a scalar at a JSON pointer, falling back to `default` on miss
    /// or type mismatch.
    pub fn str_at<'a>(&'a self, pointer: &str, default: &'a str) -> &'a str {
        self.config_json
            .pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or(default)
    }

    pub fn u64_at(&self, pointer: &str, default: u64) -> u64 {
        self.config_json
            .pointer(pointer)
            .and_then(Value::as_u64)
            .unwrap_or(default)
    }
}

fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> tempfile_path::TempYaml {
        tempfile_path::TempYaml::new(contents)
    }

    // Minimal inline tempfile helper so this crate doesn't need a dev-dependency
    // just for one test module.
    mod tempfile_path {
        use std::fs::File;
        use std::io::Write as _;
        use std::path::PathBuf;

        pub struct TempYaml {
            pub path: PathBuf,
        }

        impl TempYaml {
            pub fn new(contents: &str) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!("etl-config-test-{}.yaml", std::process::id()));
                let mut f = File::create(&path).unwrap();
                f.write_all(contents.as_bytes()).unwrap();
                Self { path }
            }
        }

        impl Drop for TempYaml {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    #[test]
    fn hash_is_stable_across_key_order() {
        let a = write_temp("scheduler:\n  poll_seconds: 5\n  worker_count: 3\n");
        let b = write_temp("scheduler:\n  worker_count: 3\n  poll_seconds: 5\n");
        let loaded_a = load_layered_yaml(&[a.path.to_str().unwrap()]).unwrap();
        let loaded_b = load_layered_yaml(&[b.path.to_str().unwrap()]).unwrap();
        assert_eq!(loaded_a.config_hash, loaded_b.config_hash);
    }

    #[test]
    fn later_layer_overrides_earlier() {
        let base = write_temp("scheduler:\n  poll_seconds: 5\n");
        let override_file = write_temp("scheduler:\n  poll_seconds: 15\n");
        let loaded = load_layered_yaml(&[
            base.path.to_str().unwrap(),
            override_file.path.to_str().unwrap(),
        ])
        .unwrap();
        assert_eq!(loaded.u64_at("/scheduler/poll_seconds", 0), 15);
    }
}
