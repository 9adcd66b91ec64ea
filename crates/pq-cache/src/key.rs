//! Deterministic cache-key derivation (§4.7, I6). A cache key is
//! `"pq:v1:" || hash(signature)`, where `signature` is a canonical JSON
//! document. `serde_json::Value`'s object variant is a `BTreeMap` in this
//! workspace (the `preserve_order` feature is never enabled), so any two
//! structurally-equal `Value`s serialize to byte-identical strings without
//! us having to sort anything by hand — that's what makes `compute_key`
//! deterministic.

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheKeyOptions {
    pub limit: Option<usize>,
    pub max_step_index: Option<usize>,
}

/// One `merge`/`append` dependency's own cache signature, threaded in
/// recursively (§4.7: "for each merge/append dependency: the recursive
/// signature under the same keying scheme").
#[derive(Debug, Clone)]
pub struct DependencySignature {
    pub query_id: String,
    /// `None` means that dependency is itself uncacheable, which makes the
    /// whole query uncacheable too (bottom-up `$cacheable` propagation).
    pub signature: Option<String>,
}

pub struct CacheKeyInput {
    /// The connector's `get_cache_key(request)` result plus a hash of the
    /// credential id, or `None` if the source has no stable identity at
    /// all (an unknown connection id, an anonymous credential, ...).
    pub source_signature: Option<serde_json::Value>,
    /// Operation IR only — step `id`/`name` are deliberately excluded so a
    /// step rename doesn't change the key.
    pub step_operations: Vec<serde_json::Value>,
    pub options: CacheKeyOptions,
    pub privacy_mode: String,
    pub dependencies: Vec<DependencySignature>,
}

/// Folds a connector's cache key and a credential id into the source half
/// of the signature. The credential id itself is hashed, never embedded
/// raw, since `pq-cache` has no business holding anything secret-adjacent
/// even though `credential_id` itself isn't the secret.
pub fn source_signature(connector_cache_key: serde_json::Value, credential_id: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "connector": connector_cache_key,
        "credential": credential_id.map(hash_str),
    })
}

fn hash_str(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes the `"pq:v1:" || hash(...)` cache key, or `None` if any part
/// of the query (its own source, or a dependency's) lacks a stable
/// identity — the spec's `$cacheable` flag.
pub fn compute_cache_key(input: &CacheKeyInput) -> Option<String> {
    let source_signature = input.source_signature.clone()?;
    let mut dep_signatures = Vec::with_capacity(input.dependencies.len());
    for dep in &input.dependencies {
        dep_signatures.push(serde_json::json!({
            "queryId": dep.query_id,
            "signature": dep.signature.as_ref()?,
        }));
    }

    let signature = serde_json::json!({
        "source": source_signature,
        "steps": input.step_operations,
        "options": input.options,
        "privacyMode": input.privacy_mode,
        "dependencies": dep_signatures,
    });
    let canonical = serde_json::to_string(&signature).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Some(format!("pq:v1:{}", hex::encode(hasher.finalize())))
}

/// Minimal hex encoder — avoids pulling in the `hex` crate for four lines
/// of code the rest of the workspace doesn't otherwise need.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(source: Option<serde_json::Value>) -> CacheKeyInput {
        CacheKeyInput {
            source_signature: source,
            step_operations: vec![serde_json::json!({"op": "selectColumns", "columns": ["a"]})],
            options: CacheKeyOptions { limit: None, max_step_index: None },
            privacy_mode: "none".to_string(),
            dependencies: vec![],
        }
    }

    #[test]
    fn equal_inputs_produce_equal_keys() {
        let a = compute_cache_key(&input(Some(serde_json::json!({"connector": "file", "path": "x.csv"}))));
        let b = compute_cache_key(&input(Some(serde_json::json!({"connector": "file", "path": "x.csv"}))));
        assert_eq!(a, b);
        assert!(a.unwrap().starts_with("pq:v1:"));
    }

    #[test]
    fn missing_source_signature_is_uncacheable() {
        assert_eq!(compute_cache_key(&input(None)), None);
    }

    #[test]
    fn an_uncacheable_dependency_propagates_up() {
        let mut i = input(Some(serde_json::json!({"connector": "file"})));
        i.dependencies.push(DependencySignature { query_id: "dep".to_string(), signature: None });
        assert_eq!(compute_cache_key(&i), None);
    }

    #[test]
    fn step_renames_do_not_change_the_key() {
        // step_operations only ever carries the `operation` IR — the
        // caller (pq-engine) is responsible for not including step id/name.
        let a = compute_cache_key(&input(Some(serde_json::json!({"connector": "file"}))));
        let b = compute_cache_key(&input(Some(serde_json::json!({"connector": "file"}))));
        assert_eq!(a, b);
    }
}
