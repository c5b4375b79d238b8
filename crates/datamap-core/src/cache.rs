//! Identity and query-result caches
//!
//! Both caches hand out `Arc<T>`: callers share the cached instance and
//! cannot mutate it in place, so a cached result only changes through the
//! mapper's own invalidation.
//!
//! Neither cache synchronizes internally; the owning mapper takes `&mut self`
//! for every operation that touches them.

use crate::criteria::{Criteria, FindOptions};
use crate::errors::Result;
use crate::value::Value;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// First-primary-key-column value → most recently hydrated or saved object
#[derive(Debug)]
pub struct IdentityCache<T> {
    entries: HashMap<String, Arc<T>>,
}

impl<T> Default for IdentityCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> IdentityCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Value) -> Option<Arc<T>> {
        key.cache_key()
            .and_then(|k| self.entries.get(&k))
            .cloned()
    }

    /// Store `object` under `key`; Null keys are not cacheable and are skipped
    pub fn insert(&mut self, key: &Value, object: Arc<T>) {
        if let Some(k) = key.cache_key() {
            self.entries.insert(k, object);
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Arc<T>> {
        key.cache_key().and_then(|k| self.entries.remove(&k))
    }

    pub fn contains(&self, key: &Value) -> bool {
        key.cache_key()
            .is_some_and(|k| self.entries.contains_key(&k))
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(entries = self.entries.len(), "clearing identity cache");
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
struct CachedQuery<T> {
    keys: Vec<String>,
    objects: Vec<Arc<T>>,
}

/// Call signature → ordered result of a `find_by_field`
#[derive(Debug)]
pub struct ResultCache<T> {
    entries: HashMap<String, CachedQuery<T>>,
}

impl<T> Default for ResultCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> ResultCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached objects for `signature`, same instances as first returned
    pub fn get(&self, signature: &str) -> Option<Vec<Arc<T>>> {
        self.entries.get(signature).map(|q| q.objects.clone())
    }

    /// Store a result set. `keys` are the primary-key values of `objects`,
    /// used to evict the entry when one of those rows is deleted.
    pub fn insert(&mut self, signature: String, keys: &[Value], objects: Vec<Arc<T>>) {
        let keys = keys.iter().filter_map(Value::cache_key).collect();
        self.entries
            .insert(signature, CachedQuery { keys, objects });
    }

    /// Drop every cached result that contains the row identified by `key`
    pub fn evict_key(&mut self, key: &Value) -> usize {
        let Some(k) = key.cache_key() else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|_, q| !q.keys.contains(&k));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(entries = self.entries.len(), "clearing query-result cache");
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Serialize)]
struct SignatureInput<'a> {
    criteria: &'a Criteria,
    options: &'a FindOptions,
}

/// Deterministic signature of a `find_by_field` call.
///
/// SHA256 over the canonical JSON of the full argument set; entry order
/// matters, so reordered criteria get a different signature.
pub fn signature(criteria: &Criteria, options: &FindOptions) -> Result<String> {
    let canonical = serde_json::to_string(&SignatureInput { criteria, options })?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_cache_unifies_key_types() {
        let mut cache = IdentityCache::new();
        cache.insert(&Value::Int(5), Arc::new("five"));
        assert_eq!(cache.get(&Value::from("5")).as_deref(), Some(&"five"));
        assert!(cache.contains(&Value::Int(5)));
    }

    #[test]
    fn test_identity_cache_skips_null_key() {
        let mut cache = IdentityCache::new();
        cache.insert(&Value::Null, Arc::new(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_identity_cache_remove() {
        let mut cache = IdentityCache::new();
        cache.insert(&Value::Int(1), Arc::new('a'));
        cache.insert(&Value::Int(2), Arc::new('b'));
        assert!(cache.remove(&Value::Int(1)).is_some());
        assert!(cache.remove(&Value::Int(99)).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_result_cache_returns_same_instances() {
        let mut cache = ResultCache::new();
        let obj = Arc::new(String::from("row"));
        cache.insert("sig".to_string(), &[Value::Int(1)], vec![obj.clone()]);
        let hit = cache.get("sig").unwrap();
        assert!(Arc::ptr_eq(&hit[0], &obj));
    }

    #[test]
    fn test_result_cache_evicts_only_matching_entries() {
        let mut cache = ResultCache::new();
        cache.insert("a".to_string(), &[Value::Int(1), Value::Int(2)], vec![Arc::new(1), Arc::new(2)]);
        cache.insert("b".to_string(), &[Value::Int(3)], vec![Arc::new(3)]);

        assert_eq!(cache.evict_key(&Value::Int(2)), 1);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert_eq!(cache.evict_key(&Value::Int(42)), 0);
    }

    #[test]
    fn test_signature_is_deterministic_and_order_sensitive() {
        let options = FindOptions::new().limit(10);
        let a = Criteria::new().field("x", 1).field("y", 2);
        let b = Criteria::new().field("y", 2).field("x", 1);

        let sig_a1 = signature(&a, &options).unwrap();
        let sig_a2 = signature(&a, &options).unwrap();
        let sig_b = signature(&b, &options).unwrap();

        assert_eq!(sig_a1, sig_a2);
        assert_eq!(sig_a1.len(), 64);
        assert_ne!(sig_a1, sig_b);
    }

    #[test]
    fn test_signature_covers_options() {
        let criteria = Criteria::new().field("x", 1);
        let plain = signature(&criteria, &FindOptions::new()).unwrap();
        let paged = signature(&criteria, &FindOptions::new().offset(5)).unwrap();
        assert_ne!(plain, paged);
    }
}
