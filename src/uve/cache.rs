//! UVE Cache.
//!
//! Holds `partition -> uve_key -> producer -> attr -> contribution` in
//! memory. Partition-scoped storage lets the streamer clear exactly one
//! partition's contributions on an owner change while every other partition
//! keeps serving reads.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::partition_map::PartitionId;

pub const SCAN_CHUNK: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProducerKey {
    pub source: String,
    pub node_type: String,
    pub module: String,
    pub instance: String,
}

impl std::fmt::Display for ProducerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}:{}", self.source, self.node_type, self.module, self.instance)
    }
}

#[derive(Debug, Clone)]
pub struct Contribution {
    pub value: Value,
    pub producer: ProducerKey,
}

/// Identifies one UVE: a table-scoped key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UveIdent {
    pub table: String,
    pub key: String,
}

type AttrMap = DashMap<String, DashMap<ProducerKey, Contribution>>;
type PartitionStore = DashMap<UveIdent, AttrMap>;

#[derive(Debug, Default, Clone)]
pub struct UveFilters {
    pub sfilt: Option<String>,
    pub mfilt: Option<String>,
    /// struct -> {field names} projection.
    pub cfilt: Option<HashMap<String, HashSet<String>>>,
    pub kfilt: Option<Vec<String>>,
    pub ackfilt: Option<bool>,
}

pub struct UveCache {
    partitions: DashMap<PartitionId, Arc<PartitionStore>>,
}

impl Default for UveCache {
    fn default() -> Self {
        Self::new()
    }
}

impl UveCache {
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
        }
    }

    fn store_for(&self, partition: PartitionId) -> Arc<PartitionStore> {
        self.partitions
            .entry(partition)
            .or_insert_with(|| Arc::new(DashMap::new()))
            .clone()
    }

    /// Deterministic FNV-1a hash of a UVE key into `[0, total_partitions)`:
    /// every UVE key must hash to exactly one partition, stably across
    /// restarts and processes. Kept dependency-free for that stability.
    pub fn partition_for_key(key: &str, total_partitions: u32) -> PartitionId {
        const FNV_OFFSET: u64 = 0xcbf29ce484222325;
        const FNV_PRIME: u64 = 0x100000001b3;
        let mut hash = FNV_OFFSET;
        for byte in key.as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        (hash % total_partitions.max(1) as u64) as PartitionId
    }

    /// Applies an `add`/`mod` event: deterministic
    /// update keyed by `(partition, uve_key, producer, attr)`.
    pub fn upsert(
        &self,
        partition: PartitionId,
        ident: UveIdent,
        producer: ProducerKey,
        attr: String,
        value: Value,
    ) {
        let store = self.store_for(partition);
        let attrs = store.entry(ident).or_insert_with(DashMap::new);
        let producers = attrs.entry(attr).or_insert_with(DashMap::new);
        producers.insert(producer.clone(), Contribution { value, producer });
    }

    /// Applies a `del` event. Without `attr`, removes the entire UVE
    /// contribution from this producer.
    pub fn remove(
        &self,
        partition: PartitionId,
        ident: &UveIdent,
        producer: &ProducerKey,
        attr: Option<&str>,
    ) {
        let Some(store) = self.partitions.get(&partition) else {
            return;
        };
        let Some(attrs) = store.get(ident) else {
            return;
        };
        match attr {
            Some(attr) => {
                if let Some(producers) = attrs.get(attr) {
                    producers.remove(producer);
                }
            }
            None => {
                for entry in attrs.iter() {
                    entry.value().remove(producer);
                }
            }
        }
        // Garbage-collect empty attrs; destroy the UVE once every
        // producer's contribution is withdrawn.
        attrs.retain(|_, producers| !producers.is_empty());
        if attrs.is_empty() {
            drop(attrs);
            store.remove(ident);
        }
    }

    /// Clears every contribution for a partition. Must run to completion
    /// before any new-owner ingestion starts for that partition; callers
    /// serialize this behind the single writer task for the partition.
    pub fn clear_partition(&self, partition: PartitionId) {
        self.partitions.remove(&partition);
    }

    fn passes_producer_filters(producer: &ProducerKey, filters: &UveFilters) -> bool {
        if let Some(sfilt) = &filters.sfilt {
            if &producer.source != sfilt {
                return false;
            }
        }
        if let Some(mfilt) = &filters.mfilt {
            if &producer.module != mfilt {
                return false;
            }
        }
        true
    }

    fn project(attr: &str, value: &Value, filters: &UveFilters) -> Value {
        let Some(cfilt) = &filters.cfilt else {
            return value.clone();
        };
        let Some(fields) = cfilt.get(attr) else {
            return value.clone();
        };
        match value {
            Value::Object(map) => {
                let projected: serde_json::Map<String, Value> = map
                    .iter()
                    .filter(|(k, _)| fields.contains(*k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Value::Object(projected)
            }
            other => other.clone(),
        }
    }

    fn passes_ackfilt(attr_value: &Value, filters: &UveFilters) -> bool {
        let Some(want_ack) = filters.ackfilt else {
            return true;
        };
        match attr_value.get("ack").and_then(Value::as_bool) {
            Some(ack) => ack == want_ack,
            None => false,
        }
    }

    /// Merges every surviving contribution for one UVE into a single value.
    /// List attributes concatenate, map attributes union (last-writer-wins
    /// per inner key, producers ordered deterministically), scalars are kept
    /// per-producer to preserve provenance.
    fn merge_attrs(&self, attrs: &AttrMap, filters: &UveFilters) -> Value {
        let mut out = serde_json::Map::new();
        for attr_entry in attrs.iter() {
            let attr_name = attr_entry.key().clone();
            let mut producers: Vec<Contribution> = attr_entry
                .value()
                .iter()
                .map(|e| e.value().clone())
                .filter(|c| Self::passes_producer_filters(&c.producer, filters))
                .collect();
            if producers.is_empty() {
                continue;
            }
            producers.sort_by(|a, b| a.producer.to_string().cmp(&b.producer.to_string()));

            let merged = if producers.iter().all(|c| c.value.is_array()) {
                let mut list = Vec::new();
                for c in &producers {
                    if let Value::Array(items) = &c.value {
                        list.extend(items.clone());
                    }
                }
                Value::Array(list)
            } else if producers.iter().all(|c| c.value.is_object()) {
                let mut map = serde_json::Map::new();
                for c in &producers {
                    if let Value::Object(inner) = &c.value {
                        for (k, v) in inner {
                            map.insert(k.clone(), v.clone());
                        }
                    }
                }
                Value::Object(map)
            } else if producers.len() == 1 {
                producers[0].value.clone()
            } else {
                let provenance: Vec<Value> = producers
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "source": c.producer.source,
                            "node_type": c.producer.node_type,
                            "module": c.producer.module,
                            "instance": c.producer.instance,
                            "value": c.value,
                        })
                    })
                    .collect();
                Value::Array(provenance)
            };

            if !Self::passes_ackfilt(&merged, filters) {
                continue;
            }
            let projected = Self::project(&attr_name, &merged, filters);
            out.insert(attr_name, projected);
        }
        Value::Object(out)
    }

    /// Point lookup: returns the merged value for `(table, key)`, or `None`
    /// if no contribution survives filtering.
    pub fn get_uve(&self, table: &str, key: &str, filters: &UveFilters, total_partitions: u32) -> Option<Value> {
        let partition = Self::partition_for_key(key, total_partitions);
        let store = self.partitions.get(&partition)?;
        let ident = UveIdent {
            table: table.to_string(),
            key: key.to_string(),
        };
        let attrs = store.get(&ident)?;
        let merged = self.merge_attrs(&attrs, filters);
        match &merged {
            Value::Object(map) if map.is_empty() => None,
            _ => Some(merged),
        }
    }

    /// All keys for a table across every partition, honoring `kfilt` glob patterns if present.
    pub fn get_uve_list(&self, table: &str, filters: &UveFilters) -> Vec<String> {
        let mut keys = Vec::new();
        for store in self.partitions.iter() {
            for entry in store.value().iter() {
                if entry.key().table != table {
                    continue;
                }
                if key_matches(&entry.key().key, &filters.kfilt) {
                    keys.push(entry.key().key.clone());
                }
            }
        }
        keys.sort();
        keys.dedup();
        keys
    }

    /// Lazily walks every UVE of `table`, yielding `(key, merged-value)`
    /// pairs. Yields to the executor every `SCAN_CHUNK` keys so a wildcard
    /// scan cannot starve point lookups sharing the runtime.
    pub async fn multi_uve_get(&self, table: &str, filters: &UveFilters, total_partitions: u32) -> Vec<(String, Value)> {
        let keys = self.get_uve_list(table, filters);
        let mut out = Vec::with_capacity(keys.len());
        for (i, key) in keys.into_iter().enumerate() {
            if let Some(value) = self.get_uve(table, &key, filters, total_partitions) {
                out.push((key, value));
            }
            if i % SCAN_CHUNK == SCAN_CHUNK - 1 {
                tokio::task::yield_now().await;
            }
        }
        out
    }
}

/// `*` is a multi-char glob, matching `_uve_filter_set`'s `kfilt` semantics.
fn key_matches(key: &str, kfilt: &Option<Vec<String>>) -> bool {
    let Some(patterns) = kfilt else {
        return true;
    };
    patterns.iter().any(|pattern| glob_match(pattern, key))
}

fn glob_match(pattern: &str, text: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == text,
        Some((prefix, suffix)) => {
            text.len() >= prefix.len() + suffix.len()
                && text.starts_with(prefix)
                && text.ends_with(suffix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn producer(name: &str) -> ProducerKey {
        ProducerKey {
            source: name.to_string(),
            node_type: "Analytics".to_string(),
            module: "contrail-test".to_string(),
            instance: "0".to_string(),
        }
    }

    #[test]
    fn point_lookup_merges_list_attrs_across_producers() {
        let cache = UveCache::new();
        let ident = UveIdent {
            table: "ObjectVRouter".to_string(),
            key: "vrouter-1".to_string(),
        };
        cache.upsert(0, ident.clone(), producer("a"), "tags".to_string(), serde_json::json!(["x"]));
        cache.upsert(0, ident.clone(), producer("b"), "tags".to_string(), serde_json::json!(["y"]));

        let merged = cache.get_uve("ObjectVRouter", "vrouter-1", &UveFilters::default(), 4).unwrap();
        let tags = merged["tags"].as_array().unwrap();
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn map_attrs_union_last_writer_wins_by_producer_order() {
        let cache = UveCache::new();
        let ident = UveIdent {
            table: "T".to_string(),
            key: "k".to_string(),
        };
        let partition = UveCache::partition_for_key("k", 4);
        cache.upsert(partition, ident.clone(), producer("a"), "m".to_string(), serde_json::json!({"x": 1}));
        cache.upsert(partition, ident.clone(), producer("z"), "m".to_string(), serde_json::json!({"x": 2}));

        let merged = cache.get_uve("T", "k", &UveFilters::default(), 4).unwrap();
        assert_eq!(merged["m"]["x"], 2);
    }

    #[test]
    fn del_without_attr_withdraws_entire_producer_contribution() {
        let cache = UveCache::new();
        let ident = UveIdent {
            table: "T".to_string(),
            key: "k".to_string(),
        };
        let partition = UveCache::partition_for_key("k", 4);
        cache.upsert(partition, ident.clone(), producer("a"), "x".to_string(), serde_json::json!(1));
        cache.upsert(partition, ident.clone(), producer("a"), "y".to_string(), serde_json::json!(2));
        cache.remove(partition, &ident, &producer("a"), None);
        assert!(cache.get_uve("T", "k", &UveFilters::default(), 4).is_none());
    }

    #[test]
    fn uve_destroyed_when_all_contributions_withdrawn() {
        let cache = UveCache::new();
        let ident = UveIdent {
            table: "T".to_string(),
            key: "k".to_string(),
        };
        let partition = UveCache::partition_for_key("k", 4);
        cache.upsert(partition, ident.clone(), producer("a"), "x".to_string(), serde_json::json!(1));
        cache.remove(partition, &ident, &producer("a"), Some("x"));
        assert_eq!(cache.get_uve_list("T", &UveFilters::default()), Vec::<String>::new());
    }

    #[test]
    fn clear_partition_removes_only_that_partitions_contributions() {
        let cache = UveCache::new();
        let k1 = "alpha";
        let k2 = "beta";
        let p1 = UveCache::partition_for_key(k1, 4);
        let p2 = UveCache::partition_for_key(k2, 4);
        cache.upsert(p1, UveIdent { table: "T".into(), key: k1.into() }, producer("a"), "x".into(), serde_json::json!(1));
        cache.upsert(p2, UveIdent { table: "T".into(), key: k2.into() }, producer("a"), "x".into(), serde_json::json!(1));

        cache.clear_partition(p1);
        assert!(cache.get_uve("T", k1, &UveFilters::default(), 4).is_none());
        if p1 != p2 {
            assert!(cache.get_uve("T", k2, &UveFilters::default(), 4).is_some());
        }
    }

    #[test]
    fn multi_uve_get_with_single_key_kfilt_matches_point_lookup() {
        let cache = UveCache::new();
        let ident = UveIdent { table: "T".into(), key: "only".into() };
        let partition = UveCache::partition_for_key("only", 4);
        cache.upsert(partition, ident, producer("a"), "x".into(), serde_json::json!(42));

        let point = cache.get_uve("T", "only", &UveFilters::default(), 4).unwrap();
        let filters = UveFilters {
            kfilt: Some(vec!["only".to_string()]),
            ..Default::default()
        };
        let list = futures::executor::block_on(cache.multi_uve_get("T", &filters, 4));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].1, point);
    }

    #[test]
    fn wildcard_glob_matches_prefix() {
        assert!(glob_match("vrouter-*", "vrouter-1"));
        assert!(!glob_match("vrouter-*", "other-1"));
        assert!(glob_match("*", "anything"));
    }

    #[test]
    fn ackfilt_excludes_non_matching_alarms() {
        let cache = UveCache::new();
        let ident = UveIdent { table: "T".into(), key: "k".into() };
        let partition = UveCache::partition_for_key("k", 4);
        cache.upsert(
            partition,
            ident,
            producer("a"),
            "UVEAlarms".into(),
            serde_json::json!({"ack": false, "type": "x"}),
        );
        let filters = UveFilters {
            ackfilt: Some(true),
            ..Default::default()
        };
        assert!(cache.get_uve("T", "k", &filters, 4).is_none());
    }
}
