use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use crate::error::{CacheError, Result};

/// Anything an `Indexer` can hold.
pub trait StoreObject: Clone + Send + Sync {
    /// Primary key, unique within one store.
    fn key(&self) -> String;
}

/// Maps an object to the index values it should be found under.
pub type IndexFunc<K> = fn(&K) -> Result<Vec<String>>;

/// What a `replace` changed, in the order handlers should see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta<K> {
    Added(K),
    Updated { old: K, new: K },
    Deleted(K),
}

/// Keyed object store with secondary indices.
///
/// Every mutation computes the new index values before taking the write lock and
/// then swaps item and index entries together, so readers see either the old or
/// the new state of an object, never a mix.
pub struct Indexer<K> {
    index_funcs: BTreeMap<&'static str, IndexFunc<K>>,
    state: RwLock<IndexerState<K>>,
}

struct IndexerState<K> {
    items: HashMap<String, K>,
    /// index name -> index value -> primary keys
    indices: HashMap<&'static str, HashMap<String, HashSet<String>>>,
}

type IndexValues = Vec<(&'static str, Vec<String>)>;

impl<K: StoreObject> Indexer<K> {
    pub fn new() -> Self {
        Self {
            index_funcs: BTreeMap::new(),
            state: RwLock::new(IndexerState {
                items: HashMap::new(),
                indices: HashMap::new(),
            }),
        }
    }

    /// Register a secondary index. Must be called before the store is populated.
    pub fn with_index(mut self, name: &'static str, func: IndexFunc<K>) -> Self {
        self.index_funcs.insert(name, func);
        self
    }

    fn index_values(&self, obj: &K) -> Result<IndexValues> {
        self.index_funcs
            .iter()
            .map(|(name, func)| Ok((*name, func(obj)?)))
            .collect()
    }

    /// Insert or replace an object. Returns the previous version, if any.
    pub fn add(&self, obj: K) -> Result<Option<K>> {
        let values = self.index_values(&obj)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Ok(state.upsert(&self.index_funcs, obj, values))
    }

    pub fn update(&self, obj: K) -> Result<Option<K>> {
        self.add(obj)
    }

    /// Remove by primary key. Returns the removed object.
    pub fn delete(&self, key: &str) -> Option<K> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.remove(&self.index_funcs, key)
    }

    /// Swap the whole content for `objs` and report what changed.
    ///
    /// Fails without touching the store if any object cannot be indexed.
    pub fn replace(&self, objs: Vec<K>) -> Result<Vec<Delta<K>>> {
        let mut incoming = Vec::with_capacity(objs.len());
        for obj in objs {
            let values = self.index_values(&obj)?;
            incoming.push((obj.key(), obj, values));
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let keep: HashSet<&String> = incoming.iter().map(|(key, _, _)| key).collect();
        let stale: Vec<String> = state
            .items
            .keys()
            .filter(|k| !keep.contains(k))
            .cloned()
            .collect();

        let mut deltas = Vec::new();
        for key in stale {
            if let Some(old) = state.remove(&self.index_funcs, &key) {
                deltas.push(Delta::Deleted(old));
            }
        }
        for (_, obj, values) in incoming {
            match state.upsert(&self.index_funcs, obj.clone(), values) {
                Some(old) => deltas.push(Delta::Updated { old, new: obj }),
                None => deltas.push(Delta::Added(obj)),
            }
        }
        Ok(deltas)
    }

    pub fn get_by_key(&self, key: &str) -> Option<K> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.items.get(key).cloned()
    }

    /// All objects, in no particular order.
    pub fn list(&self) -> Vec<K> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.items.values().cloned().collect()
    }

    /// Objects currently filed under `value` in index `name`. A miss is an empty `Vec`.
    pub fn by_index(&self, name: &str, value: &str) -> Result<Vec<K>> {
        let Some((index, _)) = self.index_funcs.get_key_value(name) else {
            return Err(CacheError::UnknownIndex(name.to_string()));
        };
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let keys = state.indices.get(index).and_then(|idx| idx.get(value));
        Ok(keys
            .into_iter()
            .flatten()
            .filter_map(|k| state.items.get(k).cloned())
            .collect())
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: StoreObject> Default for Indexer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: StoreObject> IndexerState<K> {
    fn upsert(
        &mut self,
        funcs: &BTreeMap<&'static str, IndexFunc<K>>,
        obj: K,
        values: IndexValues,
    ) -> Option<K> {
        let key = obj.key();
        let old = self.items.insert(key.clone(), obj);
        if let Some(old) = &old {
            self.unindex(funcs, &key, old);
        }
        for (name, index_values) in values {
            let index = self.indices.entry(name).or_default();
            for value in index_values {
                index.entry(value).or_default().insert(key.clone());
            }
        }
        old
    }

    fn remove(&mut self, funcs: &BTreeMap<&'static str, IndexFunc<K>>, key: &str) -> Option<K> {
        let old = self.items.remove(key)?;
        self.unindex(funcs, key, &old);
        Some(old)
    }

    /// Drop `key` from every index value `old` was filed under.
    fn unindex(&mut self, funcs: &BTreeMap<&'static str, IndexFunc<K>>, key: &str, old: &K) {
        for (name, func) in funcs {
            // `old` was indexed successfully on the way in; index funcs are pure.
            let values = func(old).unwrap_or_default();
            let Some(index) = self.indices.get_mut(name) else {
                continue;
            };
            for value in values {
                if let Some(keys) = index.get_mut(&value) {
                    keys.remove(key);
                    if keys.is_empty() {
                        index.remove(&value);
                    }
                }
            }
        }
    }
}
