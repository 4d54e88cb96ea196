use std::collections::HashMap;

use machine_learning::{Key, ParamAccess};
use parking_lot::RwLock;

/// A slice of the key space, locked as a whole.
pub struct ParamShard<A: ParamAccess> {
    params: RwLock<HashMap<Key, A::Param>>,
}

impl<A: ParamAccess> ParamShard<A> {
    pub fn new() -> Self {
        Self {
            params: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.params.read().len()
    }

    pub fn contains(&self, key: Key) -> bool {
        self.params.read().contains_key(&key)
    }

    /// Inserts `key` with the value built by `init` unless it's already present.
    pub fn get_or_init(&self, key: Key, init: impl FnOnce() -> A::Param) {
        if self.contains(key) {
            return;
        }

        self.params.write().entry(key).or_insert_with(init);
    }

    /// Writes the pull value of each `(key, out)` pair under a single read lock.
    ///
    /// Every key must be present.
    pub fn pull<'a>(&self, access: &A, items: impl Iterator<Item = (Key, &'a mut [f32])>) {
        let params = self.params.read();
        for (key, out) in items {
            if let Some(param) = params.get(&key) {
                access.to_pull_value(param, out);
            }
        }
    }

    /// Applies each `(key, grad)` pair under a single write lock.
    ///
    /// Every key must be present.
    pub fn push<'a>(&self, access: &A, items: impl Iterator<Item = (Key, &'a [f32])>) {
        let mut params = self.params.write();
        for (key, grad) in items {
            if let Some(param) = params.get_mut(&key) {
                access.apply_push_value(param, grad);
            }
        }
    }

    /// Runs `f` on the record of `key`, if present.
    pub fn with_param<T>(&self, key: Key, f: impl FnOnce(&A::Param) -> T) -> Option<T> {
        self.params.read().get(&key).map(f)
    }

    pub fn keys(&self) -> Vec<Key> {
        self.params.read().keys().copied().collect()
    }
}
