use std::collections::{HashMap, hash_map::Entry};

use crate::{Key, MlErr, ParamAccess, Result};

/// Per-worker storage for the parameters checked out from the servers.
///
/// Each key holds the last pulled value and the gradient accumulator of the round in
/// flight. Structural changes need `&mut self`, while compute tasks share `&self` and
/// accumulate through the atomics inside `A::Grad`.
pub struct LocalParamCache<A: ParamAccess> {
    access: A,
    params: HashMap<Key, A::Local>,
    grads: HashMap<Key, A::Grad>,
}

impl<A: ParamAccess> LocalParamCache<A> {
    /// Creates a new empty `LocalParamCache`.
    ///
    /// # Arguments
    /// * `access` - The model's parameter layout.
    pub fn new(access: A) -> Self {
        Self {
            access,
            params: HashMap::new(),
            grads: HashMap::new(),
        }
    }

    pub fn access(&self) -> &A {
        &self.access
    }

    /// Allocates a value and an accumulator for every key that's not present yet,
    /// the existing entries are left untouched.
    ///
    /// # Arguments
    /// * `keys` - The keys to check out.
    pub fn init_keys<'a>(&mut self, keys: impl IntoIterator<Item = &'a Key>) {
        for &key in keys {
            if let Entry::Vacant(entry) = self.params.entry(key) {
                entry.insert(self.access.new_local());
                self.grads.insert(key, self.access.new_grad());
            }
        }
    }

    pub fn contains(&self, key: Key) -> bool {
        self.params.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the cached value of `key`.
    ///
    /// # Panics
    /// If `key` was not initialized, touching a key outside the round's active set is
    /// a bug in the caller.
    pub fn param(&self, key: Key) -> &A::Local {
        match self.params.get(&key) {
            Some(local) => local,
            None => panic!("key {key} is not in the local cache"),
        }
    }

    /// Returns the gradient accumulator of `key`.
    ///
    /// # Panics
    /// If `key` was not initialized.
    pub fn grad(&self, key: Key) -> &A::Grad {
        match self.grads.get(&key) {
            Some(grad) => grad,
            None => panic!("key {key} is not in the local cache"),
        }
    }

    /// Iterates over every gradient accumulator, in no particular order.
    pub fn grads(&self) -> impl Iterator<Item = (Key, &A::Grad)> {
        self.grads.iter().map(|(&key, grad)| (key, grad))
    }

    /// Overwrites the cached values of `keys` with a pulled buffer, initializing the
    /// missing entries.
    ///
    /// # Arguments
    /// * `keys` - The pulled keys.
    /// * `values` - `pull_width` numbers per key, in the same order as `keys`.
    ///
    /// # Returns
    /// An error if `values` doesn't hold exactly one value per key.
    pub fn load_pull_values(&mut self, keys: &[Key], values: &[f32]) -> Result<()> {
        let width = self.access.pull_width();
        if values.len() != keys.len() * width {
            return Err(MlErr::SizeMismatch {
                what: "pulled values",
                got: values.len(),
                expected: keys.len() * width,
            });
        }

        self.init_keys(keys);
        let Self { access, params, .. } = self;
        for (key, value) in keys.iter().zip(values.chunks_exact(width)) {
            if let Some(local) = params.get_mut(key) {
                access.load_pull_value(local, value);
            }
        }

        Ok(())
    }

    /// Writes the accumulated gradients of `keys` into `out`, replacing its content.
    ///
    /// # Panics
    /// If any of `keys` was not initialized.
    pub fn export_push_values(&self, keys: &[Key], out: &mut Vec<f32>) {
        let width = self.access.push_width();
        out.clear();
        out.resize(keys.len() * width, 0.0);

        for (&key, value) in keys.iter().zip(out.chunks_exact_mut(width)) {
            self.access.to_push_value(self.grad(key), value);
        }
    }

    /// Drops the entries of `keys`.
    pub fn remove_keys(&mut self, keys: &[Key]) {
        for key in keys {
            self.params.remove(key);
            self.grads.remove(key);
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.params.clear();
        self.grads.clear();
    }
}
