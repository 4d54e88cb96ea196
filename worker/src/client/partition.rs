use machine_learning::Key;

/// Assigns every key to the server `key % servers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    servers: usize,
}

impl Partition {
    /// Creates a new `Partition`.
    ///
    /// # Panics
    /// If `servers` is zero.
    pub fn new(servers: usize) -> Self {
        assert!(servers > 0, "there must be at least one server");
        Self { servers }
    }

    pub fn servers(&self) -> usize {
        self.servers
    }

    pub fn server_of(&self, key: Key) -> usize {
        (key % self.servers as Key) as usize
    }

    /// Splits `keys` by server, keeping their relative order.
    pub fn split(&self, keys: &[Key]) -> Vec<Vec<Key>> {
        let mut parts = vec![Vec::new(); self.servers];
        for &key in keys {
            parts[self.server_of(key)].push(key);
        }
        parts
    }
}
