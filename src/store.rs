//! Flat key/value stores where archives live - a directory of files,
//! or an in-memory map for tests.

use anyhow::{Result, anyhow};

pub mod fs;
pub mod memory;

/// A flat string -> bytes map with prefix iteration.
///
/// This is all the engine asks of a remote: no transactions, no atomic
/// multi-key operations. A single-key put is assumed durable once it
/// returns.
pub trait Store: Send {
    /// Read the value at the given key, or `None` if there isn't one.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write the given bytes to the given key.
    fn put(&mut self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove the given key. Removing an absent key is not an error.
    fn delete(&mut self, key: &str) -> Result<()>;

    fn contains(&self, key: &str) -> Result<bool>;

    /// All keys starting with the given prefix, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// An independent handle to the same store,
    /// for workers that can't share this one.
    fn try_clone(&self) -> Result<Box<dyn Store>>;
}

/// Like [`Store::get`], but a missing key is an error.
pub fn get_required(store: &dyn Store, key: &str) -> Result<Vec<u8>> {
    store
        .get(key)?
        .ok_or_else(|| anyhow!("No value at key {key}"))
}

/// A view of another store with every key transparently prefixed.
///
/// It's a scoped window, not a copy - writes land in the underlying
/// store, and only keys under the prefix are visible.
pub struct Scoped {
    inner: Box<dyn Store>,
    prefix: String,
}

impl Scoped {
    pub fn new(inner: Box<dyn Store>, prefix: &str) -> Self {
        Self {
            inner,
            prefix: prefix.to_owned(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

impl Store for Scoped {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(&self.full_key(key))
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.inner.put(&self.full_key(key), value)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.inner.delete(&self.full_key(key))
    }

    fn contains(&self, key: &str) -> Result<bool> {
        self.inner.contains(&self.full_key(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .list(&self.full_key(prefix))?
            .into_iter()
            .map(|key| key[self.prefix.len()..].to_owned())
            .collect())
    }

    fn try_clone(&self) -> Result<Box<dyn Store>> {
        Ok(Box::new(Scoped {
            inner: self.inner.try_clone()?,
            prefix: self.prefix.clone(),
        }))
    }
}
