use std::fs;
use std::io;

use anyhow::{Context, Error, Result};
use camino::{Utf8Path, Utf8PathBuf};

use super::Store;

/// A store where each key is a relative file path under a root
/// directory. The production backend for local and mounted targets.
pub struct FilesystemStore {
    root: Utf8PathBuf,
}

impl FilesystemStore {
    /// Opens the store rooted at the given directory, creating it if needed.
    pub fn open(root: &Utf8Path) -> Result<Self> {
        fs::create_dir_all(root).with_context(|| format!("Couldn't create {root}"))?;
        Ok(Self {
            root: root.to_owned(),
        })
    }

    fn key_path(&self, key: &str) -> Utf8PathBuf {
        self.root.join(key)
    }
}

impl Store for FilesystemStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.key_path(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::from(e).context(format!("Couldn't read {path}"))),
        }
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.key_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("Couldn't create {parent}"))?;
        }
        // Write to foo.part, then rename,
        // so the key never holds a partial value.
        let part = Utf8PathBuf::from(format!("{path}.part"));
        fs::write(&part, value).with_context(|| format!("Couldn't write {part}"))?;
        fs::rename(&part, &path)
            .with_context(|| format!("Couldn't rename {part} to {path}"))?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        let path = self.key_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from(e).context(format!("Couldn't remove {path}"))),
        }
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.key_path(key).is_file())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        collect_keys(&self.root, "", &mut keys)?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn try_clone(&self) -> Result<Box<dyn Store>> {
        Ok(Box::new(Self {
            root: self.root.clone(),
        }))
    }
}

fn collect_keys(dir: &Utf8Path, relative: &str, out: &mut Vec<String>) -> Result<()> {
    for entry in dir
        .read_dir_utf8()
        .with_context(|| format!("Couldn't list {dir}"))?
    {
        let entry = entry.with_context(|| format!("Failed reading an entry of {dir}"))?;
        let key = format!("{relative}{}", entry.file_name());
        if entry.file_type()?.is_dir() {
            collect_keys(entry.path(), &format!("{key}/"), out)?;
        } else if !key.ends_with(".part") {
            // Skip half-written puts.
            out.push(key);
        }
    }
    Ok(())
}
