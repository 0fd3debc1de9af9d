//! Which directories get backed up where - loaded from a TOML file.

use std::collections::BTreeMap;
use std::{fs, io};

use anyhow::{Context, Result, anyhow, bail};
use camino::{Utf8Path, Utf8PathBuf};
use serde_derive::Deserialize;

use crate::error::Error;
use crate::store::{Scoped, Store, fs::FilesystemStore};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Root directory of the filesystem-backed store.
    pub store: Utf8PathBuf,

    /// Scratch directory that full verification restores into.
    /// It gets wiped every time, so pick accordingly.
    #[serde(rename = "verify-dir")]
    pub verify_dir: Option<Utf8PathBuf>,

    pub backups: BTreeMap<String, BackupTarget>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupTarget {
    /// The directory this backup snapshots.
    pub source: Utf8PathBuf,

    /// Key prefix scoping this backup's archive inside the store.
    pub prefix: String,
}

pub fn load(explicit: Option<&Utf8Path>) -> Result<Configuration> {
    let path = match explicit {
        Some(p) => p.to_owned(),
        None => {
            let mut p: Utf8PathBuf = home::home_dir()
                .ok_or_else(|| anyhow!("Can't find home directory"))?
                .try_into()
                .context("Home directory isn't UTF-8")?;
            p.extend([".config", "duffel.toml"]);
            p
        }
    };
    let s = match fs::read_to_string(&path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            bail!(Error::Configuration(format!(
                "no configuration file at {path}"
            )))
        }
        found => found.with_context(|| format!("Couldn't open {path}"))?,
    };
    toml::from_str(&s).with_context(|| format!("Couldn't parse {path}"))
}

impl Configuration {
    /// The named backup, or a configuration error naming what's there.
    pub fn target(&self, name: &str) -> Result<&BackupTarget> {
        self.backups.get(name).ok_or_else(|| {
            Error::Configuration(format!(
                "no backup named {name} (configured: {})",
                self.backups
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
            .into()
        })
    }

    /// Opens the store and scopes it down to the named backup's archive.
    pub fn open_archive(&self, name: &str) -> Result<Box<dyn Store>> {
        let target = self.target(name)?;
        let root = FilesystemStore::open(&self.store)?;
        Ok(Box::new(Scoped::new(Box::new(root), &target.prefix)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse() -> Result<()> {
        let conf: Configuration = toml::from_str(
            r#"
store = "/backups/store"
verify-dir = "/tmp/scratch"

[backups.docs]
source = "/home/me/docs"
prefix = "docs/"
"#,
        )?;
        assert_eq!(conf.store, "/backups/store");
        assert_eq!(conf.verify_dir.as_deref(), Some(Utf8Path::new("/tmp/scratch")));
        assert_eq!(conf.target("docs")?.prefix, "docs/");
        assert!(conf.target("nope").is_err());
        Ok(())
    }
}
