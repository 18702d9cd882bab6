use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::Result;

/// Directory holding the backend's persisted session state.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Remove everything stored and start over with an empty directory.
    pub fn wipe(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.dir)?;
        info!(dir = %self.dir.display(), "credentials wiped");
        Ok(())
    }

    /// Load `<dir>/<name>`; a missing or empty file is `None`.
    pub fn load_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(None);
        }
        let txt = fs::read_to_string(&path)?;
        if txt.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&txt)?))
    }

    /// Write `<dir>/<name>` via a temp file + rename.
    pub fn save_json<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        self.ensure()?;
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!(".{name}.tmp"));
        fs::write(&tmp, serde_json::to_string_pretty(data)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}
