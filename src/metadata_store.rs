use std::fs;
use std::path::PathBuf;

use parking_lot::RwLock;

use crate::error::Result;

/// Durable key-value contract for engine metadata: the version marker at
/// `version` and one `/index/<name>` entry per persisted index. The real
/// engine backs this with a dedicated embedded store; this crate only
/// depends on the contract, with a disk-backed reference implementation for
/// standalone running and tests.
pub trait MetadataStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;
}

/// One file per key under `root`, with `/` in keys mapped to a flat,
/// filesystem-safe encoding so `/index/<name>` doesn't require creating a
/// directory per index.
pub struct DiskMetadataStore {
    root: PathBuf,
    // Guards the encode/write/rename sequence so concurrent `set`s on
    // different keys never race on directory creation.
    lock: RwLock<()>,
}

impl DiskMetadataStore {
    pub fn open(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(DiskMetadataStore { root, lock: RwLock::new(()) })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let encoded = key.trim_start_matches('/').replace('/', "__");
        self.root.join(format!("{encoded}.json"))
    }
}

impl MetadataStore for DiskMetadataStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let _guard = self.lock.read();
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let _guard = self.lock.write();
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.lock.write();
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let _guard = self.lock.read();
        let encoded_prefix = prefix.trim_start_matches('/').replace('/', "__");
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(stem) = file_name.strip_suffix(".json") else { continue };
            if !stem.starts_with(&encoded_prefix) {
                continue;
            }
            let key = format!("/{}", stem.replace("__", "/"));
            let bytes = fs::read(entry.path())?;
            out.push((key, bytes));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_version_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskMetadataStore::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.get("version").unwrap(), None);
        store.set("version", b"1").unwrap();
        assert_eq!(store.get("version").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn lists_index_entries_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskMetadataStore::open(dir.path().to_path_buf()).unwrap();
        store.set("/index/orders", b"{}").unwrap();
        store.set("/index/users", b"{}").unwrap();
        store.set("version", b"1").unwrap();

        let listed = store.list("/index/").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0, "/index/orders");
        assert_eq!(listed[1].0, "/index/users");
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskMetadataStore::open(dir.path().to_path_buf()).unwrap();
        store.delete("/index/missing").unwrap();
    }
}
