//! Durable client-side key/value storage for host session state.

use pp_core::PlaypenError;
use pp_core::PlaypenResult;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::rc::Rc;

/// String key/value store with `localStorage` semantics.
pub trait SessionStorage {
    fn get_item(&self, key: &str) -> PlaypenResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> PlaypenResult<()>;
    fn remove_item(&self, key: &str) -> PlaypenResult<()>;
}

/// Durable storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StorageConfig {
    pub ephemeral_mode: bool,
}

/// Entry point for file-backed storage namespaces.
#[derive(Debug, Clone)]
pub struct StorageManager {
    pub config: StorageConfig,
    persistent_root: Option<PathBuf>,
}

impl StorageManager {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            persistent_root: None,
        }
    }

    pub fn with_persistent_root(mut self, root: PathBuf) -> Self {
        self.persistent_root = Some(root);
        self
    }

    /// Opens the store for `namespace`; the backing file is created lazily
    /// on first write.
    pub fn open(&self, namespace: &str) -> PlaypenResult<FileStore> {
        if self.config.ephemeral_mode {
            return Err(PlaypenError::new(
                "storage.persistence_disabled",
                "persistent storage is disabled in ephemeral mode",
            ));
        }

        let root = self.persistent_root.as_ref().ok_or_else(|| {
            PlaypenError::new(
                "storage.persistence_unconfigured",
                "persistent storage root is not configured",
            )
        })?;

        Ok(FileStore {
            path: root
                .join("session")
                .join(format!("{}.json", sanitize_namespace(namespace))),
        })
    }
}

/// One namespace persisted as a JSON object of string values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStorage for FileStore {
    fn get_item(&self, key: &str) -> PlaypenResult<Option<String>> {
        let mut map = read_namespace(&self.path)?;
        Ok(map.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> PlaypenResult<()> {
        let mut map = read_namespace(&self.path).unwrap_or_default();
        map.insert(key.to_owned(), value.to_owned());
        write_namespace(&self.path, &map)
    }

    fn remove_item(&self, key: &str) -> PlaypenResult<()> {
        let mut map = read_namespace(&self.path)?;
        if map.remove(key).is_none() {
            return Ok(());
        }

        if map.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path).map_err(|error| {
                    PlaypenError::new(
                        "storage.remove_failed",
                        format!(
                            "failed removing empty namespace file `{}`: {error}",
                            self.path.display()
                        ),
                    )
                })?;
            }
            return Ok(());
        }

        write_namespace(&self.path, &map)
    }
}

/// In-process store for ephemeral sessions and tests.
///
/// Clones share the same items.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Rc<RefCell<BTreeMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl SessionStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> PlaypenResult<Option<String>> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> PlaypenResult<()> {
        self.items
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> PlaypenResult<()> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

fn sanitize_namespace(input: &str) -> String {
    let mut out = String::new();
    for ch in input.trim().to_ascii_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }

    if out.is_empty() || out.chars().all(|ch| ch == '.') {
        "default".to_owned()
    } else {
        out
    }
}

fn read_namespace(path: &Path) -> PlaypenResult<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let content = fs::read_to_string(path).map_err(|error| {
        PlaypenError::new(
            "storage.read_failed",
            format!("failed to read namespace file `{}`: {error}", path.display()),
        )
    })?;

    serde_json::from_str(&content).map_err(|error| {
        PlaypenError::new(
            "storage.format_invalid",
            format!("namespace file `{}` is not a JSON object: {error}", path.display()),
        )
    })
}

fn write_namespace(path: &Path, map: &BTreeMap<String, String>) -> PlaypenResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| {
            PlaypenError::new(
                "storage.dir_create_failed",
                format!(
                    "failed to create storage directory `{}`: {error}",
                    parent.display()
                ),
            )
        })?;
    }

    let encoded = serde_json::to_string(map).map_err(|error| {
        PlaypenError::new(
            "storage.encode_failed",
            format!("failed to encode namespace: {error}"),
        )
    })?;

    // Readers only ever see a complete file.
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, encoded).map_err(|error| {
        PlaypenError::new(
            "storage.write_failed",
            format!("failed to write `{}`: {error}", staging.display()),
        )
    })?;
    fs::rename(&staging, path).map_err(|error| {
        PlaypenError::new(
            "storage.write_failed",
            format!("failed to replace `{}`: {error}", path.display()),
        )
    })
}
