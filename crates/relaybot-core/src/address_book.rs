use std::{
    collections::BTreeMap,
    fs,
    path::PathBuf,
    sync::{Arc, Mutex as StdMutex},
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{SenderIdentity, UserId},
    errors::Error,
    Result,
};

/// Persistence port for the address book. Each call loads or replaces the whole mapping.
pub trait AddressBookStore: Send + Sync {
    fn load(&self) -> Result<BTreeMap<i64, String>>;
    fn save(&self, entries: &BTreeMap<i64, String>) -> Result<()>;
}

/// On-disk shape: `{"111": "alice"}`, or the older bare list `[111, 222]`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AddressBookFile {
    Names(BTreeMap<String, String>),
    Ids(Vec<i64>),
}

const UNKNOWN_NAME: &str = "Unknown";

/// JSON file store; writes go to a sibling temp file that is renamed over the target.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "address_book.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::AddressBook {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

impl AddressBookStore for JsonFileStore {
    fn load(&self) -> Result<BTreeMap<i64, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let txt = fs::read_to_string(&self.path)?;
        if txt.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let file: AddressBookFile =
            serde_json::from_str(&txt).map_err(|e| self.invalid(e.to_string()))?;
        match file {
            AddressBookFile::Names(map) => map
                .into_iter()
                .map(|(k, v)| {
                    k.trim()
                        .parse::<i64>()
                        .map(|id| (id, v))
                        .map_err(|_| self.invalid(format!("non-numeric id {k:?}")))
                })
                .collect(),
            AddressBookFile::Ids(ids) => Ok(ids
                .into_iter()
                .map(|id| (id, UNKNOWN_NAME.to_string()))
                .collect()),
        }
    }

    fn save(&self, entries: &BTreeMap<i64, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = AddressBookFile::Names(
            entries
                .iter()
                .map(|(id, name)| (id.to_string(), name.clone()))
                .collect(),
        );
        let txt = serde_json::to_string_pretty(&file)?;

        let tmp = self.tmp_path();
        fs::write(&tmp, txt)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: StdMutex<BTreeMap<i64, String>>,
}

impl MemoryStore {
    pub fn with_entries(entries: impl IntoIterator<Item = (i64, String)>) -> Self {
        Self {
            entries: StdMutex::new(entries.into_iter().collect()),
        }
    }

    pub fn snapshot(&self) -> BTreeMap<i64, String> {
        self.entries
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl AddressBookStore for MemoryStore {
    fn load(&self) -> Result<BTreeMap<i64, String>> {
        Ok(self.snapshot())
    }

    fn save(&self, entries: &BTreeMap<i64, String>) -> Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| Error::External("memory store poisoned".to_string()))?;
        *guard = entries.clone();
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    New,
    Renamed,
    Unchanged,
}

/// Durable set of known senders (id → last-known display name).
///
/// Registration never removes anyone; a changed display name overwrites the old one.
pub struct AddressBook {
    store: Arc<dyn AddressBookStore>,
    entries: Mutex<BTreeMap<UserId, String>>,
}

impl AddressBook {
    /// Load the current mapping from `store`.
    pub fn open(store: Box<dyn AddressBookStore>) -> Result<Self> {
        let entries = store
            .load()?
            .into_iter()
            .map(|(id, name)| (UserId(id), name))
            .collect();
        Ok(Self {
            store: Arc::from(store),
            entries: Mutex::new(entries),
        })
    }

    /// Add or refresh a sender, persisting when anything changed.
    ///
    /// The in-memory entry is kept even if persisting fails; the next successful
    /// save writes it out. The file write runs on the blocking pool while the lock
    /// stays held, so saves never interleave.
    pub async fn register(&self, sender: &SenderIdentity) -> Result<Registration> {
        let mut entries = self.entries.lock().await;
        let outcome = match entries.get(&sender.id) {
            None => Registration::New,
            Some(name) if name != &sender.display_name => Registration::Renamed,
            Some(_) => return Ok(Registration::Unchanged),
        };
        entries.insert(sender.id, sender.display_name.clone());

        let snapshot: BTreeMap<i64, String> =
            entries.iter().map(|(id, n)| (id.0, n.clone())).collect();
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .map_err(|e| Error::External(format!("address book writer failed: {e}")))??;
        Ok(outcome)
    }

    pub async fn entries(&self) -> Vec<SenderIdentity> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|(id, name)| SenderIdentity {
                id: *id,
                display_name: name.clone(),
            })
            .collect()
    }

    pub async fn display_name(&self, id: UserId) -> Option<String> {
        self.entries.lock().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"))
    }

    #[tokio::test]
    async fn registration_survives_reopen() {
        let dir = tmp("relaybot-book");
        let path = dir.join("user_data.json");

        let book = AddressBook::open(Box::new(JsonFileStore::new(&path))).unwrap();
        assert_eq!(
            book.register(&SenderIdentity::new(111, "alice")).await.unwrap(),
            Registration::New
        );
        assert_eq!(
            book.register(&SenderIdentity::new(111, "alice")).await.unwrap(),
            Registration::Unchanged
        );
        assert_eq!(
            book.register(&SenderIdentity::new(111, "alice2")).await.unwrap(),
            Registration::Renamed
        );
        book.register(&SenderIdentity::new(222, "bob")).await.unwrap();

        let reopened = AddressBook::open(Box::new(JsonFileStore::new(&path))).unwrap();
        assert_eq!(reopened.len().await, 2);
        assert_eq!(
            reopened.display_name(UserId(111)).await.as_deref(),
            Some("alice2")
        );
        assert!(!JsonFileStore::new(&path).tmp_path().exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn reads_name_map_format() {
        let dir = tmp("relaybot-book-map");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("user_data.json");
        fs::write(&path, r#"{"111": "alice", "222": "Unknown"}"#).unwrap();

        let loaded = JsonFileStore::new(&path).load().unwrap();
        assert_eq!(loaded.get(&111).map(String::as_str), Some("alice"));
        assert_eq!(loaded.len(), 2);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn reads_legacy_id_list_format() {
        let dir = tmp("relaybot-book-list");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("users.json");
        fs::write(&path, "[111, 222]").unwrap();

        let loaded = JsonFileStore::new(&path).load().unwrap();
        assert_eq!(loaded.get(&222).map(String::as_str), Some("Unknown"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_or_empty_file_is_an_empty_book() {
        let dir = tmp("relaybot-book-empty");
        let path = dir.join("none.json");
        assert!(JsonFileStore::new(&path).load().unwrap().is_empty());

        fs::create_dir_all(&dir).unwrap();
        fs::write(&path, "  \n").unwrap();
        assert!(JsonFileStore::new(&path).load().unwrap().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_non_numeric_ids() {
        let dir = tmp("relaybot-book-bad");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.json");
        fs::write(&path, r#"{"alice": "alice"}"#).unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, Error::AddressBook { .. }));

        let _ = fs::remove_dir_all(&dir);
    }

    struct ThreadRecordingStore {
        saved_on: Arc<StdMutex<Vec<std::thread::ThreadId>>>,
    }

    impl AddressBookStore for ThreadRecordingStore {
        fn load(&self) -> Result<BTreeMap<i64, String>> {
            Ok(BTreeMap::new())
        }

        fn save(&self, _entries: &BTreeMap<i64, String>) -> Result<()> {
            self.saved_on
                .lock()
                .unwrap()
                .push(std::thread::current().id());
            Ok(())
        }
    }

    #[tokio::test]
    async fn saves_run_on_the_blocking_pool() {
        let saved_on = Arc::new(StdMutex::new(Vec::new()));
        let book = AddressBook::open(Box::new(ThreadRecordingStore {
            saved_on: saved_on.clone(),
        }))
        .unwrap();

        book.register(&SenderIdentity::new(1, "a")).await.unwrap();

        let threads = saved_on.lock().unwrap().clone();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], std::thread::current().id());
    }
}
