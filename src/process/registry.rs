use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{Process, Status};

/// Registry lock first, then the record lock, never the reverse.
pub type SharedRecord = Arc<Mutex<Process>>;

/// The authoritative `id -> record` map. Ids are monotonic and never
/// reassigned, even after a record is deleted.
pub struct Registry {
    next_id: usize,
    records: BTreeMap<usize, SharedRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            records: BTreeMap::new(),
        }
    }

    /// Insert a new record, assigning the next id.
    pub fn insert(&mut self, make: impl FnOnce(usize) -> Process) -> SharedRecord {
        let id = self.next_id;
        self.next_id += 1;

        let record = Arc::new(Mutex::new(make(id)));
        self.records.insert(id, record.clone());
        record
    }

    /// Re-insert a record loaded from the snapshot under its original
    /// id, keeping the id counter ahead of everything seen.
    pub fn restore(&mut self, id: usize, process: Process) -> SharedRecord {
        if id >= self.next_id {
            self.next_id = id + 1;
        }
        let record = Arc::new(Mutex::new(process));
        self.records.insert(id, record.clone());
        record
    }

    pub fn remove(&mut self, id: usize) -> Option<SharedRecord> {
        self.records.remove(&id)
    }

    pub fn get(&self, id: usize) -> Option<SharedRecord> {
        self.records.get(&id).cloned()
    }

    pub fn records(&self) -> impl Iterator<Item = (&usize, &SharedRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Name-or-id resolution: an argument that parses as a non-negative
    /// integer and matches an existing id wins; otherwise the first
    /// record with that name.
    pub async fn lookup(&self, key: &str) -> Option<SharedRecord> {
        if let Ok(id) = key.parse::<usize>() {
            if let Some(record) = self.records.get(&id) {
                return Some(record.clone());
            }
        }

        for record in self.records.values() {
            if record.lock().await.name == key {
                return Some(record.clone());
            }
        }

        None
    }

    /// A name is in use while any record carrying it is not Stopped.
    pub async fn name_in_use(&self, name: &str) -> bool {
        for record in self.records.values() {
            let process = record.lock().await;
            if process.name == name && process.status != Status::Stopped {
                return true;
            }
        }
        false
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ExecMode, Handles};
    use std::path::PathBuf;
    use std::time::Duration;

    fn process(id: usize, name: &str, status: Status) -> Process {
        Process {
            id,
            name: name.to_string(),
            script: "/bin/true".to_string(),
            args: vec![],
            cwd: PathBuf::from("/tmp"),
            env: Default::default(),
            exec_mode: ExecMode::Fork,
            instances: 1,
            status,
            pid: 0,
            start_time: None,
            restarts: 0,
            log_file: PathBuf::from("/tmp/a.log"),
            error_log_file: PathBuf::from("/tmp/a-error.log"),
            watch: false,
            watch_ignore: vec![],
            max_restarts: 15,
            min_uptime: Duration::from_secs(1),
            handles: Handles::default(),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_monotonic_ids() {
        let mut registry = Registry::new();
        let a = registry.insert(|id| process(id, "a", Status::Stopped));
        let b = registry.insert(|id| process(id, "b", Status::Stopped));
        assert_eq!(a.lock().await.id, 1);
        assert_eq!(b.lock().await.id, 2);

        registry.remove(1);
        let c = registry.insert(|id| process(id, "c", Status::Stopped));
        assert_eq!(c.lock().await.id, 3, "deleted ids are never reassigned");
    }

    #[tokio::test]
    async fn test_lookup_by_id_and_name() {
        let mut registry = Registry::new();
        registry.insert(|id| process(id, "web", Status::Online));
        registry.insert(|id| process(id, "worker", Status::Online));

        let by_id = registry.lookup("2").await.unwrap();
        assert_eq!(by_id.lock().await.name, "worker");

        let by_name = registry.lookup("web").await.unwrap();
        assert_eq!(by_name.lock().await.id, 1);

        assert!(registry.lookup("missing").await.is_none());
        assert!(registry.lookup("99").await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_prefers_id_match() {
        let mut registry = Registry::new();
        // A record literally named "2" and a record with id 2.
        registry.insert(|id| process(id, "2", Status::Online));
        registry.insert(|id| process(id, "other", Status::Online));

        let found = registry.lookup("2").await.unwrap();
        assert_eq!(found.lock().await.name, "other", "id match wins");
    }

    #[tokio::test]
    async fn test_name_in_use_ignores_stopped() {
        let mut registry = Registry::new();
        registry.insert(|id| process(id, "web", Status::Stopped));
        assert!(!registry.name_in_use("web").await);

        registry.insert(|id| process(id, "web", Status::Online));
        assert!(registry.name_in_use("web").await);
    }

    #[tokio::test]
    async fn test_restore_advances_id_counter() {
        let mut registry = Registry::new();
        registry.restore(7, process(7, "old", Status::Stopped));
        let next = registry.insert(|id| process(id, "new", Status::Stopped));
        assert_eq!(next.lock().await.id, 8);
    }
}
