//! Registry snapshot persistence.
//!
//! The snapshot is a single JSON object `{ "<id>": record, ... }` at
//! `<data-dir>/processes.json`, carrying the persistent fields only.
//! Writes go to a temp file first and are renamed into place, so a
//! recovering daemon always reads a state that existed after some
//! completed operation. Snapshot I/O failures are logged and swallowed:
//! the periodic timer or the next mutation will retry.

use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;

use super::registry::Registry;
use super::Process;
use crate::globals::Paths;

/// Serialize the registry and write it durably.
pub async fn write(paths: &Paths, registry: &Registry) {
    let mut map = BTreeMap::new();
    for (id, record) in registry.records() {
        let process = record.lock().await;
        match serde_json::to_value(&*process) {
            Ok(value) => {
                map.insert(id.to_string(), value);
            }
            Err(err) => {
                log::error!("failed to encode process {id} for snapshot: {err}");
                return;
            }
        }
    }

    write_map(paths, &map);
}

pub(crate) fn write_map(paths: &Paths, map: &BTreeMap<String, serde_json::Value>) {
    let encoded = match serde_json::to_string_pretty(map) {
        Ok(encoded) => encoded,
        Err(err) => {
            log::error!("failed to encode snapshot: {err}");
            return;
        }
    };

    let tmp = paths.snapshot_tmp();
    if let Err(err) = fs::write(&tmp, encoded) {
        log::error!("failed to write snapshot: {err}");
        return;
    }
    if let Err(err) = fs::rename(&tmp, paths.snapshot()) {
        log::error!("failed to move snapshot into place: {err}");
    }
}

/// Load the snapshot, once, at daemon bootstrap. A corrupted file is
/// moved aside for inspection and an empty registry returned.
pub fn read(paths: &Paths) -> BTreeMap<usize, Process> {
    let snapshot = paths.snapshot();
    if !snapshot.exists() {
        return BTreeMap::new();
    }

    let data = match fs::read_to_string(&snapshot) {
        Ok(data) => data,
        Err(err) => {
            log::error!("failed to read snapshot: {err}");
            return BTreeMap::new();
        }
    };

    match serde_json::from_str::<BTreeMap<String, Process>>(&data) {
        Ok(map) => map
            .into_iter()
            .filter_map(|(id, process)| id.parse::<usize>().ok().map(|id| (id, process)))
            .collect(),
        Err(err) => {
            log::error!("corrupted snapshot, starting fresh: {err}");
            let backup = format!(
                "{}.corrupted.{}",
                snapshot.display(),
                Utc::now().format("%Y%m%d_%H%M%S")
            );
            if let Err(err) = fs::rename(&snapshot, &backup) {
                log::warn!("failed to back up corrupted snapshot: {err}");
            } else {
                log::warn!("backed up corrupted snapshot to {backup}");
            }
            BTreeMap::new()
        }
    }
}
