//! Persisted list state: framed codec plus an atomic on-disk store

use super::engine::IdentityStore;
use crate::core::{ClassId, FieldRef, ListError, ObjectId, OwningScope, Result, SortItem};
use crate::pipeline::{RecordFilter, Sorter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

// ============================================================================
// Frame Layout
// ============================================================================
//
// | magic "RVLS" | version u16 LE | payload length u32 LE | MessagePack payload |
//
// The header is checked before any decoding, so truncated or foreign files
// are rejected deterministically.
//
// ============================================================================

pub const LIST_STATE_MAGIC: &[u8; 4] = b"RVLS";
pub const LIST_STATE_FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4;

/// Session-independent reference to an object, tagged with its class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRef {
    pub guid: Uuid,
    pub class: ClassId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub key: PersistedRef,
    pub path: Vec<PersistedRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedList {
    pub saved_at: DateTime<Utc>,
    pub owner: PersistedRef,
    pub property: FieldRef,
    pub sorter: Option<Sorter>,
    pub filter: Option<RecordFilter>,
    pub current_index: Option<usize>,
    pub records: Vec<PersistedRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u16,
    pub payload_len: u32,
}

/// List state expressed in live object ids
#[derive(Debug, Clone, PartialEq)]
pub struct ListSnapshot {
    pub scope: OwningScope,
    pub sorter: Option<Sorter>,
    pub filter: Option<RecordFilter>,
    pub current_index: Option<usize>,
    pub items: Vec<SortItem>,
}

// ============================================================================
// Codec
// ============================================================================

fn persisted_ref<S: IdentityStore + ?Sized>(store: &S, id: ObjectId) -> Option<PersistedRef> {
    if !store.is_valid(id) {
        return None;
    }
    Some(PersistedRef {
        guid: store.guid_of(id)?,
        class: store.class_of(id)?,
    })
}

fn resolve_ref<S: IdentityStore + ?Sized>(store: &S, reference: &PersistedRef) -> Option<ObjectId> {
    let id = store.id_for_guid(&reference.guid)?;
    if !store.is_valid(id) || store.class_of(id).as_ref() != Some(&reference.class) {
        return None;
    }
    Some(id)
}

/// Encodes `snapshot`, or returns `None` when any row (or the scope owner)
/// refers to an object that is no longer valid. Partial state is never
/// written.
pub fn encode_list<S: IdentityStore + ?Sized>(
    store: &S,
    snapshot: &ListSnapshot,
) -> Result<Option<Vec<u8>>> {
    let Some(owner) = persisted_ref(store, snapshot.scope.owner) else {
        debug!(scope = %snapshot.scope, "refusing to save list state: owner is gone");
        return Ok(None);
    };

    let mut records = Vec::with_capacity(snapshot.items.len());
    for item in &snapshot.items {
        let Some(key) = persisted_ref(store, item.key) else {
            debug!(scope = %snapshot.scope, id = %item.key, "refusing to save list state: stale row");
            return Ok(None);
        };
        let mut path = Vec::with_capacity(item.path.len());
        for id in &item.path {
            let Some(reference) = persisted_ref(store, *id) else {
                debug!(scope = %snapshot.scope, id = %id, "refusing to save list state: stale path");
                return Ok(None);
            };
            path.push(reference);
        }
        records.push(PersistedRecord { key, path });
    }

    let persisted = PersistedList {
        saved_at: Utc::now(),
        owner,
        property: snapshot.scope.property.clone(),
        sorter: snapshot.sorter.clone(),
        filter: snapshot.filter.clone(),
        current_index: snapshot.current_index,
        records,
    };

    let payload = rmp_serde::to_vec_named(&persisted)
        .map_err(|e| ListError::Serialization(format!("Failed to serialize list state: {}", e)))?;
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| ListError::Serialization("List state payload too large".to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(LIST_STATE_MAGIC);
    bytes.extend_from_slice(&LIST_STATE_FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload_len.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(Some(bytes))
}

/// Validates the frame header without touching the payload
pub fn read_header(bytes: &[u8]) -> Result<FrameHeader> {
    if bytes.len() < HEADER_LEN {
        return Err(ListError::CorruptPersistedState(format!(
            "truncated header: {} bytes",
            bytes.len()
        )));
    }
    if &bytes[..4] != LIST_STATE_MAGIC {
        return Err(ListError::CorruptPersistedState("bad magic".to_string()));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != LIST_STATE_FORMAT_VERSION {
        return Err(ListError::CorruptPersistedState(format!(
            "unsupported format version {}",
            version
        )));
    }
    let payload_len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
    if bytes.len() - HEADER_LEN != payload_len as usize {
        return Err(ListError::CorruptPersistedState(format!(
            "payload length mismatch: header says {}, found {}",
            payload_len,
            bytes.len() - HEADER_LEN
        )));
    }
    Ok(FrameHeader {
        version,
        payload_len,
    })
}

/// Decodes the frame into its store-independent form
pub fn decode_frame(bytes: &[u8]) -> Result<PersistedList> {
    read_header(bytes)?;
    rmp_serde::from_slice(&bytes[HEADER_LEN..])
        .map_err(|e| ListError::CorruptPersistedState(format!("undecodable payload: {}", e)))
}

/// Restores list state, validating every reference against the live store.
///
/// Returns `None` rather than a partial list when anything is off: bad
/// framing, an unknown GUID, or a class that no longer matches.
pub fn restore_list<S: IdentityStore + ?Sized>(store: &S, bytes: &[u8]) -> Option<ListSnapshot> {
    let persisted = match decode_frame(bytes) {
        Ok(persisted) => persisted,
        Err(err) => {
            warn!(error = %err, "discarding persisted list state");
            return None;
        }
    };

    let owner = resolve_ref(store, &persisted.owner)?;
    let mut items = Vec::with_capacity(persisted.records.len());
    for (position, record) in persisted.records.iter().enumerate() {
        let Some(key) = resolve_ref(store, &record.key) else {
            warn!(position, guid = %record.key.guid, "persisted row refers to a missing object");
            return None;
        };
        let mut path = Vec::with_capacity(record.path.len());
        for reference in &record.path {
            let Some(id) = resolve_ref(store, reference) else {
                warn!(position, guid = %reference.guid, "persisted row path refers to a missing object");
                return None;
            };
            path.push(id);
        }
        items.push(SortItem::with_path(key, path));
    }

    let current_index = match persisted.current_index {
        Some(index) if index < items.len() => Some(index),
        _ if items.is_empty() => None,
        _ => Some(0),
    };

    Some(ListSnapshot {
        scope: OwningScope::new(owner, persisted.property),
        sorter: persisted.sorter,
        filter: persisted.filter,
        current_index,
        items,
    })
}

// ============================================================================
// On-disk store
// ============================================================================

/// Structured persistence key: which list (owner + field) in which role
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PersistKey {
    pub owner: Uuid,
    pub property: FieldRef,
    pub role: String,
}

impl PersistKey {
    pub fn new(owner: Uuid, property: FieldRef, role: impl Into<String>) -> Self {
        Self {
            owner,
            property,
            role: role.into(),
        }
    }

    /// Key for `scope`, or `None` if the owner has no stable identity
    pub fn for_scope<S: IdentityStore + ?Sized>(
        store: &S,
        scope: &OwningScope,
        role: &str,
    ) -> Option<Self> {
        let owner = store.guid_of(scope.owner)?;
        Some(Self::new(owner, scope.property.clone(), role))
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}.rvls",
            self.owner.simple(),
            sanitize(self.property.as_str()),
            sanitize(&self.role)
        )
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Directory of persisted list states, one file per key
#[derive(Debug, Clone)]
pub struct ListStateStore {
    dir: PathBuf,
}

impl ListStateStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| ListError::Io(format!("Failed to create list state directory: {}", e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &PersistKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Writes through a temp file in the same directory and renames it
    /// into place, so readers never observe a half-written file
    pub fn save(&self, key: &PersistKey, bytes: &[u8]) -> Result<()> {
        let mut temp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| ListError::Io(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(bytes)
            .map_err(|e| ListError::Io(format!("Failed to write list state: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| ListError::Io(format!("Failed to sync list state: {}", e)))?;
        temp.persist(self.path_for(key))
            .map_err(|e| ListError::Io(format!("Failed to rename list state: {}", e)))?;
        Ok(())
    }

    pub fn load(&self, key: &PersistKey) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)
            .map_err(|e| ListError::Io(format!("Failed to read list state: {}", e)))?;
        Ok(Some(bytes))
    }

    pub fn exists(&self, key: &PersistKey) -> bool {
        self.path_for(key).exists()
    }

    pub fn delete(&self, key: &PersistKey) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| ListError::Io(format!("Failed to delete list state: {}", e)))?;
        }
        Ok(())
    }
}
