//! Versioned, forward-tolerant snapshot codec.
//!
//! A payload is a bincode [`Frame`]: a magic tag, a format number, and a list
//! of tagged fields in ascending tag order. Every known snapshot section is
//! one field whose body is itself bincode. Decoders skip nothing: fields with
//! tags they do not know are kept in [`InventorySnapshot::extensions`] and
//! written back on the next encode, so a process running an older build can
//! relay state written by a newer one without losing data.
//!
//! Empty sections are omitted, and slot maps are written as sorted
//! `(slot, stack)` lists, so encoding the same snapshot twice yields the same
//! bytes.
mod error;

pub use error::DecodeError;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::group::{SyncGroupKey, VersionedState, WriterId};
use crate::item::{Experience, ItemStack};
use crate::snapshot::InventorySnapshot;

/// Leading bytes of every frame.
pub const MAGIC: [u8; 4] = *b"ISNP";

/// Format number written by this build.
pub const FORMAT_VERSION: u16 = 1;

// ============================================================================
// Field tags
// ============================================================================

/// Snapshot section tags.
pub mod tags {
    pub const MAIN: u16 = 1;
    pub const EQUIPMENT: u16 = 2;
    pub const ENDER_CHEST: u16 = 3;
    pub const CURSOR: u16 = 4;
    pub const EXPERIENCE: u16 = 5;
    pub const CURRENCY: u16 = 6;

    /// Versioned-state tags, disjoint from the snapshot range.
    pub const STATE_KEY: u16 = 0x100;
    pub const STATE_VERSION: u16 = 0x101;
    pub const STATE_WRITER: u16 = 0x102;
    pub const STATE_WRITTEN_AT: u16 = 0x103;
    pub const STATE_SNAPSHOT: u16 = 0x104;
}

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    magic: [u8; 4],
    format: u16,
    fields: Vec<Field>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Field {
    tag: u16,
    body: Vec<u8>,
}

// ============================================================================
// Snapshot
// ============================================================================

/// Encodes a snapshot into its wire form.
pub fn encode(snapshot: &InventorySnapshot) -> Vec<u8> {
    let mut fields: BTreeMap<u16, Vec<u8>> = BTreeMap::new();

    if !snapshot.main.is_empty() {
        fields.insert(tags::MAIN, body(&slot_list(&snapshot.main)));
    }
    if !snapshot.equipment.is_empty() {
        fields.insert(tags::EQUIPMENT, body(&slot_list(&snapshot.equipment)));
    }
    if !snapshot.ender_chest.is_empty() {
        fields.insert(tags::ENDER_CHEST, body(&slot_list(&snapshot.ender_chest)));
    }
    if let Some(cursor) = &snapshot.cursor {
        fields.insert(tags::CURSOR, body(cursor));
    }
    if let Some(experience) = &snapshot.experience {
        fields.insert(tags::EXPERIENCE, body(experience));
    }
    if let Some(currency) = &snapshot.currency {
        fields.insert(tags::CURRENCY, body(currency));
    }

    // Known sections always win over a stray extension with the same tag.
    for (tag, raw) in &snapshot.extensions {
        fields.entry(*tag).or_insert_with(|| raw.clone());
    }

    frame(fields)
}

/// Decodes a snapshot, preserving unknown fields as extensions.
pub fn decode(bytes: &[u8]) -> Result<InventorySnapshot, DecodeError> {
    let mut snapshot = InventorySnapshot::new();

    for (tag, raw) in read_frame(bytes)? {
        match tag {
            tags::MAIN => snapshot.main = slot_map(tag, &raw)?,
            tags::EQUIPMENT => snapshot.equipment = slot_map(tag, &raw)?,
            tags::ENDER_CHEST => snapshot.ender_chest = slot_map(tag, &raw)?,
            tags::CURSOR => snapshot.cursor = Some(field_body::<ItemStack>(tag, &raw)?),
            tags::EXPERIENCE => snapshot.experience = Some(field_body::<Experience>(tag, &raw)?),
            tags::CURRENCY => snapshot.currency = Some(field_body::<i64>(tag, &raw)?),
            _ => {
                snapshot.extensions.insert(tag, raw);
            }
        }
    }

    Ok(snapshot)
}

// ============================================================================
// Versioned state
// ============================================================================

/// Encodes a full versioned state; the snapshot travels as a nested frame.
pub fn encode_state(state: &VersionedState) -> Vec<u8> {
    let mut fields = BTreeMap::new();
    fields.insert(tags::STATE_KEY, body(&state.key.as_str()));
    fields.insert(tags::STATE_VERSION, body(&state.version));
    fields.insert(tags::STATE_WRITER, body(&state.writer.0));
    fields.insert(tags::STATE_WRITTEN_AT, body(&state.written_at_ms));
    fields.insert(tags::STATE_SNAPSHOT, encode(&state.snapshot));
    frame(fields)
}

/// Decodes a versioned state.
///
/// Unknown state-level tags are skipped; unknown snapshot tags survive in
/// the nested snapshot's extensions.
pub fn decode_state(bytes: &[u8]) -> Result<VersionedState, DecodeError> {
    let mut key = None;
    let mut version = None;
    let mut writer = None;
    let mut written_at_ms = 0;
    let mut snapshot = None;

    for (tag, raw) in read_frame(bytes)? {
        match tag {
            tags::STATE_KEY => key = Some(field_body::<String>(tag, &raw)?),
            tags::STATE_VERSION => version = Some(field_body::<u64>(tag, &raw)?),
            tags::STATE_WRITER => writer = Some(field_body::<String>(tag, &raw)?),
            tags::STATE_WRITTEN_AT => written_at_ms = field_body::<i64>(tag, &raw)?,
            tags::STATE_SNAPSHOT => snapshot = Some(decode(&raw)?),
            _ => {}
        }
    }

    Ok(VersionedState {
        key: SyncGroupKey::from_raw(key.ok_or(DecodeError::MissingField("key"))?),
        snapshot: snapshot.ok_or(DecodeError::MissingField("snapshot"))?,
        version: version.ok_or(DecodeError::MissingField("version"))?,
        writer: WriterId(writer.unwrap_or_default()),
        written_at_ms,
    })
}

// ============================================================================
// Frame helpers
// ============================================================================

fn body<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("field serialization should not fail")
}

fn frame(fields: BTreeMap<u16, Vec<u8>>) -> Vec<u8> {
    let frame = Frame {
        magic: MAGIC,
        format: FORMAT_VERSION,
        fields: fields
            .into_iter()
            .map(|(tag, body)| Field { tag, body })
            .collect(),
    };
    bincode::serialize(&frame).expect("frame serialization should not fail")
}

/// Reads a frame into its tagged fields, rejecting repeated tags.
fn read_frame(bytes: &[u8]) -> Result<BTreeMap<u16, Vec<u8>>, DecodeError> {
    if bytes.len() >= MAGIC.len() && bytes[..MAGIC.len()] != MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(&bytes[..MAGIC.len()]);
        return Err(DecodeError::BadMagic { found });
    }

    let frame: Frame =
        bincode::deserialize(bytes).map_err(|e| DecodeError::Frame(e.to_string()))?;

    let mut fields = BTreeMap::new();
    for Field { tag, body } in frame.fields {
        if fields.insert(tag, body).is_some() {
            return Err(DecodeError::DuplicateTag(tag));
        }
    }
    Ok(fields)
}

fn field_body<T: DeserializeOwned>(tag: u16, raw: &[u8]) -> Result<T, DecodeError> {
    bincode::deserialize(raw).map_err(|e| DecodeError::field(tag, e))
}

fn slot_list<K: Copy>(slots: &BTreeMap<K, ItemStack>) -> Vec<(K, &ItemStack)> {
    slots.iter().map(|(slot, stack)| (*slot, stack)).collect()
}

fn slot_map<K>(tag: u16, raw: &[u8]) -> Result<BTreeMap<K, ItemStack>, DecodeError>
where
    K: Ord + std::fmt::Debug + DeserializeOwned,
{
    let list: Vec<(K, ItemStack)> = field_body(tag, raw)?;
    let mut map = BTreeMap::new();
    for (slot, stack) in list {
        if map.contains_key(&slot) {
            return Err(DecodeError::DuplicateSlot {
                tag,
                slot: format!("{slot:?}"),
            });
        }
        map.insert(slot, stack);
    }
    Ok(map)
}
