//! Portable slot storage appended after the executable image.
//!
//! Executable formats other than PE have no writable resource section, so
//! the slots are kept in a table written after the last byte of the image.
//! Loaders ignore trailing bytes, so the program still runs.
//!
//! The trailer layout is:
//! - Table: 2 bytes slot count (big-endian u16), then per slot
//!   2 bytes id (big-endian u16), 4 bytes length (big-endian u32), payload
//! - Footer: 8 bytes table length (big-endian u64), 1 byte format version,
//!   4 bytes magic ("UPRS")
//!
//! A file without the magic at its end simply has no slots.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::ResourceError;
use crate::store::ResourceStore;

/// Magic bytes terminating a slot table.
const TABLE_MAGIC: &[u8; 4] = b"UPRS";

/// Current table format version.
const TABLE_VERSION: u8 = 1;

/// Footer length: table length (8) + version (1) + magic (4).
const FOOTER_LEN: u64 = 13;

/// Slot store that keeps its table at the end of the file.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppendedResourceStore;

impl AppendedResourceStore {
    pub fn new() -> Self {
        Self
    }

    /// List the slot ids present in `executable`.
    pub fn slots(&self, executable: &Path) -> Result<Vec<u16>, ResourceError> {
        let mut file = File::open(executable).map_err(|e| ResourceError::file_access(executable, e))?;
        let table = read_table(&mut file, executable)?;
        Ok(table.slots.keys().copied().collect())
    }
}

impl ResourceStore for AppendedResourceStore {
    fn read_slot(&self, executable: &Path, slot: u16) -> Result<Option<Vec<u8>>, ResourceError> {
        let mut file = File::open(executable).map_err(|e| ResourceError::file_access(executable, e))?;
        let mut table = read_table(&mut file, executable)?;
        Ok(table.slots.remove(&slot))
    }

    fn write_slot(&self, executable: &Path, slot: u16, data: &[u8]) -> Result<(), ResourceError> {
        if data.len() > u32::MAX as usize {
            return Err(ResourceError::update_failed(
                executable,
                format!("payload of {} bytes does not fit a slot", data.len()),
            ));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(executable)
            .map_err(|e| ResourceError::file_access(executable, e))?;

        let mut table = read_table(&mut file, executable)?;
        table.slots.insert(slot, data.to_vec());
        let encoded = encode_table(&table.slots);

        commit(&mut file, table.image_len, &encoded)
            .map_err(|e| ResourceError::update_failed(executable, e.to_string()))?;

        info!(
            "Wrote slot {} ({} bytes) to {:?}",
            slot,
            data.len(),
            executable
        );
        Ok(())
    }
}

/// Slot table read from a file, with the length of the image preceding it.
struct SlotTable {
    image_len: u64,
    slots: BTreeMap<u16, Vec<u8>>,
}

fn read_table(file: &mut File, path: &Path) -> Result<SlotTable, ResourceError> {
    let file_len = file.metadata()?.len();
    let empty = SlotTable {
        image_len: file_len,
        slots: BTreeMap::new(),
    };

    if file_len < FOOTER_LEN {
        return Ok(empty);
    }

    let mut footer = [0u8; FOOTER_LEN as usize];
    file.seek(SeekFrom::Start(file_len - FOOTER_LEN))?;
    file.read_exact(&mut footer)?;

    if &footer[9..13] != TABLE_MAGIC {
        return Ok(empty);
    }

    let corrupt = |reason: String| ResourceError::CorruptTable {
        path: path.to_path_buf(),
        reason,
    };

    let version = footer[8];
    if version != TABLE_VERSION {
        return Err(corrupt(format!("unsupported table version {}", version)));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&footer[0..8]);
    let table_len = u64::from_be_bytes(len_bytes);
    if table_len > file_len - FOOTER_LEN {
        return Err(corrupt(format!(
            "table length {} exceeds file length {}",
            table_len, file_len
        )));
    }

    let image_len = file_len - FOOTER_LEN - table_len;
    let mut raw = vec![0u8; table_len as usize];
    file.seek(SeekFrom::Start(image_len))?;
    file.read_exact(&mut raw)?;

    let slots = decode_table(&raw).map_err(corrupt)?;
    debug!("Found {} slots in {:?}", slots.len(), path);

    Ok(SlotTable { image_len, slots })
}

fn decode_table(raw: &[u8]) -> Result<BTreeMap<u16, Vec<u8>>, String> {
    let mut cursor = std::io::Cursor::new(raw);
    let count = read_u16(&mut cursor)?;
    let mut slots = BTreeMap::new();

    for _ in 0..count {
        let id = read_u16(&mut cursor)?;
        let len = read_u32(&mut cursor)? as usize;
        let remaining = raw.len() - cursor.position() as usize;
        if len > remaining {
            return Err(format!("slot {} truncated", id));
        }
        let mut data = vec![0u8; len];
        cursor
            .read_exact(&mut data)
            .map_err(|_| format!("slot {} truncated", id))?;
        slots.insert(id, data);
    }

    if cursor.position() as usize != raw.len() {
        return Err("trailing bytes after last slot".to_string());
    }

    Ok(slots)
}

fn encode_table(slots: &BTreeMap<u16, Vec<u8>>) -> Vec<u8> {
    let payload: usize = slots.values().map(|data| 6 + data.len()).sum();
    let mut table = Vec::with_capacity(2 + payload + FOOTER_LEN as usize);

    table.extend_from_slice(&(slots.len() as u16).to_be_bytes());
    for (id, data) in slots {
        table.extend_from_slice(&id.to_be_bytes());
        table.extend_from_slice(&(data.len() as u32).to_be_bytes());
        table.extend_from_slice(data);
    }

    let table_len = table.len() as u64;
    table.extend_from_slice(&table_len.to_be_bytes());
    table.push(TABLE_VERSION);
    table.extend_from_slice(TABLE_MAGIC);
    table
}

fn commit(file: &mut File, image_len: u64, encoded: &[u8]) -> std::io::Result<()> {
    file.set_len(image_len)?;
    file.seek(SeekFrom::Start(image_len))?;
    file.write_all(encoded)?;
    file.sync_all()
}

fn read_u16(cursor: &mut std::io::Cursor<&[u8]>) -> Result<u16, String> {
    let mut buf = [0u8; 2];
    cursor.read_exact(&mut buf).map_err(|e| short_read(e, "u16"))?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32(cursor: &mut std::io::Cursor<&[u8]>) -> Result<u32, String> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf).map_err(|e| short_read(e, "u32"))?;
    Ok(u32::from_be_bytes(buf))
}

fn short_read(err: std::io::Error, what: &str) -> String {
    if err.kind() == ErrorKind::UnexpectedEof {
        format!("table ends inside a {}", what)
    } else {
        err.to_string()
    }
}
