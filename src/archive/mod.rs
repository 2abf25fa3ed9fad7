//! Build context encoding
//!
//! Encodes a handful of named blobs into a minimal USTAR-style archive
//! that the container daemon accepts as a build context. Only regular
//! files are supported.
//!
//! # Layout
//!
//! | Part | Size |
//! |------|------|
//! | Header | one block |
//! | Data | `len` bytes, zero padded to the next block |
//!
//! Entries follow each other without separators. The two zero blocks
//! that mark the end of a strict tar stream are only written when
//! [`ArchiveEncoder::with_end_marker`] is enabled.

pub mod header;

use crate::archive::header::{
    index, render_octal, FieldDefault, FieldKind, HeaderField, BLOCK_SIZE, CHECKSUM_BASE,
    FIELD_OFFSETS, HEADER_FIELDS,
};
use std::borrow::Cow;
use thiserror::Error;

/// Errors raised while encoding an archive
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("value for header field '{field}' does not fit in {width} bytes")]
    FieldOverflow { field: &'static str, width: usize },

    #[error("archive entry has an empty name")]
    EmptyName,
}

/// A named blob stored in the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// File name inside the build context
    pub name: String,
    /// File contents
    pub data: Vec<u8>,
    /// Permission bits; the schema default applies when unset
    pub mode: Option<u32>,
}

impl ArchiveEntry {
    /// Create a regular file entry
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            mode: None,
        }
    }

    /// Override the permission bits
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Number of blocks this entry occupies (header + padded data)
    pub fn block_count(&self) -> usize {
        self.data.len().div_ceil(BLOCK_SIZE) + 1
    }
}

/// Encoder for the build context archive
#[derive(Debug, Clone, Default)]
pub struct ArchiveEncoder {
    mtime: Option<u64>,
    end_marker: bool,
}

impl ArchiveEncoder {
    /// Create an encoder stamping entries with the current time
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed modification time instead of the current time
    pub fn with_mtime(mut self, secs: u64) -> Self {
        self.mtime = Some(secs);
        self
    }

    /// Append the two zero blocks strict tar readers expect
    pub fn with_end_marker(mut self, enabled: bool) -> Self {
        self.end_marker = enabled;
        self
    }

    /// Size of the encoded archive for `entries`
    pub fn encoded_len(&self, entries: &[ArchiveEntry]) -> usize {
        let blocks: usize = entries.iter().map(ArchiveEntry::block_count).sum();
        let trailer = if self.end_marker { 2 } else { 0 };
        (blocks + trailer) * BLOCK_SIZE
    }

    /// Encode `entries` in order into a single buffer
    pub fn encode(&self, entries: &[ArchiveEntry]) -> Result<Vec<u8>, ArchiveError> {
        let mtime = self.mtime.unwrap_or_else(now);
        let mut buf = vec![0u8; self.encoded_len(entries)];

        let mut offset = 0;
        for entry in entries {
            write_header(&mut buf[offset..offset + BLOCK_SIZE], entry, mtime)?;

            let data_start = offset + BLOCK_SIZE;
            buf[data_start..data_start + entry.data.len()].copy_from_slice(&entry.data);

            offset += entry.block_count() * BLOCK_SIZE;
        }

        Ok(buf)
    }
}

fn now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Write one header block. `block` must be zeroed and `BLOCK_SIZE` long.
fn write_header(block: &mut [u8], entry: &ArchiveEntry, mtime: u64) -> Result<(), ArchiveError> {
    if entry.name.is_empty() {
        return Err(ArchiveError::EmptyName);
    }

    let mut checksum = CHECKSUM_BASE;

    for (i, field) in HEADER_FIELDS.iter().enumerate() {
        if i == index::CHECKSUM {
            continue;
        }
        let Some(value) = field_value(i, field, entry, mtime)? else {
            continue;
        };
        checksum += value.iter().map(|b| u64::from(*b)).sum::<u64>();
        write_field(block, i, &value)?;
    }

    let checksum_field = &HEADER_FIELDS[index::CHECKSUM];
    let rendered = render_numeric(checksum_field, checksum)?;
    write_field(block, index::CHECKSUM, &rendered)
}

/// Resolve the bytes for field `i`: entry value first, then the schema default
fn field_value<'a>(
    i: usize,
    field: &HeaderField,
    entry: &'a ArchiveEntry,
    mtime: u64,
) -> Result<Option<Cow<'a, [u8]>>, ArchiveError> {
    let numeric = match i {
        index::NAME => return Ok(Some(Cow::Borrowed(entry.name.as_bytes()))),
        index::SIZE => Some(entry.data.len() as u64),
        index::MODE => entry.mode.map(u64::from),
        _ => None,
    };
    if let Some(value) = numeric {
        return render_numeric(field, value).map(|v| Some(Cow::Owned(v)));
    }

    match field.default {
        FieldDefault::Empty => Ok(None),
        FieldDefault::Text(s) => Ok(Some(Cow::Borrowed(s.as_bytes()))),
        FieldDefault::Numeric(n) => render_numeric(field, n).map(|v| Some(Cow::Owned(v))),
        FieldDefault::Now => render_numeric(field, mtime).map(|v| Some(Cow::Owned(v))),
    }
}

fn render_numeric(field: &HeaderField, value: u64) -> Result<Vec<u8>, ArchiveError> {
    debug_assert_eq!(field.kind, FieldKind::Numeric);
    render_octal(value, field.width).ok_or(ArchiveError::FieldOverflow {
        field: field.name,
        width: field.width,
    })
}

fn write_field(block: &mut [u8], i: usize, value: &[u8]) -> Result<(), ArchiveError> {
    let field = &HEADER_FIELDS[i];
    if value.len() > field.width {
        return Err(ArchiveError::FieldOverflow {
            field: field.name,
            width: field.width,
        });
    }
    let start = FIELD_OFFSETS[i];
    block[start..start + value.len()].copy_from_slice(value);
    Ok(())
}
