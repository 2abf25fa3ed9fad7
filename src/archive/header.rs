//! USTAR header schema
//!
//! The header is an ordered list of fixed-width fields whose widths add
//! up to exactly one block. Offsets are computed at compile time.

/// Archive block unit in bytes
pub const BLOCK_SIZE: usize = 512;

/// Number of fields in a header block
pub const FIELD_COUNT: usize = 19;

/// The checksum slot is summed as eight ASCII spaces
pub const CHECKSUM_BASE: u64 = 8 * b' ' as u64;

/// How a field's value is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Raw bytes, left-justified, NUL padded
    Text,
    /// Zero-padded octal with `width - 1` digits and a trailing NUL
    Numeric,
}

/// Value used when an entry does not supply one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    /// Leave the field zeroed
    Empty,
    Text(&'static str),
    Numeric(u64),
    /// Encoding time (seconds since the epoch)
    Now,
}

/// A fixed-width header field descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderField {
    pub name: &'static str,
    pub width: usize,
    pub kind: FieldKind,
    pub default: FieldDefault,
}

impl HeaderField {
    const fn text(name: &'static str, width: usize, default: FieldDefault) -> Self {
        Self {
            name,
            width,
            kind: FieldKind::Text,
            default,
        }
    }

    const fn numeric(name: &'static str, width: usize, default: FieldDefault) -> Self {
        Self {
            name,
            width,
            kind: FieldKind::Numeric,
            default,
        }
    }
}

/// Positions of the fields the encoder writes explicitly
pub mod index {
    pub const NAME: usize = 0;
    pub const MODE: usize = 1;
    pub const SIZE: usize = 4;
    pub const MTIME: usize = 5;
    pub const CHECKSUM: usize = 6;
    pub const TYPEFLAG: usize = 7;
    pub const MAGIC: usize = 9;
    pub const VERSION: usize = 10;
}

/// Header schema in on-disk order
pub const HEADER_FIELDS: [HeaderField; FIELD_COUNT] = [
    HeaderField::text("name", 100, FieldDefault::Empty),
    HeaderField::numeric("mode", 8, FieldDefault::Numeric(0o644)),
    HeaderField::numeric("uid", 8, FieldDefault::Numeric(0)),
    HeaderField::numeric("gid", 8, FieldDefault::Numeric(0)),
    HeaderField::numeric("size", 12, FieldDefault::Numeric(0)),
    HeaderField::numeric("mtime", 12, FieldDefault::Now),
    HeaderField::numeric("checksum", 8, FieldDefault::Empty),
    HeaderField::text("typeflag", 1, FieldDefault::Text("0")),
    HeaderField::text("linkname", 100, FieldDefault::Empty),
    HeaderField::text("magic", 6, FieldDefault::Text("ustar")),
    HeaderField::text("version", 2, FieldDefault::Text("00")),
    HeaderField::text("uname", 32, FieldDefault::Empty),
    HeaderField::text("gname", 32, FieldDefault::Empty),
    HeaderField::numeric("devmajor", 8, FieldDefault::Empty),
    HeaderField::numeric("devminor", 8, FieldDefault::Empty),
    HeaderField::text("prefix", 131, FieldDefault::Empty),
    HeaderField::numeric("atime", 12, FieldDefault::Empty),
    HeaderField::numeric("ctime", 12, FieldDefault::Empty),
    HeaderField::text("padding", 12, FieldDefault::Empty),
];

/// Byte offset of each field within the header block
pub const FIELD_OFFSETS: [usize; FIELD_COUNT] = field_offsets();

const fn field_offsets() -> [usize; FIELD_COUNT] {
    let mut offsets = [0; FIELD_COUNT];
    let mut i = 1;
    while i < FIELD_COUNT {
        offsets[i] = offsets[i - 1] + HEADER_FIELDS[i - 1].width;
        i += 1;
    }
    offsets
}

const fn header_width() -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < FIELD_COUNT {
        total += HEADER_FIELDS[i].width;
        i += 1;
    }
    total
}

const _: () = assert!(header_width() == BLOCK_SIZE);

/// Look up a field and its offset by name
pub fn field(name: &str) -> Option<(usize, &'static HeaderField)> {
    HEADER_FIELDS
        .iter()
        .position(|f| f.name == name)
        .map(|i| (FIELD_OFFSETS[i], &HEADER_FIELDS[i]))
}

/// Render a number as zero-padded octal filling `width - 1` digits.
///
/// Returns `None` when the value needs more digits than the field holds.
pub fn render_octal(value: u64, width: usize) -> Option<Vec<u8>> {
    let digits = width.saturating_sub(1);
    let rendered = format!("{:0digits$o}", value, digits = digits);
    (rendered.len() <= digits).then(|| rendered.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_fill_one_block() {
        let last = FIELD_COUNT - 1;
        assert_eq!(FIELD_OFFSETS[last] + HEADER_FIELDS[last].width, BLOCK_SIZE);
    }

    #[test]
    fn standard_offsets() {
        assert_eq!(field("size").unwrap().0, 124);
        assert_eq!(field("checksum").unwrap().0, 148);
        assert_eq!(field("typeflag").unwrap().0, 156);
        assert_eq!(field("magic").unwrap().0, 257);
        assert_eq!(field("prefix").unwrap().0, 345);
        assert!(field("nonexistent").is_none());
    }

    #[test]
    fn index_constants_match_names() {
        assert_eq!(HEADER_FIELDS[index::NAME].name, "name");
        assert_eq!(HEADER_FIELDS[index::MODE].name, "mode");
        assert_eq!(HEADER_FIELDS[index::SIZE].name, "size");
        assert_eq!(HEADER_FIELDS[index::MTIME].name, "mtime");
        assert_eq!(HEADER_FIELDS[index::CHECKSUM].name, "checksum");
        assert_eq!(HEADER_FIELDS[index::TYPEFLAG].name, "typeflag");
        assert_eq!(HEADER_FIELDS[index::MAGIC].name, "magic");
        assert_eq!(HEADER_FIELDS[index::VERSION].name, "version");
    }

    #[test]
    fn octal_rendering() {
        assert_eq!(render_octal(0o644, 8).unwrap(), b"0000644");
        assert_eq!(render_octal(12, 12).unwrap(), b"00000000014");
        assert_eq!(render_octal(0, 8).unwrap(), b"0000000");
    }

    #[test]
    fn octal_overflow() {
        assert!(render_octal(0o7777777, 8).is_some());
        assert!(render_octal(0o10000000, 8).is_none());
    }
}
