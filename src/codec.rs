//! Padding and metadata codec (Component A).
//!
//! Every object written to the container -- the file header, a section
//! header, and the payload that follows a section header -- is padded
//! out to a multiple of [`BYTE_DIV`] bytes using the same `'\n'`-framed
//! filler, and every fixed-width ASCII field in the file uses the widths
//! below.
//!
//! ```text
//! file header (64 bytes)            file prelude padding (16 bytes)
//! +----------------------------+    +------------------------------+
//! | magic      7   + \n        |    | \n  <14 spaces>  \n           |
//! | version    23  + \n        |    +------------------------------+
//! | user_string 15 + \n        |
//! | N_global   16  (no \n)     |
//! +----------------------------+
//!
//! section header (64 bytes)
//! +----------------------------+
//! | 'H'/'F' ' ' data_size(13)\n|
//! | user_string 47 + \n        |
//! +----------------------------+
//! ```
//!
//! The file-header widths above reconcile the 64-byte total that the
//! container format commits to everywhere else (prelude = header + 16
//! bytes of padding, every absolute section offset is computed against
//! an 80-byte prelude). See `DESIGN.md` for the resolution of the
//! apparent 47-byte-user-string inconsistency between that total and a
//! differently-scoped reading of the original sources: the 47-byte user
//! string belongs to the *section* header, not the file header.

use crate::error::FileError;

/// Bytes between consecutive padded objects must be a multiple of this.
pub const BYTE_DIV: usize = 16;
/// `pad_len` never returns less than this.
pub const MIN_PAD: usize = 2;
/// `pad_len` never returns more than this.
pub const MAX_PAD: usize = BYTE_DIV + 1;

pub const FILE_HEADER_SIZE: usize = 64;
pub const FILE_PRELUDE_PAD: usize = 16;
pub const FILE_PRELUDE_SIZE: usize = FILE_HEADER_SIZE + FILE_PRELUDE_PAD;

pub const FILE_MAGIC_LEN: usize = 7;
pub const FILE_VERSION_LEN: usize = 23;
pub const FILE_USER_STRING_LEN: usize = 15;
pub const FILE_NGLOBAL_LEN: usize = 16;

pub const SECTION_HEADER_SIZE: usize = 64;
pub const SECTION_USER_STRING_LEN: usize = 47;
pub const SECTION_DATASIZE_LEN: usize = 13;

/// The magic cookie for a 2-D forest container.
pub const MAGIC_2D: &str = "p4data0";
/// The magic cookie for a 3-D forest container.
pub const MAGIC_3D: &str = "p8data0";

/// The number of spatial dimensions a container was written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    Two,
    Three,
}

impl Dim {
    pub fn magic(self) -> &'static str {
        match self {
            Dim::Two => MAGIC_2D,
            Dim::Three => MAGIC_3D,
        }
    }

    pub fn from_magic(magic: &str) -> Result<Self, FileError> {
        match magic {
            MAGIC_2D => Ok(Dim::Two),
            MAGIC_3D => Ok(Dim::Three),
            other => Err(FileError::format(format!("unrecognized magic cookie {other:?}"))),
        }
    }
}

/// Length of the padding that must follow an object of `n` bytes so the
/// next object starts on a `divisor`-byte boundary, folding the
/// degenerate `0`/`1`-byte cases up by one full period so that every
/// padding region can always hold at least a leading and trailing
/// `'\n'` (mirrors `get_padding_string` in the original implementation).
pub fn pad_len(n: usize, divisor: usize) -> usize {
    let rem = n % divisor;
    let mut pad = if rem == 0 { 0 } else { divisor - rem };
    if pad == 0 || pad == 1 {
        pad += divisor;
    }
    pad
}

/// Build the padding byte string for `n` bytes of preceding content:
/// `'\n'`, then `pad - 2` spaces, then `'\n'`.
pub fn pad_bytes(n: usize, divisor: usize) -> Vec<u8> {
    let pad = pad_len(n, divisor);
    let mut out = Vec::with_capacity(pad);
    out.push(b'\n');
    out.extend(std::iter::repeat(b' ').take(pad - 2));
    out.push(b'\n');
    out
}

/// Validate a padding region read back from disk: it must be bracketed
/// by `'\n'` and hold only spaces in between, and its length must be
/// what `pad_len` would have produced for `preceding_len`.
pub fn validate_padding(buf: &[u8], preceding_len: usize, divisor: usize) -> Result<(), FileError> {
    let expected = pad_len(preceding_len, divisor);
    if buf.len() != expected {
        return Err(FileError::format(format!(
            "padding region has {} bytes, expected {expected}",
            buf.len()
        )));
    }
    if buf.first() != Some(&b'\n') || buf.last() != Some(&b'\n') {
        return Err(FileError::format("padding region not bracketed by newlines"));
    }
    if buf[1..buf.len() - 1].iter().any(|&b| b != b' ') {
        return Err(FileError::format("padding region contains non-space filler"));
    }
    Ok(())
}

fn left_justify(s: &str, width: usize) -> Result<Vec<u8>, FileError> {
    if s.len() > width {
        return Err(FileError::format(format!(
            "field {s:?} exceeds {width}-byte width"
        )));
    }
    let mut out = vec![b' '; width];
    out[..s.len()].copy_from_slice(s.as_bytes());
    Ok(out)
}

fn strip_trailing_spaces(buf: &[u8]) -> &[u8] {
    let end = buf.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    &buf[..end]
}

/// The fixed-width ASCII prelude that opens every container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub dim: Dim,
    pub version: String,
    pub user_string: String,
    pub global_num_quadrants: i64,
}

impl FileHeader {
    pub fn encode(&self) -> Result<[u8; FILE_HEADER_SIZE], FileError> {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        let mut cursor = 0;

        let magic = self.dim.magic();
        buf[cursor..cursor + FILE_MAGIC_LEN].copy_from_slice(magic.as_bytes());
        cursor += FILE_MAGIC_LEN;
        buf[cursor] = b'\n';
        cursor += 1;

        let version = left_justify(&self.version, FILE_VERSION_LEN)?;
        buf[cursor..cursor + FILE_VERSION_LEN].copy_from_slice(&version);
        cursor += FILE_VERSION_LEN;
        buf[cursor] = b'\n';
        cursor += 1;

        let user = left_justify(&self.user_string, FILE_USER_STRING_LEN)?;
        buf[cursor..cursor + FILE_USER_STRING_LEN].copy_from_slice(&user);
        cursor += FILE_USER_STRING_LEN;
        buf[cursor] = b'\n';
        cursor += 1;

        let n_global = format!("{:0width$}", self.global_num_quadrants, width = FILE_NGLOBAL_LEN);
        if n_global.len() != FILE_NGLOBAL_LEN {
            return Err(FileError::format("global_num_quadrants does not fit in 16 decimal digits"));
        }
        buf[cursor..cursor + FILE_NGLOBAL_LEN].copy_from_slice(n_global.as_bytes());
        cursor += FILE_NGLOBAL_LEN;

        debug_assert_eq!(cursor, FILE_HEADER_SIZE);
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FileError> {
        if buf.len() != FILE_HEADER_SIZE {
            return Err(FileError::format(format!(
                "file header must be {FILE_HEADER_SIZE} bytes, got {}",
                buf.len()
            )));
        }
        let mut cursor = 0;

        let magic_line = &buf[cursor..cursor + FILE_MAGIC_LEN];
        cursor += FILE_MAGIC_LEN;
        if buf[cursor] != b'\n' {
            return Err(FileError::format("file header: magic line not newline-terminated"));
        }
        cursor += 1;
        let magic = std::str::from_utf8(magic_line)
            .map_err(|_| FileError::format("file header magic is not valid UTF-8"))?;
        let dim = Dim::from_magic(magic)?;

        let version_field = &buf[cursor..cursor + FILE_VERSION_LEN];
        cursor += FILE_VERSION_LEN;
        if buf[cursor] != b'\n' {
            return Err(FileError::format("file header: version line not newline-terminated"));
        }
        cursor += 1;
        let version = String::from_utf8_lossy(strip_trailing_spaces(version_field)).into_owned();

        let user_field = &buf[cursor..cursor + FILE_USER_STRING_LEN];
        cursor += FILE_USER_STRING_LEN;
        if buf[cursor] != b'\n' {
            return Err(FileError::format("file header: user string line not newline-terminated"));
        }
        cursor += 1;
        let user_string = String::from_utf8_lossy(strip_trailing_spaces(user_field)).into_owned();

        let n_global_field = &buf[cursor..cursor + FILE_NGLOBAL_LEN];
        cursor += FILE_NGLOBAL_LEN;
        let n_global_str = std::str::from_utf8(n_global_field)
            .map_err(|_| FileError::format("file header N_global is not valid UTF-8"))?;
        let global_num_quadrants: i64 = n_global_str
            .parse()
            .map_err(|_| FileError::format(format!("file header N_global {n_global_str:?} is not a decimal integer")))?;

        debug_assert_eq!(cursor, FILE_HEADER_SIZE);
        Ok(FileHeader {
            dim,
            version,
            user_string,
            global_num_quadrants,
        })
    }
}

/// Discriminant byte that opens every section header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Header,
    Field,
}

impl BlockType {
    fn as_byte(self) -> u8 {
        match self {
            BlockType::Header => b'H',
            BlockType::Field => b'F',
        }
    }

    fn from_byte(b: u8) -> Result<Self, FileError> {
        match b {
            b'H' => Ok(BlockType::Header),
            b'F' => Ok(BlockType::Field),
            other => Err(FileError::format(format!(
                "unrecognized section block type {:?}",
                other as char
            ))),
        }
    }
}

/// The 64-byte metadata block that precedes every header-block and
/// field-block payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub block_type: BlockType,
    pub data_size: u64,
    pub user_string: String,
}

impl SectionHeader {
    pub fn encode(&self) -> Result<[u8; SECTION_HEADER_SIZE], FileError> {
        let mut buf = [0u8; SECTION_HEADER_SIZE];
        let mut cursor = 0;

        buf[cursor] = self.block_type.as_byte();
        cursor += 1;
        buf[cursor] = b' ';
        cursor += 1;

        let size_str = format!("{:0width$}", self.data_size, width = SECTION_DATASIZE_LEN);
        if size_str.len() != SECTION_DATASIZE_LEN {
            return Err(FileError::format("data_size does not fit in 13 decimal digits"));
        }
        buf[cursor..cursor + SECTION_DATASIZE_LEN].copy_from_slice(size_str.as_bytes());
        cursor += SECTION_DATASIZE_LEN;
        buf[cursor] = b'\n';
        cursor += 1;

        let user = left_justify(&self.user_string, SECTION_USER_STRING_LEN)?;
        buf[cursor..cursor + SECTION_USER_STRING_LEN].copy_from_slice(&user);
        cursor += SECTION_USER_STRING_LEN;
        buf[cursor] = b'\n';
        cursor += 1;

        debug_assert_eq!(cursor, SECTION_HEADER_SIZE);
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FileError> {
        if buf.len() != SECTION_HEADER_SIZE {
            return Err(FileError::format(format!(
                "section header must be {SECTION_HEADER_SIZE} bytes, got {}",
                buf.len()
            )));
        }
        let block_type = BlockType::from_byte(buf[0])?;
        if buf[1] != b' ' {
            return Err(FileError::format("section header: missing separator space"));
        }
        let mut cursor = 2;
        let size_field = &buf[cursor..cursor + SECTION_DATASIZE_LEN];
        cursor += SECTION_DATASIZE_LEN;
        if buf[cursor] != b'\n' {
            return Err(FileError::format("section header: data_size line not newline-terminated"));
        }
        cursor += 1;
        let size_str = std::str::from_utf8(size_field)
            .map_err(|_| FileError::format("section header data_size is not valid UTF-8"))?;
        let data_size: u64 = size_str
            .parse()
            .map_err(|_| FileError::format(format!("section header data_size {size_str:?} is not a decimal integer")))?;

        let user_field = &buf[cursor..cursor + SECTION_USER_STRING_LEN];
        cursor += SECTION_USER_STRING_LEN;
        if buf[cursor] != b'\n' {
            return Err(FileError::format("section header: user string line not newline-terminated"));
        }
        cursor += 1;
        let user_string = String::from_utf8_lossy(strip_trailing_spaces(user_field)).into_owned();

        debug_assert_eq!(cursor, SECTION_HEADER_SIZE);
        Ok(SectionHeader {
            block_type,
            data_size,
            user_string,
        })
    }
}
