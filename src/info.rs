//! Info walker (Component D): scan a container's section headers
//! without needing a partition map or any particular rank count.
//!
//! Grounded on `p4est_file_info`: the walker reads only the file
//! prelude and each section header's 64 bytes, never the payload in
//! between (it skips forward by `data_size + pad_len(data_size)`), and
//! it tolerates a file that was truncated mid-section -- a short read
//! on a section header ends the scan instead of raising a count error,
//! since `p4est_file_info` is explicitly meant to inspect a container a
//! crashed writer left in a partial state.

use tracing::instrument;

use crate::codec::{pad_len, validate_padding, BlockType, FileHeader, SectionHeader};
use crate::codec::{BYTE_DIV, FILE_HEADER_SIZE, FILE_PRELUDE_SIZE, SECTION_HEADER_SIZE};
use crate::error::{FileError, Result};
use crate::io_backend::CollectiveIo;

/// One section discovered by [`info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    pub block_type: BlockType,
    /// As stored on disk: the whole blob size for an `'H'` block, or the
    /// per-quadrant record size for an `'F'` block (multiply by the
    /// container's `global_num_quadrants` to get that section's payload
    /// length).
    pub data_size: u64,
    pub user_string: String,
    /// Absolute offset of this section's payload (just past its header).
    pub payload_offset: u64,
}

/// Summary returned by [`info`]: the file header plus every section the
/// scan could fully validate before either reaching EOF or finding a
/// section whose padding was corrupt.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub header: FileHeader,
    pub sections: Vec<SectionInfo>,
    /// Set when the scan stopped early because the file was shorter than
    /// a well-formed next section would require -- a truncated write in
    /// progress, not a format error.
    pub truncated: bool,
}

/// Walk every section in `backend` without needing to know the rank
/// count or partition map the file was written with.
#[instrument(skip(backend))]
pub fn info<B: CollectiveIo>(backend: &B) -> Result<ContainerInfo> {
    let total_len = backend.len()?;
    if total_len < FILE_PRELUDE_SIZE as u64 {
        return Err(FileError::format("file is shorter than the file prelude"));
    }

    let mut prelude = [0u8; FILE_PRELUDE_SIZE];
    let n = backend.read_at(0, &mut prelude)?;
    if n != FILE_PRELUDE_SIZE {
        return Err(FileError::count(FILE_PRELUDE_SIZE, n));
    }
    let header = FileHeader::decode(&prelude[..FILE_HEADER_SIZE])?;
    validate_padding(&prelude[FILE_HEADER_SIZE..], FILE_HEADER_SIZE, BYTE_DIV)?;

    let mut sections = Vec::new();
    let mut offset = FILE_PRELUDE_SIZE as u64;
    let mut truncated = false;

    loop {
        if offset == total_len {
            break;
        }
        if offset + SECTION_HEADER_SIZE as u64 > total_len {
            truncated = true;
            break;
        }
        let mut header_buf = [0u8; SECTION_HEADER_SIZE];
        backend.read_at(offset, &mut header_buf)?;
        let section_header = match SectionHeader::decode(&header_buf) {
            Ok(h) => h,
            Err(_) => {
                truncated = true;
                break;
            }
        };

        // For an 'H' block data_size already is the payload length; for
        // an 'F' block it is the per-quadrant record size, so the
        // payload spans N_global times that (mirrors read_block_metadata
        // picking data_block_size = read_data_size * global_num_quadrants
        // for a field block).
        let payload_len = match section_header.block_type {
            BlockType::Header => section_header.data_size,
            BlockType::Field => section_header.data_size * header.global_num_quadrants as u64,
        };

        let payload_offset = offset + SECTION_HEADER_SIZE as u64;
        let pad = pad_len(payload_len as usize, BYTE_DIV);
        let section_total = payload_offset + payload_len + pad as u64;
        if section_total > total_len {
            truncated = true;
            break;
        }

        let mut padding = vec![0u8; pad];
        let n = backend.read_at(payload_offset + payload_len, &mut padding)?;
        if n != pad || validate_padding(&padding, payload_len as usize, BYTE_DIV).is_err() {
            truncated = true;
            break;
        }

        sections.push(SectionInfo {
            block_type: section_header.block_type,
            data_size: section_header.data_size,
            user_string: section_header.user_string,
            payload_offset,
        });
        offset = section_total;
    }

    Ok(ContainerInfo {
        header,
        sections,
        truncated,
    })
}
