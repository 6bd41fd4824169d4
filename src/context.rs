//! File context and section engine (Component C): the open/write/read/
//! close state machine and the absolute-offset bookkeeping ("accumulator
//! algebra") that lets every section be located without reading any
//! section that precedes it.
//!
//! Grounded on the `p4est_file_context` struct and
//! `p4est_file_open_create` / `p4est_file_write_header` /
//! `p4est_file_write_field` / `p4est_file_read_header` /
//! `p4est_file_read_field_ext` / `p4est_file_close`: the file prelude is
//! written once by rank 0 and broadcast-checked, every subsequent
//! section header is written by rank 0 alone (header blocks are never
//! partitioned), every field block's payload is written collectively
//! with each rank computing its own byte offset from the partition map,
//! and every object -- prelude, section header, payload -- is trailed
//! by `'\n'`-framed padding to the next 16-byte boundary.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::codec::{BlockType, Dim, FileHeader, SectionHeader, FILE_PRELUDE_SIZE, SECTION_HEADER_SIZE};
use crate::codec::{pad_bytes, pad_len, validate_padding, BYTE_DIV};
use crate::comm::Communicator;
use crate::error::{FileError, Result};
use crate::io_backend::CollectiveIo;
use crate::partition::Partition;

/// What a `FileContext` may currently be used for. Mirrors the implicit
/// state machine `p4est_file_context` enforces by checking its fields
/// and returning an error on misuse (e.g. reading from a context opened
/// for writing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Write,
    Read,
    Closed,
    Faulted,
}

/// A collectively-opened container. One context exists per simulated
/// rank group (not per rank); every write/read call fans out across all
/// ranks internally via its [`Communicator`].
pub struct FileContext<B: CollectiveIo> {
    backend: Arc<B>,
    comm: Communicator,
    mode: Mode,
    dim: Dim,
    gfq: Partition,
    /// Bytes written/read after the 80-byte prelude; the next section
    /// header starts at `FILE_PRELUDE_SIZE + accessed_bytes`.
    accessed_bytes: u64,
    num_calls: u64,
}

impl<B: CollectiveIo> FileContext<B> {
    /// Rank 0 writes the file prelude (header + padding); every rank
    /// observes the same collective success/failure.
    #[instrument(skip(comm, backend, gfq))]
    pub fn open_create(
        comm: Communicator,
        backend: B,
        dim: Dim,
        version: impl Into<String>,
        user_string: impl Into<String>,
        gfq: Partition,
    ) -> Result<Self> {
        gfq.validate(comm.size())?;
        let backend = Arc::new(backend);
        let header = FileHeader {
            dim,
            version: version.into(),
            user_string: user_string.into(),
            global_num_quadrants: gfq.global_num_quadrants(),
        };
        let encoded = header.encode()?;
        let padding = pad_bytes(encoded.len(), BYTE_DIV);

        comm.collective_check(|rank| -> Result<()> {
            if rank == comm.rank_zero() {
                backend.set_len(0)?;
                backend.write_at(0, &encoded)?;
                backend.write_at(encoded.len() as u64, &padding)?;
            }
            Ok(())
        })?;

        debug!(dim = ?dim, ranks = comm.size(), "opened container for writing");
        Ok(FileContext {
            backend,
            comm,
            mode: Mode::Write,
            dim,
            gfq,
            accessed_bytes: 0,
            num_calls: 0,
        })
    }

    /// Every rank reads and validates the same file prelude. If `gfq` is
    /// `None`, a uniform partition map is synthesized from the header's
    /// `N_global` and owned by the resulting context (mirrors
    /// `p4est_file_open_read_ext` building a guessed partition when the
    /// caller passes no forest to borrow one from).
    #[instrument(skip(comm, backend, gfq))]
    pub fn open_read(comm: Communicator, backend: B, gfq: Option<Partition>) -> Result<(Self, FileHeader)> {
        let backend = Arc::new(backend);
        let mut buf = [0u8; FILE_PRELUDE_SIZE];
        let results = comm.collective_check(|_rank| -> Result<[u8; FILE_PRELUDE_SIZE]> {
            let mut local = [0u8; FILE_PRELUDE_SIZE];
            let n = backend.read_at(0, &mut local)?;
            if n != FILE_PRELUDE_SIZE {
                return Err(FileError::count(FILE_PRELUDE_SIZE, n));
            }
            Ok(local)
        })?;
        buf.copy_from_slice(&results[comm.rank_zero()]);

        let header = FileHeader::decode(&buf[..crate::codec::FILE_HEADER_SIZE])?;
        validate_padding(&buf[crate::codec::FILE_HEADER_SIZE..], crate::codec::FILE_HEADER_SIZE, BYTE_DIV)?;

        let gfq = match gfq {
            Some(gfq) => {
                gfq.validate(comm.size())?;
                if gfq.global_num_quadrants() != header.global_num_quadrants {
                    return Err(FileError::invariant(
                        "supplied partition map disagrees with file header's N_global",
                    ));
                }
                gfq
            }
            None => Partition::uniform(comm.size(), header.global_num_quadrants),
        };

        debug!(dim = ?header.dim, n_global = header.global_num_quadrants, "opened container for reading");
        Ok((
            FileContext {
                backend,
                comm,
                mode: Mode::Read,
                dim: header.dim,
                gfq,
                accessed_bytes: 0,
                num_calls: 0,
            },
            header,
        ))
    }

    fn require_mode(&self, expected: Mode) -> Result<()> {
        if self.mode != expected {
            return Err(FileError::invariant(format!(
                "operation requires mode {expected:?}, context is in {:?}",
                self.mode
            )));
        }
        Ok(())
    }

    fn section_offset(&self) -> u64 {
        FILE_PRELUDE_SIZE as u64 + self.accessed_bytes
    }

    /// Write an unpartitioned `'H'` block: one section header plus
    /// `data`, rank 0 only (header blocks carry forest-wide metadata,
    /// not per-rank data, so there is nothing to partition).
    ///
    /// `data.is_empty()` is a no-op success that does not touch the file
    /// or advance the cursor (mirrors `p4est_file_write_header`'s
    /// `header_size == 0` early return).
    pub fn write_header(&mut self, data: &[u8], user_string: impl Into<String>) -> Result<()> {
        self.require_mode(Mode::Write)?;
        if data.is_empty() {
            return Ok(());
        }
        let header = SectionHeader {
            block_type: BlockType::Header,
            data_size: data.len() as u64,
            user_string: user_string.into(),
        };
        let encoded = header.encode()?;
        let payload_padding = pad_bytes(data.len(), BYTE_DIV);
        let offset = self.section_offset();

        let backend = self.backend.clone();
        self.comm.collective_check(|rank| -> Result<()> {
            if rank == 0 {
                backend.write_at(offset, &encoded)?;
                backend.write_at(offset + SECTION_HEADER_SIZE as u64, data)?;
                backend.write_at(offset + SECTION_HEADER_SIZE as u64 + data.len() as u64, &payload_padding)?;
            }
            Ok(())
        })?;

        self.accessed_bytes += SECTION_HEADER_SIZE as u64 + data.len() as u64 + payload_padding.len() as u64;
        self.num_calls += 1;
        Ok(())
    }

    /// Read the next `'H'` block in file order. Returns the section's
    /// user string alongside the payload.
    ///
    /// `expected_size`, when given, must equal the section's stored
    /// `data_size` or the read fails as a format error (mirrors
    /// `read_block_metadata`'s size check, which only runs when the
    /// caller asked for the user string -- i.e. wants the real data,
    /// not just to skip past it).
    pub fn read_header(&mut self, expected_size: Option<u64>) -> Result<(String, Vec<u8>)> {
        self.require_mode(Mode::Read)?;
        let offset = self.section_offset();
        let backend = self.backend.clone();

        let mut header_buf = [0u8; SECTION_HEADER_SIZE];
        let n = backend.read_at(offset, &mut header_buf)?;
        if n != SECTION_HEADER_SIZE {
            return Err(FileError::count(SECTION_HEADER_SIZE, n));
        }
        let header = SectionHeader::decode(&header_buf)?;
        if header.block_type != BlockType::Header {
            return Err(FileError::format("expected an 'H' block at this position"));
        }
        if let Some(expected) = expected_size {
            if header.data_size != expected {
                return Err(FileError::format(format!(
                    "header section data_size {} disagrees with caller's {expected}",
                    header.data_size
                )));
            }
        }

        let data_offset = offset + SECTION_HEADER_SIZE as u64;
        let pad_len_bytes = pad_len(header.data_size as usize, BYTE_DIV);
        let advance = SECTION_HEADER_SIZE as u64 + header.data_size + pad_len_bytes as u64;

        // Padding is still verified on the skip path (read_block_metadata
        // checks it unconditionally); only the payload bytes themselves,
        // and the size-equality check, are skipped.
        let mut padding = vec![0u8; pad_len_bytes];
        let n = backend.read_at(data_offset + header.data_size, &mut padding)?;
        if n != pad_len_bytes {
            return Err(FileError::count(pad_len_bytes, n));
        }
        validate_padding(&padding, header.data_size as usize, BYTE_DIV)?;

        if expected_size.is_none() {
            self.accessed_bytes += advance;
            self.num_calls += 1;
            return Ok((header.user_string, Vec::new()));
        }

        let mut data = vec![0u8; header.data_size as usize];
        let n = backend.read_at(data_offset, &mut data)?;
        if n != data.len() {
            return Err(FileError::count(data.len(), n));
        }

        self.accessed_bytes += advance;
        self.num_calls += 1;
        Ok((header.user_string, data))
    }

    /// Write a collective `'F'` block: rank 0 writes the section header,
    /// then every rank writes its own slice of `per_rank_data[rank]` at
    /// the offset its partition-map entry implies, and rank 0 writes the
    /// trailing padding once every rank's slice has landed.
    ///
    /// `per_rank_data` must hold exactly one slice per simulated rank
    /// (`per_rank_data.len() == comm.size()`), each sized
    /// `gfq.count_for_rank(rank) * elem_size`: this in-process simulation
    /// has no real per-process transport to gather other ranks' buffers
    /// from at call time, so the caller supplies every rank's
    /// contribution directly, the same way a real `MPI_File_write_at_all`
    /// receives each calling process's own local buffer as an argument.
    ///
    /// `elem_size == 0` is a no-op success: nothing is written and the
    /// cursor does not move (mirrors `p4est_file_write_field`'s
    /// `quadrant_data->elem_size == 0` early return).
    pub fn write_field(&mut self, per_rank_data: &[&[u8]], elem_size: usize, user_string: impl Into<String>) -> Result<()> {
        self.require_mode(Mode::Write)?;
        if elem_size == 0 {
            return Ok(());
        }
        if per_rank_data.len() != self.comm.size() {
            return Err(FileError::invariant(format!(
                "write_field needs one slice per rank: got {}, expected {}",
                per_rank_data.len(),
                self.comm.size()
            )));
        }
        let total_elems = self.gfq.global_num_quadrants() as u64;
        let total_payload = total_elems * elem_size as u64;

        // The stored data_size is the per-quadrant record size, not the
        // total payload length: a reader recovers the latter as
        // `N_global * data_size` using the file header's quadrant count,
        // exactly as `read_block_metadata` does for an 'F' block.
        let header = SectionHeader {
            block_type: BlockType::Field,
            data_size: elem_size as u64,
            user_string: user_string.into(),
        };
        let encoded = header.encode()?;
        let section_offset = self.section_offset();
        let payload_offset = section_offset + SECTION_HEADER_SIZE as u64;
        let padding = pad_bytes(total_payload as usize, BYTE_DIV);

        // Rank 0 writes the section header; every rank then writes its
        // own real slice at the offset its partition-map entry implies,
        // so the on-disk bytes reflect every rank's data, not just the
        // calling process's.
        self.backend.write_at(section_offset, &encoded)?;

        let backend = self.backend.clone();
        let gfq = self.gfq.clone();
        self.comm.collective_check(move |rank| -> Result<()> {
            let rank_bytes = gfq.count_for_rank(rank) as usize * elem_size;
            let data = per_rank_data[rank];
            if data.len() != rank_bytes {
                return Err(FileError::count(rank_bytes, data.len()));
            }
            if rank_bytes == 0 {
                return Ok(());
            }
            let rank_offset = payload_offset + gfq.as_slice()[rank] as u64 * elem_size as u64;
            backend.write_at(rank_offset, data)?;
            Ok(())
        })?;
        self.backend.write_at(payload_offset + total_payload, &padding)?;

        self.accessed_bytes += SECTION_HEADER_SIZE as u64 + total_payload + padding.len() as u64;
        self.num_calls += 1;
        Ok(())
    }

    /// Read this rank's slice of the next `'F'` block, against either the
    /// context's own partition map or an explicit override (the two
    /// entry variants `p4est_file_read_field` / `p4est_file_read_field_ext`
    /// collapse into one call here).
    ///
    /// `elem_size == 0` is the skip path: the section's metadata is
    /// parsed (its stored per-quadrant size is *not* checked against
    /// anything, mirroring `read_block_metadata`'s `user_string == NULL`
    /// branch) and the cursor advances without reading any payload.
    pub fn read_field(&mut self, elem_size: usize, gfq_override: Option<&Partition>) -> Result<(String, Vec<u8>)> {
        self.require_mode(Mode::Read)?;
        let offset = self.section_offset();
        let backend = self.backend.clone();

        let mut header_buf = [0u8; SECTION_HEADER_SIZE];
        let n = backend.read_at(offset, &mut header_buf)?;
        if n != SECTION_HEADER_SIZE {
            return Err(FileError::count(SECTION_HEADER_SIZE, n));
        }
        let header = SectionHeader::decode(&header_buf)?;
        if header.block_type != BlockType::Field {
            return Err(FileError::format("expected an 'F' block at this position"));
        }

        // The stored data_size is the per-quadrant record size; the
        // payload this section actually occupies is N_global times that.
        let n_global = self.gfq.global_num_quadrants() as u64;
        let total_payload = n_global * header.data_size;
        let pad_len_bytes = pad_len(total_payload as usize, BYTE_DIV);
        let payload_offset = offset + SECTION_HEADER_SIZE as u64;
        let advance = SECTION_HEADER_SIZE as u64 + total_payload + pad_len_bytes as u64;

        // Padding is verified regardless of the skip path, same as read_header.
        let mut padding = vec![0u8; pad_len_bytes];
        let n = backend.read_at(payload_offset + total_payload, &mut padding)?;
        if n != pad_len_bytes {
            return Err(FileError::count(pad_len_bytes, n));
        }
        validate_padding(&padding, total_payload as usize, BYTE_DIV)?;

        if elem_size == 0 {
            self.accessed_bytes += advance;
            self.num_calls += 1;
            return Ok((header.user_string, Vec::new()));
        }
        if header.data_size != elem_size as u64 {
            return Err(FileError::format(format!(
                "field data_size {} disagrees with caller's element size {elem_size}",
                header.data_size
            )));
        }

        let gfq = gfq_override.unwrap_or(&self.gfq);
        let rank = self.comm.rank_zero();
        let rank_elems = gfq.count_for_rank(rank) as usize;
        let rank_offset = payload_offset + gfq.as_slice()[rank] as u64 * elem_size as u64;
        let mut data = vec![0u8; rank_elems * elem_size];
        let n = backend.read_at(rank_offset, &mut data)?;
        if n != data.len() {
            return Err(FileError::count(data.len(), n));
        }

        self.accessed_bytes += advance;
        self.num_calls += 1;
        Ok((header.user_string, data))
    }

    pub fn dim(&self) -> Dim {
        self.dim
    }

    pub fn num_calls(&self) -> u64 {
        self.num_calls
    }

    pub fn partition(&self) -> &Partition {
        &self.gfq
    }

    /// Access the underlying backend directly, primarily so tests can
    /// snapshot an in-memory container after writing to it.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Flush and release the backend. Idempotent; calling any other
    /// method afterwards fails with an invariant violation.
    pub fn close(mut self) -> Result<()> {
        if self.mode == Mode::Closed {
            return Ok(());
        }
        self.backend.close()?;
        self.mode = Mode::Closed;
        Ok(())
    }
}

impl<B: CollectiveIo> Drop for FileContext<B> {
    fn drop(&mut self) {
        if self.mode != Mode::Closed {
            let _ = self.backend.close();
        }
    }
}
