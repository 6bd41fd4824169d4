//! Partition-independent parallel serialization core for adaptive
//! quadtree/octree forests.
//!
//! A container written by any number of ranks can be read back by any
//! other number of ranks: every section is self-describing (an ASCII
//! header naming its own byte length and a user string) and padded to a
//! 16-byte boundary, so a reader never needs the writer's rank count or
//! partition map to walk the file -- only to split a field section's
//! payload across its own ranks.
//!
//! - [`codec`] -- padding algebra and the fixed-width ASCII header formats.
//! - [`partition`] -- the global partition map (`gfq`) and its invariants.
//! - [`forest`] -- the consumed forest interface and a reference in-memory forest.
//! - [`deflate`] -- flattening a forest to/from the coordinate arrays the container stores.
//! - [`comm`] -- the simulated collective-rank communicator.
//! - [`io_backend`] -- the storage abstraction collective I/O runs against.
//! - [`context`] -- the open/write/read/close state machine and section engine.
//! - [`info`] -- the truncation-tolerant section-header walker.
//! - [`error`] -- the four-class error taxonomy shared by every module above.

pub mod codec;
pub mod comm;
pub mod context;
pub mod deflate;
pub mod error;
pub mod forest;
pub mod info;
pub mod io_backend;
pub mod partition;

pub use codec::{BlockType, Dim, FileHeader, SectionHeader};
pub use comm::Communicator;
pub use context::FileContext;
pub use deflate::{deflate, inflate};
pub use error::{ErrorClass, FileError, Result};
pub use forest::{ForestInterface, InMemoryForest, Quadrant};
pub use info::{info, ContainerInfo, SectionInfo};
pub use io_backend::{CollectiveIo, MemBackend, PosixBackend};
pub use partition::Partition;
