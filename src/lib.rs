//! # dexray
//!
//! A corruption-tolerant decoder for Android DEX files, built for static
//! analysis and reverse engineering of samples that may be truncated,
//! malformed or deliberately hostile. Decoding never reads out of bounds
//! and never gives up on the whole file because one record is broken:
//! every parsed node carries its origin offset and a corruption flag, and
//! a malformed field decodes to a defined default while the rest of the
//! file is still walked.
//!
//! The only fatal failures are a buffer too small to hold the 0x70-byte
//! header and an out-of-range start offset.
//!
//! ```no_run
//! use dexray::DexFile;
//!
//! let dex = DexFile::open("classes.dex").unwrap();
//! println!("{} strings, {} classes", dex.string_ids.len(), dex.class_defs.len());
//!
//! if dex.is_corrupted() {
//!     // walk the tree and check per-node metadata to find the damage
//!     for class in &dex.class_defs {
//!         if class.meta.corrupted {
//!             println!("suspect class_def at 0x{:x}", class.meta.offset);
//!         }
//!     }
//! }
//! ```

#[macro_use]
pub mod error;

pub mod bytes;
pub mod dex_file;
pub mod leb;
pub mod meta;

pub use crate::bytes::ByteCursor;
pub use crate::dex_file::{AccessFlags, DexFile, Header, Node, Table};
pub use crate::error::DexError;
pub use crate::meta::NodeMeta;
