//! # txlog storage
//!
//! Byte store trait and implementations underneath transaction log files.
//!
//! Backends are **opaque byte stores**: they know nothing about log headers,
//! entry versions or commands. `txlog_core` owns all format interpretation
//! and layers its readable/writable channels on top of a backend.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and scratch logs
//! - [`FileBackend`] - For log files on disk
//!
//! ## Example
//!
//! ```rust
//! use txlog_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"log bytes").unwrap();
//! let data = backend.read_at(offset, 9).unwrap();
//! assert_eq!(&data, b"log bytes");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
