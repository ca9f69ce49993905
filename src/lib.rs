//! An embedded, append-only key-value store in the Bitcask mould.
//!
//! Every write appends a CRC-protected record to the active segment file and
//! fsyncs before returning; an in-memory key directory maps each live key to
//! the location of its newest record on disk. Opening a directory replays
//! all of its segments to rebuild that directory.
//!
//! ```no_run
//! use cask::Store;
//!
//! # fn main() -> cask::Result<()> {
//! let store = Store::open("./data")?;
//! store.put(b"author", b"dostoevsky")?;
//! assert_eq!(store.get(b"author")?, b"dostoevsky");
//! # Ok(())
//! # }
//! ```

mod error;
mod keydir;
mod record;
mod segment;
mod store;

pub use error::Error;
pub use record::{HEADER_SIZE, MAX_KEY_SIZE, MAX_VALUE_SIZE};
pub use store::{Config, Store};

/// Suffix shared by every segment file in a data directory.
pub const SEGMENT_SUFFIX: &str = ".bitcask.data";

/// Id of the first segment created in an empty data directory.
pub const BASE_SEGMENT_ID: u64 = 1_000_000_000;

/// Default rotation ceiling for the active segment, in bytes.
pub const MAX_FILE_SIZE: u64 = 1 << 30;

pub type Result<T> = std::result::Result<T, Error>;
