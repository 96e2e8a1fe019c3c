//! Persistence for the geo feed integrations
//!
//! Implements the `.storage/` directory pattern: one JSON file per key,
//! wrapped in a versioned envelope and written atomically. On top of it,
//! [`FeedStateStore`] keeps each feed's last-seen entry identifiers so a
//! restart does not announce every known entry as new again.

pub mod feed_state;
pub mod storage;

pub use feed_state::{FeedStateData, FeedStateStore, FEED_STATE_KEY_PREFIX};
pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};
