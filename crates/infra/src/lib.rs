//! Infrastructure layer: persistent store, look-aside cache, and the
//! authorization core that loads facts through them.

pub mod access;
pub mod cache;
pub mod directory;
pub mod store;

mod integration_tests;

pub use access::{AccessError, AccessResolver, OrgScope};
pub use cache::{CacheBackend, CacheError, Caches, EntityCache, InMemoryCache};
pub use directory::{Directory, DirectoryError};
pub use store::{InMemoryStore, PostgresStore, SharedStore, Store, StoreError, Visibility};
