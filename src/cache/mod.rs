// Persistent URL-keyed response cache — storage tier shared by the asset
// resolver and the background cache worker.

pub mod store;

pub use store::{CacheStorage, CachedResponse, UrlCache};
