// Local video compression engine: shrinks a video on-device with a lazily
// bootstrapped codec engine, deduplicated initialization, and a two-tier
// cache over the engine's pinned binary assets.

pub mod api;
pub mod assets;
pub mod cache;
pub mod compress;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod progress;
pub mod settings;
pub mod worker;
