// Codec engine boundary — opaque capability trait and lifecycle management.

pub mod codec;
pub mod lifecycle;

pub use codec::{CodecEngine, EngineFactory, LogObserver, ProgressObserver, RawProgress};
pub use lifecycle::EngineLifecycle;
