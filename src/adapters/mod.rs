// Adapters layer: concrete sources and sinks for external systems.

pub mod sink;
pub mod source;

pub use sink::StorageBackend;
pub use source::DataSource;
