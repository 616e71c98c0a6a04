//! API Module
//!
//! The narrow cache interface the engine is exposed through, and index-style
//! access with a default region and policy.

pub mod indexed;
pub mod object_cache;

pub use indexed::IndexedCache;
pub use object_cache::ObjectCache;
