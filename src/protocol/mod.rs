//! High-level components of the pack protocol: wire codec, module registry,
//! key storage, bulk-transfer engines, and the pack manager.
pub mod keys;
pub mod manager;
pub mod registry;
pub mod transfer;
pub mod wire;
