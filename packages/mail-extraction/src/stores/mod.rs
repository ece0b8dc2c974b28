//! Storage implementations.
//!
//! - `MemoryMailbox` - in-memory message store, loadable from a JSON export
//! - `StateFile` - atomic JSON persistence for `RunState`

pub mod memory;
pub mod state_file;

pub use memory::MemoryMailbox;
pub use state_file::StateFile;
