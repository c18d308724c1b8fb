//! CLI command handling

pub mod keys;
pub mod output;
pub mod reply;
pub mod serve;

pub use keys::*;
pub use output::*;
pub use reply::*;
pub use serve::*;
