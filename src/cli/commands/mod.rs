//! CLI command implementations

pub mod cache;
pub mod checksums;
pub mod config;
pub mod cp;
pub mod snapshot;
pub mod view;

pub use cache::execute as cache;
pub use checksums::execute as checksums;
pub use config::execute as config;
pub use cp::execute as cp;
pub use snapshot::{execute as snapshot, poll};
pub use view::{execute as view, jobs, lookup};
