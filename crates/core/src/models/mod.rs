pub mod directory;
pub mod status;
pub mod sync;
pub mod sync_log;
pub mod user;
