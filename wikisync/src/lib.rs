pub mod config;
pub mod loader;
pub mod markdown;
pub mod runner;
pub mod slug;
pub mod sync;
