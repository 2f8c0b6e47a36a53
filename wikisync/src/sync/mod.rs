pub mod attachments;
pub mod cache;
pub mod engine;
pub mod mapping;
pub mod paths;
pub mod references;
