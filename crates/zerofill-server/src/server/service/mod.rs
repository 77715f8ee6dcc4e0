pub mod handler;
pub mod tracker;
