pub mod api;
pub mod config;
pub mod control;
pub mod device;
pub mod history;
pub mod models;
pub mod sensors;
pub mod snapshot_store;

#[cfg(test)]
mod testing;
