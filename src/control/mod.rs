pub mod service;

pub use service::{merge, ControlDispatcher, ControlError};
