pub mod poller;

pub use poller::{Poller, TelemetryStatus, TelemetryView};
