pub mod settings;

pub use settings::{NetworkTopology, Settings};
