//! Settings for parsing and serialization

mod loader;
mod types;

pub use loader::SettingsLoader;
pub use types::{ParseOptions, Settings, Style};
