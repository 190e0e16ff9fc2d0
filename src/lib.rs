pub mod languages;
pub mod layout;
pub mod logging;
pub mod pipeline;
pub mod ports;
pub mod profanity;
pub mod server;
pub mod settings;
pub mod storage;
pub mod story;

pub use pipeline::{PageMode, Pipeline, PipelineError};
pub use settings::{load_settings, Settings};
