mod engine;
mod settings;

pub use engine::{EngineSettings, ProcessLimiter};
pub use settings::Settings;
