pub mod client;
pub mod logging;
pub mod settings;

pub use client::{ClientError, LanguageClient};
pub use logging::init_tracing;
pub use settings::Settings;
