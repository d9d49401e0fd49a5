pub mod config;
pub mod error;
pub mod event;
pub mod redact;
pub mod types;

pub use config::AppConfig;
pub use error::{AppointflowError, Result};
pub use event::EventBus;
pub use types::*;
