pub mod config;
pub mod error;
pub mod event;
pub mod state;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{GraphError, Result, SyncupError};
pub use event::EventBus;
pub use state::{State, StateUpdate};
pub use types::*;
