pub mod config;
pub mod error;
pub mod payload;
pub mod types;

pub use config::ClientConfig;
pub use error::ConfigError;
pub use payload::{normalize_id, normalize_id_array, strip_empty, FormMode, Payload};
pub use types::{Id, ListQuery, Page};
