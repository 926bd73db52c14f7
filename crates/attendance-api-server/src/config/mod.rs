pub mod settings;

pub use settings::{AttendanceConfig, DatabaseConfig, ServerConfig, Settings};
