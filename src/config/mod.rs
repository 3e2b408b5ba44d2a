//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → FileConfig (validated)
//!     → loader.rs reads the named PEM files
//!     → GatewayConfig (immutable, handed to Gateway::configure)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The gateway core only sees `GatewayConfig`; file paths stay in the binary

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, read_gateway_config, ConfigError};
pub use schema::{
    DispatchMode, FileConfig, GatewayConfig, ListenerConfig, LogFormat, LoggingConfig,
    VerbMismatchPolicy,
};
