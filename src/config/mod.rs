//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DriverConfig (validated, immutable)
//!     → consumed once by Driver::new
//! ```
//!
//! # Design Decisions
//! - Config is construction-time only; nothing is runtime-mutable
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AcquireTimeoutAction, CheckProfile, ConnectionCheckConfig, CredentialsConfig, DriverConfig,
    HealthCheckConfig, IdleConfig, IdlePolicy, LogFormat, ObservabilityConfig, PoolConfig,
    RequestConfig, ServerConfig,
};
pub use validation::{validate_config, ValidationError};
