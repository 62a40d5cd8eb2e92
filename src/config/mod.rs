//! Configuration module for crmql.
//!
//! Handles the settings file and environment variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, ExecutorSettings, OutputSettings, RateLimitSettings, Settings,
    SettingsError, SourceSettings,
};
