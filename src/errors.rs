//! Errors surfaced by `pulse` to its callers.

use crate::coordinator::ResourceKind;
use nu_ansi_term::Color;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseError {
    /// A manual refresh reached the resource client and the fetch failed.
    #[error("Refreshing {} failed: {}", Color::Blue.paint(.kind.to_string()), .source)]
    Refresh {
        kind: ResourceKind,
        #[source]
        source: anyhow::Error,
    },
    /// Not inside a tokio runtime.
    #[error("The coordinator must be created from within a tokio runtime.")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
    /// The configuration file could not be parsed.
    #[error("Invalid configuration at `{}`: {}", .path, .source)]
    InvalidConfig {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// The configuration could not be serialized.
    #[error("Failed to serialize configuration: {}", .0)]
    SerializeConfig(#[from] toml::ser::Error),
    /// An [inquire::InquireError] occurred.
    #[error("inquire error: {}", .0)]
    InquireError(#[from] inquire::InquireError),
    /// An [std::io::Error] occurred.
    #[error("io error: {}", .0)]
    IoError(#[from] std::io::Error),
}

pub type PulseResult<T> = Result<T, PulseError>;
