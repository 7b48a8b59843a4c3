//! Error taxonomy for the sandbox lifecycle engine.
//!
//! Kinds, not one type per failure site: configuration mistakes (unknown
//! profile, foreign working directory) are a distinct kind from engine
//! failures, which fold transient and fatal Docker errors into a single
//! reported variant carrying the underlying message.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("working directory was not obtained from working_directory(); refusing to use it")]
    ForeignWorkdir,

    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
