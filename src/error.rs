use std::path::PathBuf;

/// fatal initialization failures. everything past startup is logged and
/// skipped instead of propagated, so the variants stay small.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot prepare workspace at {path}: {source}")]
    Workspace {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot load model store from {path}: {reason}")]
    Model { path: PathBuf, reason: String },
    #[error("cannot create trace region: {0}")]
    Region(std::io::Error),
    #[error("command template must contain exactly one of __INPUT__ or __FILE__")]
    Template,
    #[error("cannot read seeds file {0}")]
    Seeds(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
