use thiserror::Error;

#[derive(Error, Debug)]
pub enum InjectError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cgroup discovery failed: {0}")]
    CgroupDiscovery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InjectError>;
