use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
