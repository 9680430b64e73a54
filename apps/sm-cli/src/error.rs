//! Errors surfaced by the command-line front end.

use sm_config::ConfigError;
use sm_core::MapperError;
use sm_expr::ExprError;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mapping error: {0}")]
    Mapper(#[from] MapperError),

    #[error("Expression error: {0}")]
    Expr(#[from] ExprError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}
