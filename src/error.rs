
use thiserror::Error;

use crate::stencil::StencilError;

#[derive(Error, Debug)]
pub enum AnchoriteError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Stencil error: {0}")]
    Stencil(#[from] StencilError),
    #[error("Anchor '{anchor}': {source}")]
    Anchor {
        anchor: String,
        #[source]
        source: Box<AnchoriteError>,
    },
    #[error("Attribute '{attribute}': {source}")]
    Attribute {
        attribute: String,
        #[source]
        source: Box<AnchoriteError>,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnchoriteError>;

// Helper conversions
impl From<serde_json::Error> for AnchoriteError {
    fn from(e: serde_json::Error) -> Self {
        Self::Schema(e.to_string())
    }
}
impl From<config::ConfigError> for AnchoriteError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
