use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FillError {
    #[error("invalid taxon id: {0}")]
    InvalidTaxonId(String),

    #[error("invalid summary statistic: {0}")]
    InvalidSummaryStat(String),

    #[error("invalid attribute value type: {0}")]
    InvalidValueType(String),

    #[error("missing config file gh-fill.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read attribute types file at {0}")]
    TypesRead(PathBuf),

    #[error("failed to parse attribute types: {0}")]
    TypesParse(String),

    #[error("attribute {key} declares traverse statistic {stat} absent from its summary list")]
    TraverseStatNotInSummary { key: String, stat: String },

    #[error("store request failed: {0}")]
    StoreHttp(String),

    #[error("store returned status {status}: {message}")]
    StoreStatus { status: u16, message: String },

    #[error("store response missing field: {0}")]
    StoreResponse(String),

    #[error("no taxonomy root configured (pass --root or set it in gh-fill.json)")]
    MissingRoot,

    #[error("no index configured (pass --index or set it in gh-fill.json)")]
    MissingIndex,
}
