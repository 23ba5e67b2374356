use crate::LeakReport;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("listeners still registered: {0}")]
    Leaked(LeakReport),
    #[error("invalid dispatcher configuration: {0}")]
    Config(#[from] serde_json::Error),
}
