//! Connection target configuration.

use serde::{Deserialize, Serialize};

use crate::error::{DbExecError, Result};
use crate::provider::BackendKind;

pub const BACKEND_ENV: &str = "DBEXEC_BACKEND";
pub const CONNECTION_STRING_ENV: &str = "DBEXEC_CONNECTION_STRING";

/// Which backend to talk to and how to reach it.
///
/// ```
/// use dbexec::{BackendKind, ConnectionConfig};
///
/// let config = ConnectionConfig::new(BackendKind::Sqlite, "app.db");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub backend: BackendKind,
    pub connection_string: String,
}

impl ConnectionConfig {
    pub fn new(backend: BackendKind, connection_string: impl Into<String>) -> Self {
        Self {
            backend,
            connection_string: connection_string.into(),
        }
    }

    /// Read `DBEXEC_BACKEND` and `DBEXEC_CONNECTION_STRING`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let backend = lookup(BACKEND_ENV)
            .ok_or_else(|| DbExecError::InvalidConfig(format!("{BACKEND_ENV} is not set")))?
            .parse::<BackendKind>()?;
        let connection_string = lookup(CONNECTION_STRING_ENV).ok_or_else(|| {
            DbExecError::InvalidConfig(format!("{CONNECTION_STRING_ENV} is not set"))
        })?;
        let config = Self::new(backend, connection_string);
        config.validate()?;
        Ok(config)
    }

    /// The connection string is otherwise opaque; only emptiness is checked.
    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(DbExecError::InvalidConfig(
                "connection string is empty".to_string(),
            ));
        }
        Ok(())
    }
}
