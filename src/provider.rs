//! Backend selection: the set of known DBMS kinds and the registry that maps
//! each kind to the driver factory able to talk to it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::drivers::InMemoryTestDriver;
use crate::error::{DbExecError, Result};
use crate::traits::DriverFactory;

/// Identifies a relational backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackendKind {
    SqlServer,
    MySql,
    Sqlite,
    Oracle,
    Odbc,
    OleDb,
    PostgreSql,
    TestMemory,
}

impl BackendKind {
    pub const ALL: [BackendKind; 8] = [
        BackendKind::SqlServer,
        BackendKind::MySql,
        BackendKind::Sqlite,
        BackendKind::Oracle,
        BackendKind::Odbc,
        BackendKind::OleDb,
        BackendKind::PostgreSql,
        BackendKind::TestMemory,
    ];

    /// Short lowercase name, as accepted by `FromStr` and used in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::SqlServer => "sqlserver",
            BackendKind::MySql => "mysql",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Oracle => "oracle",
            BackendKind::Odbc => "odbc",
            BackendKind::OleDb => "oledb",
            BackendKind::PostgreSql => "postgres",
            BackendKind::TestMemory => "test-memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = DbExecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlserver" | "mssql" => Ok(BackendKind::SqlServer),
            "mysql" => Ok(BackendKind::MySql),
            "sqlite" => Ok(BackendKind::Sqlite),
            "oracle" => Ok(BackendKind::Oracle),
            "odbc" => Ok(BackendKind::Odbc),
            "oledb" => Ok(BackendKind::OleDb),
            "postgres" | "postgresql" => Ok(BackendKind::PostgreSql),
            "test-memory" | "testmemory" => Ok(BackendKind::TestMemory),
            other => Err(DbExecError::UnsupportedBackend(other.to_string())),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = DbExecError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BackendKind> for String {
    fn from(kind: BackendKind) -> Self {
        kind.as_str().to_string()
    }
}

type FactoryCtor = Arc<dyn Fn() -> Arc<dyn DriverFactory> + Send + Sync>;

/// Maps backend kinds to driver factory constructors.
///
/// The default registry knows the in-memory test backend plus whichever
/// real backends were compiled in.
///
/// # Example
/// ```
/// use dbexec::{BackendKind, ProviderRegistry};
///
/// let registry = ProviderRegistry::default();
/// assert!(registry.resolve(BackendKind::TestMemory).is_ok());
/// assert!(registry.resolve(BackendKind::Oracle).is_err());
/// ```
#[derive(Clone)]
pub struct ProviderRegistry {
    constructors: HashMap<BackendKind, FactoryCtor>,
}

impl ProviderRegistry {
    /// A registry with no backends at all.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register (or replace) the factory constructor for a backend kind.
    pub fn register<F>(&mut self, kind: BackendKind, ctor: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn DriverFactory> + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Arc::new(ctor));
        self
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with<F>(mut self, kind: BackendKind, ctor: F) -> Self
    where
        F: Fn() -> Arc<dyn DriverFactory> + Send + Sync + 'static,
    {
        self.register(kind, ctor);
        self
    }

    pub fn is_registered(&self, kind: BackendKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    /// Look up the driver factory for `kind`.
    pub fn resolve(&self, kind: BackendKind) -> Result<Arc<dyn DriverFactory>> {
        let ctor = self.constructors.get(&kind).ok_or_else(|| {
            DbExecError::UnsupportedBackend(format!("no driver factory registered for {kind}"))
        })?;
        let factory = ctor();
        if factory.kind() != kind {
            return Err(DbExecError::UnsupportedBackend(format!(
                "factory registered for {kind} reports {}",
                factory.kind()
            )));
        }
        Ok(factory)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(BackendKind::TestMemory, || {
            Arc::new(InMemoryTestDriver::new()) as Arc<dyn DriverFactory>
        });
        #[cfg(feature = "postgres")]
        registry.register(BackendKind::PostgreSql, || {
            Arc::new(crate::drivers::TokioPostgresDriver::new()) as Arc<dyn DriverFactory>
        });
        #[cfg(feature = "sqlite")]
        registry.register(BackendKind::Sqlite, || {
            Arc::new(crate::drivers::RusqliteDriver::new()) as Arc<dyn DriverFactory>
        });
        registry
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.constructors.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("backends", &kinds)
            .finish()
    }
}

/// Resolve `kind` against the default registry.
pub fn resolve(kind: BackendKind) -> Result<Arc<dyn DriverFactory>> {
    ProviderRegistry::default().resolve(kind)
}
