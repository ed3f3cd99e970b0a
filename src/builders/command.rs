use std::collections::HashSet;

use tracing::debug;

use crate::builders::Parameter;
use crate::error::{DbExecError, Result};
use crate::traits::{Connection, DriverFactory};

/// How the command text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandKind {
    /// Plain SQL text.
    #[default]
    Text,
    /// The text names a stored procedure; bound parameters become its arguments.
    StoredProcedure,
    /// The text names a table whose rows are all returned.
    TableDirect,
}

/// An assembled, not yet executed unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    sql: String,
    parameters: Vec<Parameter>,
    kind: CommandKind,
}

impl CommandSpec {
    /// Validates and assembles a command.
    ///
    /// Fails with `CommandConstruction` when the text is blank or two
    /// parameters share a name.
    pub fn new(sql: impl Into<String>, parameters: Vec<Parameter>, kind: CommandKind) -> Result<Self> {
        let sql = sql.into();
        if sql.trim().is_empty() {
            return Err(DbExecError::CommandConstruction(
                "command text is empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for parameter in &parameters {
            if !parameter.name().is_empty() && !seen.insert(parameter.name()) {
                return Err(DbExecError::CommandConstruction(format!(
                    "duplicate parameter name: {}",
                    parameter.name()
                )));
            }
        }

        Ok(Self {
            sql,
            parameters,
            kind,
        })
    }

    pub fn text(sql: impl Into<String>) -> Result<Self> {
        Self::new(sql, Vec::new(), CommandKind::Text)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Parameters whose values are sent to the backend, in list order.
    pub fn bound_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.direction().is_bound())
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// The text as a double-quoted, possibly schema-qualified identifier.
    /// Each dot-separated part is quoted on its own.
    pub fn quoted_name(&self) -> String {
        self.sql
            .trim()
            .split('.')
            .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// A command bound to a fresh, unopened connection.
pub struct Command {
    spec: CommandSpec,
    connection: Box<dyn Connection>,
}

impl Command {
    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    pub fn into_parts(self) -> (CommandSpec, Box<dyn Connection>) {
        (self.spec, self.connection)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("spec", &self.spec)
            .field("backend", &self.connection.backend())
            .field("open", &self.connection.is_open())
            .finish()
    }
}

/// Binds command specs to connections produced by a driver factory.
pub struct CommandBuilder<'a> {
    factory: &'a dyn DriverFactory,
    connection_string: &'a str,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(factory: &'a dyn DriverFactory, connection_string: &'a str) -> Self {
        Self {
            factory,
            connection_string,
        }
    }

    /// Pair `spec` with a new connection. The connection is left closed.
    pub fn build(&self, spec: CommandSpec) -> Result<Command> {
        let backend = self.factory.kind();
        if !self.factory.supports_command_kind(spec.kind()) {
            return Err(DbExecError::CommandConstruction(format!(
                "{backend} does not support {:?} commands",
                spec.kind()
            )));
        }

        let connection = self
            .factory
            .create_connection(self.connection_string)
            .map_err(|e| match e {
                DbExecError::CommandConstruction(_) => e,
                other => DbExecError::CommandConstruction(other.to_string()),
            })?;

        debug!(
            %backend,
            kind = ?spec.kind(),
            parameters = spec.parameters().len(),
            "built command"
        );
        Ok(Command { spec, connection })
    }
}
