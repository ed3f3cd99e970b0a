use crate::builders::{CommandKind, Parameter, ParameterDirection};
use crate::error::Result;
use crate::provider::BackendKind;
use crate::traits::{Connection, DataAdapter, FillAdapter};
use crate::types::SqlValue;

/// Capability set for one backend kind.
/// Factories are responsible for:
/// - Creating unopened connections for a connection string
/// - Creating parameters in the backend's preferred form
/// - Declaring which command kinds the backend can run
/// - Supplying the adapter used for buffered execution
pub trait DriverFactory: Send + Sync {
    /// The backend this factory serves.
    fn kind(&self) -> BackendKind;

    /// Create a connection bound to `connection_string`. It must not be opened here.
    fn create_connection(&self, connection_string: &str) -> Result<Box<dyn Connection>>;

    fn create_parameter(
        &self,
        name: &str,
        direction: ParameterDirection,
        value: SqlValue,
    ) -> Parameter {
        Parameter::with_direction(name, direction, value)
    }

    fn supports_command_kind(&self, kind: CommandKind) -> bool {
        kind == CommandKind::Text
    }

    /// Adapter for buffered row-set execution, `None` if the backend has none.
    fn create_data_adapter(&self) -> Option<Box<dyn DataAdapter>> {
        Some(Box::new(FillAdapter))
    }
}
