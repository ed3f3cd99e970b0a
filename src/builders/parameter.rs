use crate::types::SqlValue;

/// How a parameter flows between caller and backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParameterDirection {
    /// Whether the parameter's value is sent to the backend.
    pub fn is_bound(&self) -> bool {
        matches!(self, ParameterDirection::Input | ParameterDirection::InputOutput)
    }
}

/// A backend-neutral named parameter.
///
/// No check is made that the value suits the target column; a mismatch
/// surfaces as an execution error from the backend.
///
/// # Example
/// ```
/// use dbexec::{Parameter, ParameterDirection, SqlValue};
///
/// let p = Parameter::new("id", 42);
/// assert_eq!(p.name(), "id");
/// assert_eq!(p.direction(), ParameterDirection::Input);
/// assert_eq!(p.value(), &SqlValue::Int32(42));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    direction: ParameterDirection,
    value: SqlValue,
}

impl Parameter {
    /// Creates an input parameter.
    pub fn new(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::with_direction(name, ParameterDirection::Input, value)
    }

    pub fn with_direction(
        name: impl Into<String>,
        direction: ParameterDirection,
        value: impl Into<SqlValue>,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name without a leading `:`, `@`, `$` or `?` marker.
    pub fn bare_name(&self) -> &str {
        self.name.trim_start_matches([':', '@', '$', '?'])
    }

    pub fn direction(&self) -> ParameterDirection {
        self.direction
    }

    pub fn value(&self) -> &SqlValue {
        &self.value
    }
}
