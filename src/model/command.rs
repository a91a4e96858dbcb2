use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::context::RequestContext;
use crate::wire::Status;

use super::value::{DataType, ParamMap};

/// One named, typed command parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub data_type: DataType,
    pub required: bool,
}

impl ParameterSpec {
    /// Creates a required parameter.
    #[must_use]
    pub fn required(name: &'static str, data_type: DataType) -> Self {
        Self {
            name,
            data_type,
            required: true,
        }
    }

    /// Creates an optional parameter.
    #[must_use]
    pub fn optional(name: &'static str, data_type: DataType) -> Self {
        Self {
            name,
            data_type,
            required: false,
        }
    }
}

/// Typed failure returned by command invocation.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("command failed with {status}: {message}")]
pub struct CommandError {
    pub status: Status,
    pub message: String,
}

impl CommandError {
    /// Creates a command error.
    #[must_use]
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Creates an `InvalidCommand` error for malformed parameters.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(Status::InvalidCommand, message)
    }

    /// Creates a `ConstraintError` for domain-constraint violations.
    #[must_use]
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(Status::ConstraintError, message)
    }
}

/// Invocation binding executed with the caller context and decoded parameters.
pub type CommandHandler =
    Arc<dyn Fn(&RequestContext, &ParamMap) -> Result<ParamMap, CommandError> + Send + Sync>;

/// One invocable command: static schema plus optional handler binding.
#[derive(Clone)]
pub struct Command {
    name: &'static str,
    parameters: Vec<ParameterSpec>,
    handler: Option<CommandHandler>,
}

impl Command {
    /// Creates a command with its parameter schema and no handler yet.
    #[must_use]
    pub fn new(name: &'static str, parameters: Vec<ParameterSpec>) -> Self {
        Self {
            name,
            parameters,
            handler: None,
        }
    }

    /// Returns the command name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the ordered parameter schema.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Binds the invocation handler.
    pub fn bind(&mut self, handler: CommandHandler) {
        self.handler = Some(handler);
    }

    /// Returns the bound handler, if any.
    #[must_use]
    pub fn handler(&self) -> Option<CommandHandler> {
        self.handler.clone()
    }

    /// Validates decoded parameters against the schema.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCommand` for a missing required parameter, an unknown
    /// parameter name, or a type mismatch.
    pub fn validate_parameters(&self, parameters: &ParamMap) -> Result<(), CommandError> {
        for spec in &self.parameters {
            match parameters.get(spec.name) {
                None if spec.required => {
                    return Err(CommandError::invalid(format!(
                        "missing required parameter `{}`",
                        spec.name
                    )));
                }
                None => {}
                Some(value) if !value.conforms_to(spec.data_type) => {
                    return Err(CommandError::invalid(format!(
                        "parameter `{}` must be {}",
                        spec.name, spec.data_type
                    )));
                }
                Some(_) => {}
            }
        }

        for name in parameters.keys() {
            if !self.parameters.iter().any(|spec| spec.name == name) {
                return Err(CommandError::invalid(format!(
                    "unknown parameter `{name}`"
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("bound", &self.handler.is_some())
            .finish()
    }
}
