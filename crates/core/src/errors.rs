use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("function schema requires a name")]
    MissingName,
    #[error("function `{function}` declares a parameter with an empty name")]
    EmptyParameterName { function: String },
    #[error("enum parameter `{parameter}` of function `{function}` has no allowed values")]
    EmptyEnum { function: String, parameter: String },
    #[error("function `{function}` requires undeclared parameter `{parameter}`")]
    UnknownRequiredParameter { function: String, parameter: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("function `{0}` is registered more than once")]
    DuplicateName(String),
    #[error("function `{function}` advertises a schema named `{schema}`")]
    NameMismatch { function: String, schema: String },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Coarse classification used when reporting failures to operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Transport,
    UnrecognizedFunction,
    Cancelled,
    Input,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Transport => "transport",
            Self::UnrecognizedFunction => "unrecognized_function",
            Self::Cancelled => "cancelled",
            Self::Input => "input",
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::Configuration => "Startup configuration is invalid. Fix it and restart.",
            Self::Transport => {
                "The completion service could not be reached. The last message was not kept; retry it."
            }
            Self::UnrecognizedFunction => {
                "The model called a function that is not registered. The session was stopped."
            }
            Self::Cancelled => "The session was cancelled.",
            Self::Input => "Reading input failed.",
        }
    }

    pub fn is_fatal(self) -> bool {
        !matches!(self, Self::Transport)
    }
}
