use thiserror::Error;

/// Client-supplied conversation input could not be turned into a conversation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("provide {{input: [...]}}, {{messages: [{{role, content}}...]}} or {{question: string}}")]
    Empty,
    #[error("conflicting conversation shapes supplied: {}; send exactly one", .shapes.join(", "))]
    Conflicting { shapes: Vec<&'static str> },
    #[error("malformed request: {0}")]
    Malformed(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("coaching backend failure: {0}")]
    Backend(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("method not allowed")]
    MethodNotAllowed { correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn method_not_allowed(correlation_id: impl Into<String>) -> Self {
        Self::MethodNotAllowed { correlation_id: correlation_id.into() }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::MethodNotAllowed { .. } => 405,
            Self::Internal { .. } => 500,
        }
    }

    /// Plain-text body returned to the caller. Internal details never leave the process.
    pub fn user_message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. } => message,
            Self::MethodNotAllowed { .. } => "Use POST",
            Self::Internal { .. } => "Internal error",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::MethodNotAllowed { correlation_id }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::MethodNotAllowed { correlation_id: id }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Input(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Backend(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
