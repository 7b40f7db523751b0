//! Error types for section and action registration.

use thiserror::Error;

/// Errors returned when a section or action cannot be registered.
///
/// Registration failures never replace an existing handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// Name is empty, not lower case, contains `/`, or starts with `_`
    /// without being a reserved control name.
    #[error("Invalid section name '{name}': {reason}")]
    InvalidSectionName { name: String, reason: &'static str },

    #[error("Section already registered: {name}")]
    SectionAlreadyRegistered { name: String },

    #[error("Invalid action name '{name}'")]
    InvalidActionName { name: String },

    #[error("Action already registered: {name}")]
    ActionAlreadyRegistered { name: String },
}

impl RegistryError {
    /// Check if this error is a name collision.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            RegistryError::SectionAlreadyRegistered { .. }
                | RegistryError::ActionAlreadyRegistered { .. }
        )
    }
}

impl From<RegistryError> for crate::Error {
    fn from(err: RegistryError) -> Self {
        crate::Error::Registry(err)
    }
}
