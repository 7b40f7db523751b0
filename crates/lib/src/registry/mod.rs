//! Named handlers: sections and actions.
//!
//! A *section* answers every request whose first path segment (below the
//! service path) is its name. An *action* is a named operation that runs
//! before the section handler when a form posts its name together with a
//! valid nonce.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::Result;
use crate::connection::Connection;
use crate::constants::RESERVED_SECTIONS;

mod errors;

pub use errors::RegistryError;

/// Handler for a section. `Ok(Some(body))` becomes the response body unless
/// the handler already closed the connection itself.
pub type SectionHandler = Arc<dyn Fn(&mut Connection) -> Result<Option<String>> + Send + Sync>;

/// Handler for an action. Its value is exposed to the section handler as
/// [`Connection::unite_action_data`].
pub type ActionHandler = Arc<dyn Fn(&mut Connection) -> Result<Value> + Send + Sync>;

/// Check a section name without registering it.
pub fn validate_section_name(name: &str) -> std::result::Result<(), RegistryError> {
    let invalid = |reason| {
        Err(RegistryError::InvalidSectionName {
            name: name.to_string(),
            reason,
        })
    };
    if name.is_empty() {
        return invalid("empty");
    }
    if name != name.to_lowercase() {
        return invalid("not lower case");
    }
    if name.contains('/') {
        return invalid("contains '/'");
    }
    if name.starts_with('_') && !RESERVED_SECTIONS.contains(&name) {
        return invalid("'_' prefix is reserved");
    }
    Ok(())
}

/// Sections by name.
#[derive(Default, Clone)]
pub struct SectionRegistry {
    sections: BTreeMap<String, SectionHandler>,
}

impl fmt::Debug for SectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionRegistry")
            .field("sections", &self.sections.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`. The first registration wins.
    pub fn register<F>(&mut self, name: &str, handler: F) -> std::result::Result<(), RegistryError>
    where
        F: Fn(&mut Connection) -> Result<Option<String>> + Send + Sync + 'static,
    {
        validate_section_name(name)?;
        if self.sections.contains_key(name) {
            return Err(RegistryError::SectionAlreadyRegistered {
                name: name.to_string(),
            });
        }
        self.sections.insert(name.to_string(), Arc::new(handler));
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<SectionHandler> {
        self.sections.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Registered section names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }
}

/// Actions by name.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, ActionHandler>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.actions.keys().collect();
        names.sort();
        f.debug_struct("ActionRegistry")
            .field("actions", &names)
            .finish()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`. The first registration wins.
    pub fn register<F>(&mut self, name: &str, handler: F) -> std::result::Result<(), RegistryError>
    where
        F: Fn(&mut Connection) -> Result<Value> + Send + Sync + 'static,
    {
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidActionName {
                name: name.to_string(),
            });
        }
        if self.actions.contains_key(name) {
            return Err(RegistryError::ActionAlreadyRegistered {
                name: name.to_string(),
            });
        }
        self.actions.insert(name.to_string(), Arc::new(handler));
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<ActionHandler> {
        self.actions.get(name).cloned()
    }
}
