//! Partial object updates.

use serde::Serialize;

use super::content::ObjectKind;
use super::module::ModuleDefinition;

/// Fields pushed to an existing object. Unset fields are left untouched on the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectUpdate {
    /// Type of the object; the API requires it on every update.
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    /// New display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_name: Option<String>,
    /// New specification XML.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specification: Option<String>,
    /// New module reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleDefinition>,
    /// New description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_description: Option<String>,
}

impl ObjectUpdate {
    /// An update that changes nothing.
    fn empty(kind: ObjectKind) -> Self {
        Self {
            kind,
            default_name: None,
            specification: None,
            module: None,
            default_description: None,
        }
    }

    /// Change the display name.
    #[must_use]
    pub fn rename<N: Into<String>>(kind: ObjectKind, name: N) -> Self {
        Self {
            default_name: Some(name.into()),
            ..Self::empty(kind)
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(kind: ObjectKind, description: Option<String>) -> Self {
        Self {
            default_description: description,
            ..Self::empty(kind)
        }
    }

    /// Specification, module reference and description of a report or dashboard.
    #[must_use]
    pub fn content(
        kind: ObjectKind,
        specification: Option<String>,
        module: Option<ModuleDefinition>,
        description: Option<String>,
    ) -> Self {
        Self {
            specification,
            module,
            default_description: description,
            ..Self::empty(kind)
        }
    }
}
