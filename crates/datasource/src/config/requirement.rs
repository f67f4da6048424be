//! Declarative description of a single construction parameter.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::config::value::ConfigValue;
use crate::error::RequirementError;

/// Custom validation hook. An `Err` carries the reason shown to the caller.
pub type Validator = Arc<dyn Fn(&ConfigValue) -> Result<(), String> + Send + Sync>;

/// Value type accepted by a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementType {
    String,
    Path,
    Int64,
    Bool,
    Custom {
        type_id: TypeId,
        collection_type_id: TypeId,
        name: &'static str,
    },
}

impl RequirementType {
    pub fn custom<T: Any + Send + Sync>() -> Self {
        RequirementType::Custom {
            type_id: TypeId::of::<T>(),
            collection_type_id: TypeId::of::<Vec<T>>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RequirementType::String => "String",
            RequirementType::Path => "Path",
            RequirementType::Int64 => "Int64",
            RequirementType::Bool => "Bool",
            RequirementType::Custom { name, .. } => name,
        }
    }

    fn expected_type_id(&self, collection: bool) -> TypeId {
        match (self, collection) {
            (RequirementType::String, false) => TypeId::of::<String>(),
            (RequirementType::String, true) => TypeId::of::<Vec<String>>(),
            (RequirementType::Path, false) => TypeId::of::<PathBuf>(),
            (RequirementType::Path, true) => TypeId::of::<Vec<PathBuf>>(),
            (RequirementType::Int64, false) => TypeId::of::<i64>(),
            (RequirementType::Int64, true) => TypeId::of::<Vec<i64>>(),
            (RequirementType::Bool, false) => TypeId::of::<bool>(),
            (RequirementType::Bool, true) => TypeId::of::<Vec<bool>>(),
            (RequirementType::Custom { type_id, .. }, false) => *type_id,
            (RequirementType::Custom { collection_type_id, .. }, true) => *collection_type_id,
        }
    }

    fn display_name(&self, collection: bool) -> String {
        if collection {
            format!("Vec<{}>", self.name())
        } else {
            self.name().to_string()
        }
    }
}

/// Serializable summary of a requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementDescriptor {
    pub name: String,
    pub description: String,
    pub value_type: String,
    pub collection: bool,
    pub optional: bool,
    pub validated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclusive_with: Vec<String>,
}

struct RequirementInner {
    name: String,
    description: String,
    value_type: RequirementType,
    collection: bool,
    optional: bool,
    validator: Option<Validator>,
    depends_on: Vec<String>,
    exclusive_with: Vec<String>,
}

/// A named, typed parameter a data source factory needs.
///
/// Requirements are immutable and cheap to clone. Two requirements are equal
/// when their names are equal.
#[derive(Clone)]
pub struct Requirement(Arc<RequirementInner>);

impl Requirement {
    pub fn builder(name: impl Into<String>, value_type: RequirementType) -> RequirementBuilder {
        RequirementBuilder {
            name: name.into(),
            description: String::new(),
            value_type,
            collection: false,
            optional: false,
            validator: None,
            depends_on: Vec::new(),
            exclusive_with: Vec::new(),
        }
    }

    pub fn string(name: impl Into<String>) -> RequirementBuilder {
        Self::builder(name, RequirementType::String)
    }

    pub fn path(name: impl Into<String>) -> RequirementBuilder {
        Self::builder(name, RequirementType::Path)
    }

    pub fn int64(name: impl Into<String>) -> RequirementBuilder {
        Self::builder(name, RequirementType::Int64)
    }

    pub fn boolean(name: impl Into<String>) -> RequirementBuilder {
        Self::builder(name, RequirementType::Bool)
    }

    pub fn custom<T: Any + Send + Sync>(name: impl Into<String>) -> RequirementBuilder {
        Self::builder(name, RequirementType::custom::<T>())
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn description(&self) -> &str {
        &self.0.description
    }

    pub fn value_type(&self) -> RequirementType {
        self.0.value_type
    }

    pub fn is_collection(&self) -> bool {
        self.0.collection
    }

    pub fn is_optional(&self) -> bool {
        self.0.optional
    }

    pub fn depends_on(&self) -> &[String] {
        &self.0.depends_on
    }

    pub fn exclusive_with(&self) -> &[String] {
        &self.0.exclusive_with
    }

    pub fn describe(&self) -> RequirementDescriptor {
        RequirementDescriptor {
            name: self.0.name.clone(),
            description: self.0.description.clone(),
            value_type: self.0.value_type.display_name(self.0.collection),
            collection: self.0.collection,
            optional: self.0.optional,
            validated: self.0.validator.is_some(),
            depends_on: self.0.depends_on.clone(),
            exclusive_with: self.0.exclusive_with.clone(),
        }
    }

    /// Type check followed by the custom validator, if any.
    ///
    /// A panicking validator is reported as a failure rather than unwinding
    /// into the caller.
    pub fn check(&self, value: &ConfigValue) -> Result<(), RequirementError> {
        let expected = self.0.value_type.expected_type_id(self.0.collection);
        if value.type_id() != expected {
            return Err(RequirementError::WrongType {
                name: self.0.name.clone(),
                expected: self.0.value_type.display_name(self.0.collection),
                actual: value.type_name().to_string(),
            });
        }

        let Some(validator) = &self.0.validator else {
            return Ok(());
        };

        match panic::catch_unwind(AssertUnwindSafe(|| validator(value))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(RequirementError::Invalid {
                name: self.0.name.clone(),
                message,
            }),
            Err(payload) => Err(RequirementError::ValidatorPanicked {
                name: self.0.name.clone(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        self.0.name == other.0.name
    }
}

impl Eq for Requirement {}

impl Hash for Requirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requirement")
            .field("name", &self.0.name)
            .field("type", &self.0.value_type.display_name(self.0.collection))
            .field("optional", &self.0.optional)
            .field("depends_on", &self.0.depends_on)
            .field("exclusive_with", &self.0.exclusive_with)
            .finish()
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

pub struct RequirementBuilder {
    name: String,
    description: String,
    value_type: RequirementType,
    collection: bool,
    optional: bool,
    validator: Option<Validator>,
    depends_on: Vec<String>,
    exclusive_with: Vec<String>,
}

impl RequirementBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn collection(mut self) -> Self {
        self.collection = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&ConfigValue) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    pub fn exclusive_with(mut self, name: impl Into<String>) -> Self {
        self.exclusive_with.push(name.into());
        self
    }

    pub fn build(self) -> Result<Requirement, RequirementError> {
        if self.name.trim().is_empty() {
            return Err(RequirementError::BlankField { field: "name" });
        }
        if self.description.trim().is_empty() {
            return Err(RequirementError::BlankField {
                field: "description",
            });
        }

        Ok(Requirement(Arc::new(RequirementInner {
            name: self.name,
            description: self.description,
            value_type: self.value_type,
            collection: self.collection,
            optional: self.optional,
            validator: self.validator,
            depends_on: self.depends_on,
            exclusive_with: self.exclusive_with,
        })))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
