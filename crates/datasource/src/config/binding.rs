//! Turns caller-supplied values into a verified configuration.

use std::any::Any;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use log::{debug, warn};

use crate::config::requirement::{Requirement, RequirementType};
use crate::config::value::ConfigValue;
use crate::error::{DataSourceError, RequirementError, ValidationFailures};

/// Caller-supplied values keyed by requirement name.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<String, ConfigValue>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert keyed by the requirement's name.
    pub fn bind<T: Any + Send + Sync>(mut self, requirement: &Requirement, value: T) -> Self {
        self.insert(requirement.name(), ConfigValue::new(value));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ConfigValue) -> Option<ConfigValue> {
        self.values.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<ConfigValue> {
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&ConfigValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Loads bindings from a JSON object keyed by requirement name.
    ///
    /// Values for built-in requirement types are converted to their Rust
    /// representation. A value that does not fit its requirement, or that
    /// belongs to a custom type, is kept as raw [`serde_json::Value`] so that
    /// [`BoundConfiguration::bind`] reports it together with every other
    /// failure. `null` is treated as absent.
    pub fn from_json(
        requirements: &[Requirement],
        json: &serde_json::Value,
    ) -> Result<Self, DataSourceError> {
        let object = json.as_object().ok_or_else(|| DataSourceError::Bindings {
            message: format!("expected a JSON object, got {}", json_kind(json)),
        })?;

        let by_name: HashMap<&str, &Requirement> =
            requirements.iter().map(|r| (r.name(), r)).collect();

        let mut bindings = Bindings::new();
        for (name, value) in object {
            if value.is_null() {
                continue;
            }

            let converted = match by_name.get(name.as_str()) {
                Some(requirement) => convert_json(requirement, value),
                None => {
                    debug!("Binding '{}' matches no requirement, keeping raw value", name);
                    None
                }
            };

            bindings.insert(
                name.clone(),
                converted.unwrap_or_else(|| ConfigValue::new(value.clone())),
            );
        }

        Ok(bindings)
    }

    pub fn from_json_str(
        requirements: &[Requirement],
        content: &str,
    ) -> Result<Self, DataSourceError> {
        let json: serde_json::Value = serde_json::from_str(content)?;
        Self::from_json(requirements, &json)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

fn convert_json(requirement: &Requirement, value: &serde_json::Value) -> Option<ConfigValue> {
    fn each<T, F>(value: &serde_json::Value, f: F) -> Option<Vec<T>>
    where
        F: Fn(&serde_json::Value) -> Option<T>,
    {
        value.as_array()?.iter().map(f).collect()
    }

    let as_string = |v: &serde_json::Value| v.as_str().map(str::to_string);
    let as_path = |v: &serde_json::Value| v.as_str().map(PathBuf::from);

    match (requirement.value_type(), requirement.is_collection()) {
        (RequirementType::String, false) => as_string(value).map(ConfigValue::new),
        (RequirementType::String, true) => each(value, as_string).map(ConfigValue::new),
        (RequirementType::Path, false) => as_path(value).map(ConfigValue::new),
        (RequirementType::Path, true) => each(value, as_path).map(ConfigValue::new),
        (RequirementType::Int64, false) => value.as_i64().map(ConfigValue::new),
        (RequirementType::Int64, true) => {
            each(value, serde_json::Value::as_i64).map(ConfigValue::new)
        }
        (RequirementType::Bool, false) => value.as_bool().map(ConfigValue::new),
        (RequirementType::Bool, true) => {
            each(value, serde_json::Value::as_bool).map(ConfigValue::new)
        }
        (RequirementType::Custom { .. }, _) => None,
    }
}

/// An accepted (requirement, value) pair.
#[derive(Debug, Clone)]
pub struct Binding {
    requirement: Requirement,
    value: ConfigValue,
}

impl Binding {
    pub fn new(requirement: Requirement, value: ConfigValue) -> Self {
        Self { requirement, value }
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn value(&self) -> &ConfigValue {
        &self.value
    }
}

/// A configuration in which every requirement invariant holds.
///
/// Only [`BoundConfiguration::bind`] produces one: each required requirement
/// is bound, every bound value passed its type check and validator, every
/// bound requirement has its dependencies bound, and no two bound requirements
/// are mutually exclusive.
#[derive(Debug, Clone)]
pub struct BoundConfiguration {
    bindings: Vec<Binding>,
    index: HashMap<String, usize>,
}

impl BoundConfiguration {
    /// Validates `supplied` against `requirements`.
    ///
    /// All failures are collected and returned together. Requirements that
    /// lose a dependency are pruned repeatedly until nothing changes, and
    /// both sides of an exclusivity conflict are pruned.
    pub fn bind(
        requirements: &[Requirement],
        supplied: &Bindings,
    ) -> Result<Self, ValidationFailures> {
        let mut failures = Vec::new();
        let mut declared: HashSet<&str> = HashSet::new();
        let mut accepted: Vec<Binding> = Vec::new();

        for requirement in requirements {
            if !declared.insert(requirement.name()) {
                failures.push(RequirementError::DuplicateName {
                    name: requirement.name().to_string(),
                });
                continue;
            }

            match supplied.get(requirement.name()) {
                None if requirement.is_optional() => {}
                None => failures.push(RequirementError::Missing {
                    name: requirement.name().to_string(),
                }),
                Some(value) => match requirement.check(value) {
                    Ok(()) => accepted.push(Binding::new(requirement.clone(), value.clone())),
                    Err(e) => failures.push(e),
                },
            }
        }

        for name in supplied.names() {
            if !declared.contains(name) {
                debug!("Ignoring supplied value '{}' with no matching requirement", name);
            }
        }

        let accepted = prune_dependencies(accepted, &mut failures);
        let accepted = prune_conflicts(accepted, &mut failures);

        if !failures.is_empty() {
            warn!(
                "Requirement binding failed with {} failure(s)",
                failures.len()
            );
            return Err(ValidationFailures::new(failures));
        }

        let index = accepted
            .iter()
            .enumerate()
            .map(|(i, b)| (b.requirement.name().to_string(), i))
            .collect();

        Ok(Self {
            bindings: accepted,
            index,
        })
    }

    pub fn get(&self, requirement: &Requirement) -> Option<&ConfigValue> {
        self.index
            .get(requirement.name())
            .map(|&i| &self.bindings[i].value)
    }

    pub fn contains(&self, requirement: &Requirement) -> bool {
        self.index.contains_key(requirement.name())
    }

    /// Typed lookup. A value of another type is an error, never `None`.
    pub fn value_ref<T: Any>(&self, requirement: &Requirement) -> Result<&T, RequirementError> {
        let value = self.get(requirement).ok_or_else(|| RequirementError::NotBound {
            name: requirement.name().to_string(),
        })?;

        value
            .downcast_ref::<T>()
            .ok_or_else(|| RequirementError::WrongType {
                name: requirement.name().to_string(),
                expected: std::any::type_name::<T>().to_string(),
                actual: value.type_name().to_string(),
            })
    }

    pub fn value<T: Any + Clone>(&self, requirement: &Requirement) -> Result<T, RequirementError> {
        self.value_ref::<T>(requirement).cloned()
    }

    /// Returns the bound value, or `default()` when the requirement is not
    /// bound. `default` is not called otherwise.
    pub fn get_or_default<T, F>(
        &self,
        requirement: &Requirement,
        default: F,
    ) -> Result<T, RequirementError>
    where
        T: Any + Clone,
        F: FnOnce() -> T,
    {
        if self.contains(requirement) {
            self.value::<T>(requirement)
        } else {
            Ok(default())
        }
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

fn prune_dependencies(
    mut accepted: Vec<Binding>,
    failures: &mut Vec<RequirementError>,
) -> Vec<Binding> {
    loop {
        let present: HashSet<String> = accepted
            .iter()
            .map(|b| b.requirement.name().to_string())
            .collect();

        let (kept, pruned): (Vec<_>, Vec<_>) = accepted.into_iter().partition(|b| {
            b.requirement
                .depends_on()
                .iter()
                .all(|dep| present.contains(dep))
        });

        if pruned.is_empty() {
            return kept;
        }

        for binding in pruned {
            let missing = binding
                .requirement
                .depends_on()
                .iter()
                .filter(|dep| !present.contains(*dep))
                .cloned()
                .collect();
            failures.push(RequirementError::UnmetDependency {
                name: binding.requirement.name().to_string(),
                missing,
            });
        }
        accepted = kept;
    }
}

fn prune_conflicts(
    accepted: Vec<Binding>,
    failures: &mut Vec<RequirementError>,
) -> Vec<Binding> {
    // Conflicts are computed on one snapshot so both sides are removed.
    let present: HashSet<&str> = accepted.iter().map(|b| b.requirement.name()).collect();

    let conflicts: Vec<BTreeSet<String>> = accepted
        .iter()
        .map(|binding| {
            let name = binding.requirement.name();
            let declared = binding
                .requirement
                .exclusive_with()
                .iter()
                .filter(|other| other.as_str() != name && present.contains(other.as_str()))
                .cloned();
            let reverse = accepted
                .iter()
                .filter(|other| other.requirement.name() != name)
                .filter(|other| other.requirement.exclusive_with().iter().any(|n| n == name))
                .map(|other| other.requirement.name().to_string());
            declared.chain(reverse).collect()
        })
        .collect();

    let mut kept = Vec::with_capacity(accepted.len());
    for (binding, conflicts) in accepted.iter().zip(conflicts) {
        if conflicts.is_empty() {
            kept.push(binding.clone());
        } else {
            failures.push(RequirementError::Conflict {
                name: binding.requirement.name().to_string(),
                conflicts: conflicts.into_iter().collect(),
            });
        }
    }
    kept
}
