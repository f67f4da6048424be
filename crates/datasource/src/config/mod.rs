//! Requirement declaration and binding.
//!
//! A factory declares the [`Requirement`]s it needs; callers supply
//! [`Bindings`] (by hand or from JSON); [`BoundConfiguration::bind`] checks
//! types, validators, dependencies and exclusivity and returns either a
//! configuration or every failure at once.

pub mod binding;
pub mod requirement;
pub mod value;

pub use binding::{Binding, Bindings, BoundConfiguration};
pub use requirement::{
    Requirement, RequirementBuilder, RequirementDescriptor, RequirementType, Validator,
};
pub use value::ConfigValue;

use crate::error::ValidationFailures;

/// Something that declares the parameters it needs before it can be used.
pub trait Configurable {
    fn requirements(&self) -> Vec<Requirement>;

    fn configure(&self, bindings: &Bindings) -> Result<BoundConfiguration, ValidationFailures> {
        BoundConfiguration::bind(&self.requirements(), bindings)
    }

    fn describe_requirements(&self) -> Vec<RequirementDescriptor> {
        self.requirements().iter().map(Requirement::describe).collect()
    }
}
