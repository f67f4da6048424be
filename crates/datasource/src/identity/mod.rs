//! Identity and comparison model shared by every data source item.
//!
//! Items expose an opaque [`UniqueIdentifier`] and a [`compare`] operation that
//! reports whether two items are the same logical thing, whether their content
//! is equivalent, and whether cached state derived from them must be dropped.
//!
//! [`compare`]: UniquelyIdentifiable::compare

pub mod comparison;
pub mod path;
pub mod wrapper;

use std::any::Any;
use std::fmt;

pub use comparison::ComparisonResults;
pub use path::FilePath;
pub use wrapper::{HashIdentity, IdentityWrapper};

/// An opaque identity token.
///
/// Two identifiers are equal only if they are of a compatible kind and
/// represent the same logical item.
pub trait UniqueIdentifier: fmt::Debug + Send + Sync + 'static {
    fn equals(&self, other: &dyn UniqueIdentifier) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// An item that can be identified and compared against other items.
pub trait UniquelyIdentifiable: Send + Sync + 'static {
    fn identifier(&self) -> &dyn UniqueIdentifier;

    /// Compares this item against `other`. A missing `other` is always
    /// [`ComparisonResults::DIFFERENT`].
    fn compare(&self, other: Option<&dyn UniquelyIdentifiable>) -> ComparisonResults;

    fn as_any(&self) -> &dyn Any;
}
