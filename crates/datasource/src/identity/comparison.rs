//! Flag set describing the outcome of comparing two items.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Serialize, Serializer};

/// Result of [`UniquelyIdentifiable::compare`](super::UniquelyIdentifiable::compare).
///
/// The flags are independent. `INVALIDATING` may be combined with any other
/// result and means that cached or derived state keyed on the compared item
/// can no longer be trusted, whether or not the content matched.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ComparisonResults(u8);

impl ComparisonResults {
    pub const EXACT: Self = Self(1);
    pub const EQUIVALENT: Self = Self(2);
    pub const INVALIDATING: Self = Self(4);
    pub const DIFFERENT: Self = Self(8);

    /// Same identity and equal content.
    pub const MATCH: Self = Self(Self::EXACT.0 | Self::EQUIVALENT.0);
    /// Different identity but equal content.
    pub const DIFFERENT_BUT_EQUIVALENT: Self = Self(Self::DIFFERENT.0 | Self::EQUIVALENT.0);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_match(self) -> bool {
        self.contains(Self::MATCH)
    }

    pub const fn is_different(self) -> bool {
        self.contains(Self::DIFFERENT)
    }

    pub const fn is_equivalent(self) -> bool {
        self.contains(Self::EQUIVALENT)
    }

    pub const fn is_invalidating(self) -> bool {
        self.contains(Self::INVALIDATING)
    }
}

impl BitOr for ComparisonResults {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ComparisonResults {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ComparisonResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComparisonResults({})", self)
    }
}

impl fmt::Display for ComparisonResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        let mut rest = *self;

        // Composite names first so MATCH is not printed as EXACT | EQUIVALENT.
        if rest.contains(Self::MATCH) {
            names.push("Match");
            rest = Self(rest.0 & !Self::MATCH.0);
        }
        if rest.contains(Self::DIFFERENT_BUT_EQUIVALENT) {
            names.push("DifferentButEquivalent");
            rest = Self(rest.0 & !Self::DIFFERENT_BUT_EQUIVALENT.0);
        }
        for (flag, name) in [
            (Self::EXACT, "Exact"),
            (Self::EQUIVALENT, "Equivalent"),
            (Self::DIFFERENT, "Different"),
            (Self::INVALIDATING, "Invalidating"),
        ] {
            if rest.contains(flag) {
                names.push(name);
            }
        }

        if names.is_empty() {
            write!(f, "None")
        } else {
            write!(f, "{}", names.join(" | "))
        }
    }
}

impl Serialize for ComparisonResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
