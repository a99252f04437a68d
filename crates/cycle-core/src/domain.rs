//! The two image domains of an unpaired translation problem.

use serde::{Deserialize, Serialize};

/// One side of the A ↔ B translation.
///
/// `G_A` maps A→B and is judged by `D_A`; `G_B` maps B→A and is judged
/// by `D_B`.
///
/// # Example
///
/// ```
/// use cycle_core::Domain;
///
/// assert_eq!(Domain::A.other(), Domain::B);
/// assert_eq!(Domain::B.label(), "B");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Domain {
    /// Source domain of `G_A`.
    A,
    /// Source domain of `G_B`.
    B,
}

impl Domain {
    /// Both domains, A first.
    pub const ALL: [Domain; 2] = [Domain::A, Domain::B];

    /// Returns the opposite domain.
    pub fn other(&self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Returns a one-letter label used in file names and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
