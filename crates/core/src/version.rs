//! Migration version identifier
//!
//! Versions are timestamp-like integers, unique by construction and
//! strictly increasing in authorship order. `ZERO` is the sentinel for a
//! target with no recorded migrations, which is not the same thing as a
//! target with no migrations on disk.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct MigrationVersion(pub i64);

impl MigrationVersion {
    pub const ZERO: MigrationVersion = MigrationVersion(0);

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MigrationVersion {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(MigrationVersion)
    }
}

impl From<i64> for MigrationVersion {
    fn from(raw: i64) -> Self {
        MigrationVersion(raw)
    }
}
