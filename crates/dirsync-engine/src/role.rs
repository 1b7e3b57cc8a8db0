//! The two directory roles and a pair container indexed by role.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Which side of the synchronisation a directory plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryRole {
    /// Authoritative upstream directory.
    Primary,
    /// Downstream directory kept in sync.
    Secondary,
}

impl DirectoryRole {
    /// Both roles, primary first.
    pub const ALL: [DirectoryRole; 2] = [DirectoryRole::Primary, DirectoryRole::Secondary];

    /// The opposite role.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            DirectoryRole::Primary => DirectoryRole::Secondary,
            DirectoryRole::Secondary => DirectoryRole::Primary,
        }
    }

    /// Lower-case name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            DirectoryRole::Primary => "primary",
            DirectoryRole::Secondary => "secondary",
        }
    }
}

impl fmt::Display for DirectoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per directory role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMap<T> {
    pub primary: T,
    pub secondary: T,
}

impl<T> RoleMap<T> {
    /// Create a pair.
    pub fn new(primary: T, secondary: T) -> Self {
        Self { primary, secondary }
    }

    /// Iterate `(role, value)` pairs, primary first.
    pub fn iter(&self) -> impl Iterator<Item = (DirectoryRole, &T)> {
        [
            (DirectoryRole::Primary, &self.primary),
            (DirectoryRole::Secondary, &self.secondary),
        ]
        .into_iter()
    }

    /// Transform both values.
    pub fn map<U>(self, mut f: impl FnMut(DirectoryRole, T) -> U) -> RoleMap<U> {
        RoleMap {
            primary: f(DirectoryRole::Primary, self.primary),
            secondary: f(DirectoryRole::Secondary, self.secondary),
        }
    }
}

impl<T> Index<DirectoryRole> for RoleMap<T> {
    type Output = T;

    fn index(&self, role: DirectoryRole) -> &T {
        match role {
            DirectoryRole::Primary => &self.primary,
            DirectoryRole::Secondary => &self.secondary,
        }
    }
}

impl<T> IndexMut<DirectoryRole> for RoleMap<T> {
    fn index_mut(&mut self, role: DirectoryRole) -> &mut T {
        match role {
            DirectoryRole::Primary => &mut self.primary,
            DirectoryRole::Secondary => &mut self.secondary,
        }
    }
}
