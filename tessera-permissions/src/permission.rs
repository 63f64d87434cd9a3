//! Permission types and the 128-bit permission set
//!
//! Every [`PermissionType`] owns exactly one bit slot. Aliases share the slot
//! of their canonical permission and are never reported back on enumeration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Number of bit slots available to permission types
pub const PERMISSION_SLOTS: u8 = 128;

/// Atomic rights that can be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionType {
    Read,
    Create,
    Edit,
    Delete,
    /// Alias of [`PermissionType::Delete`]
    SoftDelete,
    Publish,
    Share,
    Comment,
    Export,
    ManageMembers,
    ManagePermissions,
    Admin,
}

impl PermissionType {
    /// Every variant, aliases included
    pub const ALL: [PermissionType; 12] = [
        PermissionType::Read,
        PermissionType::Create,
        PermissionType::Edit,
        PermissionType::Delete,
        PermissionType::SoftDelete,
        PermissionType::Publish,
        PermissionType::Share,
        PermissionType::Comment,
        PermissionType::Export,
        PermissionType::ManageMembers,
        PermissionType::ManagePermissions,
        PermissionType::Admin,
    ];

    /// Bit slot of this permission (0..128)
    pub const fn bit(self) -> u8 {
        match self {
            PermissionType::Read => 0,
            PermissionType::Create => 1,
            PermissionType::Edit => 2,
            PermissionType::Delete | PermissionType::SoftDelete => 3,
            PermissionType::Publish => 4,
            PermissionType::Share => 5,
            PermissionType::Comment => 6,
            PermissionType::Export => 7,
            PermissionType::ManageMembers => 8,
            PermissionType::ManagePermissions => 9,
            // First slot of the second word
            PermissionType::Admin => 64,
        }
    }

    /// The logical permission this variant stands for
    pub const fn canonical(self) -> PermissionType {
        match self {
            PermissionType::SoftDelete => PermissionType::Delete,
            other => other,
        }
    }

    pub fn is_alias(self) -> bool {
        self.canonical() != self
    }

    /// Variants that are not aliases, in declaration order
    pub fn canonical_types() -> impl Iterator<Item = PermissionType> {
        Self::ALL.into_iter().filter(|p| !p.is_alias())
    }

    const fn mask(self) -> u128 {
        1u128 << self.bit()
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PermissionType::Read => "read",
            PermissionType::Create => "create",
            PermissionType::Edit => "edit",
            PermissionType::Delete => "delete",
            PermissionType::SoftDelete => "soft_delete",
            PermissionType::Publish => "publish",
            PermissionType::Share => "share",
            PermissionType::Comment => "comment",
            PermissionType::Export => "export",
            PermissionType::ManageMembers => "manage_members",
            PermissionType::ManagePermissions => "manage_permissions",
            PermissionType::Admin => "admin",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for PermissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|p| p.to_string() == normalized)
            .ok_or_else(|| format!("Unknown permission: {}", s))
    }
}

/// Two-word storage form of a [`PermissionSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionWords {
    pub flags1: u64,
    pub flags2: u64,
}

/// Fixed-size set of permissions backed by a single 128-bit mask
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "PermissionWords", into = "PermissionWords")]
pub struct PermissionSet(u128);

impl PermissionSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Rebuild a set from its persisted words
    pub const fn from_words(flags1: u64, flags2: u64) -> Self {
        Self(((flags2 as u128) << 64) | flags1 as u128)
    }

    /// Low word: bit slots 0..64
    pub const fn flags1(&self) -> u64 {
        self.0 as u64
    }

    /// High word: bit slots 64..128
    pub const fn flags2(&self) -> u64 {
        (self.0 >> 64) as u64
    }

    pub const fn bits(&self) -> u128 {
        self.0
    }

    pub fn add(&mut self, permission: PermissionType) {
        self.0 |= permission.mask();
    }

    pub fn remove(&mut self, permission: PermissionType) {
        self.0 &= !permission.mask();
    }

    pub fn contains(&self, permission: PermissionType) -> bool {
        self.0 & permission.mask() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: PermissionSet) -> PermissionSet {
        Self(self.0 | other.0)
    }

    /// Distinct logical permissions held by this set
    pub fn iter(&self) -> impl Iterator<Item = PermissionType> + '_ {
        PermissionType::canonical_types().filter(move |p| self.contains(*p))
    }

    pub fn permissions(&self) -> BTreeSet<PermissionType> {
        self.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }
}

impl From<PermissionWords> for PermissionSet {
    fn from(words: PermissionWords) -> Self {
        Self::from_words(words.flags1, words.flags2)
    }
}

impl From<PermissionSet> for PermissionWords {
    fn from(set: PermissionSet) -> Self {
        Self {
            flags1: set.flags1(),
            flags2: set.flags2(),
        }
    }
}

impl FromIterator<PermissionType> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = PermissionType>>(iter: I) -> Self {
        let mut set = Self::empty();
        set.extend(iter);
        set
    }
}

impl Extend<PermissionType> for PermissionSet {
    fn extend<I: IntoIterator<Item = PermissionType>>(&mut self, iter: I) {
        for permission in iter {
            self.add(permission);
        }
    }
}

impl fmt::Debug for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|p| p.to_string()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
