//! Nested group flattening for the primary directory.
//!
//! Member references are classified through an [`ObjectLookup`] and expanded
//! with an explicit work stack. A group already expanded for the current root
//! is never expanded again, which bounds membership cycles.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, instrument, warn};

use dirsync_directory::{Directory, DirectorySearch, Filter};

use crate::config::DirectorySchema;
use crate::error::EngineResult;

/// What a member reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    User,
    Group,
    Unknown,
}

/// Classification of one reference, with its members when it is a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub kind: ObjectKind,
    pub members: Vec<String>,
}

impl ObjectInfo {
    pub fn user() -> Self {
        Self {
            kind: ObjectKind::User,
            members: Vec::new(),
        }
    }

    pub fn group(members: Vec<String>) -> Self {
        Self {
            kind: ObjectKind::Group,
            members,
        }
    }

    pub fn unknown() -> Self {
        Self {
            kind: ObjectKind::Unknown,
            members: Vec::new(),
        }
    }
}

/// Classifies member references.
pub trait ObjectLookup {
    /// Classify `reference`.
    ///
    /// # Errors
    /// A failed directory search is fatal and propagates.
    fn lookup(&mut self, reference: &str) -> EngineResult<ObjectInfo>;
}

/// [`ObjectLookup`] backed by the primary directory, memoised per run.
pub struct DirectoryObjectLookup<'a> {
    directory: &'a mut dyn Directory,
    schema: &'a DirectorySchema,
    cache: &'a mut HashMap<String, ObjectInfo>,
}

impl<'a> DirectoryObjectLookup<'a> {
    pub fn new(
        directory: &'a mut dyn Directory,
        schema: &'a DirectorySchema,
        cache: &'a mut HashMap<String, ObjectInfo>,
    ) -> Self {
        Self {
            directory,
            schema,
            cache,
        }
    }
}

impl ObjectLookup for DirectoryObjectLookup<'_> {
    fn lookup(&mut self, reference: &str) -> EngineResult<ObjectInfo> {
        if let Some(info) = self.cache.get(reference) {
            return Ok(info.clone());
        }

        let objects = &self.schema.objects;
        let members_attribute = objects.group.members.as_str();
        let mut results = self.directory.search(
            &self.schema.base,
            &Filter::eq("distinguishedName", reference),
            &["objectClass", members_attribute],
        )?;

        let info = match results.next() {
            Some(entry) if entry.has_object_class(&objects.user.obj_class) => ObjectInfo::user(),
            Some(entry) if entry.has_object_class(&objects.group.obj_class) => {
                let members = entry
                    .get_strings(members_attribute)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                ObjectInfo::group(members)
            }
            _ => ObjectInfo::unknown(),
        };

        self.cache.insert(reference.to_string(), info.clone());
        Ok(info)
    }
}

/// Result of flattening one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlattenedGroup {
    /// User references reachable from the root.
    pub members: BTreeSet<String>,
    /// Group references skipped because they were already expanded.
    pub cycles_detected: usize,
    /// References that are neither users nor groups.
    pub unknown: Vec<String>,
}

/// Expand `members` of the group at `root_dn` into user references.
#[instrument(skip(members, lookup), fields(group = %root_dn))]
pub fn flatten_group<'m, I>(
    root_dn: &str,
    members: I,
    lookup: &mut dyn ObjectLookup,
) -> EngineResult<FlattenedGroup>
where
    I: IntoIterator<Item = &'m String>,
{
    let mut flattened = FlattenedGroup::default();
    let mut visited: HashSet<String> = HashSet::from([root_dn.to_lowercase()]);
    let mut stack: Vec<String> = members.into_iter().cloned().collect();
    stack.reverse();

    while let Some(reference) = stack.pop() {
        let info = lookup.lookup(&reference)?;
        match info.kind {
            ObjectKind::User => {
                flattened.members.insert(reference);
            }
            ObjectKind::Group => {
                if visited.insert(reference.to_lowercase()) {
                    stack.extend(info.members.into_iter().rev());
                } else {
                    debug!(nested = %reference, "Group already expanded, skipping");
                    flattened.cycles_detected += 1;
                }
            }
            ObjectKind::Unknown => {
                warn!(member = %reference, "Member of unexpected type, skipping");
                flattened.unknown.push(reference);
            }
        }
    }

    debug!(
        members = flattened.members.len(),
        cycles = flattened.cycles_detected,
        "Group flattened"
    );
    Ok(flattened)
}
