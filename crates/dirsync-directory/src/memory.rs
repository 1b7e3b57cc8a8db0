//! In-memory directory.
//!
//! Holds entries in a map keyed by lower-cased DN and evaluates [`Filter`]s
//! locally. Used as the directory double in tests and for offline
//! experiments with a configuration. Mutations follow LDAP result-code
//! semantics closely enough for the engine's error handling to be exercised.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::dn::is_within;
use crate::error::{DirectoryError, DirectoryResult};
use crate::operation::{AttributeValue, ChangeOperation, ChangeRecord, DirectoryEntry, Filter, NewEntry};
use crate::traits::{Directory, DirectoryMutate, DirectorySearch, SearchResults};

// LDAP result codes reported by the in-memory directory.
const RC_OPERATIONS_ERROR: u32 = 1;
const RC_NO_SUCH_ATTRIBUTE: u32 = 16;
const RC_ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INSUFFICIENT_ACCESS: u32 = 50;
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;

/// A mutation that was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// An entry was created.
    Add(NewEntry),
    /// An entry was modified.
    Modify(ChangeRecord),
}

impl Mutation {
    /// DN targeted by the mutation.
    pub fn dn(&self) -> &str {
        match self {
            Mutation::Add(entry) => &entry.dn,
            Mutation::Modify(change) => &change.dn,
        }
    }
}

/// A directory living entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    name: String,
    entries: BTreeMap<String, DirectoryEntry>,
    failing_dns: HashSet<String>,
    fail_searches: bool,
    mutations: Vec<Mutation>,
    search_count: usize,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add an entry using builder pattern.
    pub fn with_entry(mut self, entry: DirectoryEntry) -> Self {
        self.insert(entry);
        self
    }

    /// Insert or overwrite an entry.
    pub fn insert(&mut self, entry: DirectoryEntry) {
        self.entries.insert(entry.dn.to_ascii_lowercase(), entry);
    }

    /// Look up an entry by DN (case-insensitive).
    pub fn entry(&self, dn: &str) -> Option<&DirectoryEntry> {
        self.entries.get(&dn.to_ascii_lowercase())
    }

    /// All entries, ordered by lower-cased DN.
    pub fn entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.values()
    }

    /// Reject every mutation targeting `dn` with insufficient access.
    pub fn fail_mutations_on(&mut self, dn: &str) {
        self.failing_dns.insert(dn.to_ascii_lowercase());
    }

    /// Make every subsequent search fail.
    pub fn fail_searches(&mut self, fail: bool) {
        self.fail_searches = fail;
    }

    /// Mutations applied so far, in order.
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Number of searches served so far.
    pub fn search_count(&self) -> usize {
        self.search_count
    }

    fn check_writable(&self, dn: &str) -> DirectoryResult<()> {
        if self.failing_dns.contains(&dn.to_ascii_lowercase()) {
            return Err(DirectoryError::mutate_failed(
                dn,
                Some(RC_INSUFFICIENT_ACCESS),
                "insufficient access rights",
            ));
        }
        Ok(())
    }
}

/// Split an attribute value into its individual values.
fn explode(value: AttributeValue) -> Vec<AttributeValue> {
    match value {
        AttributeValue::Array(values) => values,
        single => vec![single],
    }
}

/// Collapse individual values back into an attribute value.
fn collapse(mut values: Vec<AttributeValue>) -> Option<AttributeValue> {
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(AttributeValue::Array(values)),
    }
}

/// Lower-cased text of every value, for case-insensitive matching.
fn folded_texts(value: &AttributeValue) -> Vec<String> {
    value
        .to_byte_values()
        .iter()
        .map(|bytes| String::from_utf8_lossy(bytes).to_lowercase())
        .collect()
}

fn same_value(a: &AttributeValue, b: &AttributeValue) -> bool {
    folded_texts(a) == folded_texts(b)
}

fn is_dn_attribute(attribute: &str) -> bool {
    attribute.eq_ignore_ascii_case("distinguishedName") || attribute.eq_ignore_ascii_case("dn")
}

fn matches(entry: &DirectoryEntry, filter: &Filter) -> bool {
    match filter {
        Filter::And { filters } => filters.iter().all(|f| matches(entry, f)),
        Filter::Present { attribute } => is_dn_attribute(attribute) || entry.has(attribute),
        Filter::Equals { attribute, value } => {
            let wanted = value.to_lowercase();
            if is_dn_attribute(attribute) && !entry.has(attribute) {
                return entry.dn.to_lowercase() == wanted;
            }
            entry
                .get(attribute)
                .is_some_and(|v| folded_texts(v).iter().any(|t| *t == wanted))
        }
        Filter::StartsWith { attribute, value } => {
            let prefix = value.to_lowercase();
            if is_dn_attribute(attribute) && !entry.has(attribute) {
                return entry.dn.to_lowercase().starts_with(&prefix);
            }
            entry
                .get(attribute)
                .is_some_and(|v| folded_texts(v).iter().any(|t| t.starts_with(&prefix)))
        }
    }
}

fn project(entry: &DirectoryEntry, attributes: &[&str]) -> DirectoryEntry {
    if attributes.is_empty() || attributes.contains(&"*") {
        return entry.clone();
    }
    DirectoryEntry {
        dn: entry.dn.clone(),
        attributes: entry
            .attributes
            .iter()
            .filter(|(name, _)| attributes.iter().any(|a| a.eq_ignore_ascii_case(name)))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    }
}

/// Find the stored attribute name matching `attribute` case-insensitively.
fn stored_name(entry: &DirectoryEntry, attribute: &str) -> String {
    entry
        .attributes
        .keys()
        .find(|k| k.eq_ignore_ascii_case(attribute))
        .cloned()
        .unwrap_or_else(|| attribute.to_string())
}

fn apply_operation(entry: &mut DirectoryEntry, op: &ChangeOperation) -> Result<(), (u32, String)> {
    let name = stored_name(entry, op.attribute());
    let current = entry.attributes.remove(&name).map(explode).unwrap_or_default();

    let updated = match op {
        ChangeOperation::Replace { values, .. } => values.clone(),
        ChangeOperation::Add { values, .. } => {
            let mut merged = current;
            for value in values {
                if merged.iter().any(|v| same_value(v, value)) {
                    return Err((
                        RC_ATTRIBUTE_OR_VALUE_EXISTS,
                        format!("value already present in '{name}'"),
                    ));
                }
                merged.push(value.clone());
            }
            merged
        }
        ChangeOperation::Delete { values, .. } => {
            if current.is_empty() {
                return Err((RC_NO_SUCH_ATTRIBUTE, format!("no attribute '{name}'")));
            }
            if values.is_empty() {
                Vec::new()
            } else {
                let mut remaining = current;
                for value in values {
                    let before = remaining.len();
                    remaining.retain(|v| !same_value(v, value));
                    if remaining.len() == before {
                        return Err((
                            RC_NO_SUCH_ATTRIBUTE,
                            format!("value not present in '{name}'"),
                        ));
                    }
                }
                remaining
            }
        }
    };

    if let Some(value) = collapse(updated) {
        entry.attributes.insert(name, value);
    }
    Ok(())
}

impl DirectorySearch for MemoryDirectory {
    fn search(
        &mut self,
        base: &str,
        filter: &Filter,
        attributes: &[&str],
    ) -> DirectoryResult<SearchResults> {
        self.search_count += 1;
        if self.fail_searches {
            return Err(DirectoryError::search_failed(
                base,
                filter.to_string(),
                Some(RC_OPERATIONS_ERROR),
                "search disabled",
            ));
        }

        let found: Vec<DirectoryEntry> = self
            .entries
            .values()
            .filter(|entry| is_within(&entry.dn, base) && matches(entry, filter))
            .map(|entry| project(entry, attributes))
            .collect();

        debug!(
            directory = %self.name,
            base = %base,
            filter = %filter,
            count = found.len(),
            "Memory search"
        );
        Ok(SearchResults::new(found))
    }
}

impl DirectoryMutate for MemoryDirectory {
    fn add(&mut self, entry: &NewEntry) -> DirectoryResult<()> {
        self.check_writable(&entry.dn)?;

        let key = entry.dn.to_ascii_lowercase();
        if self.entries.contains_key(&key) {
            return Err(DirectoryError::mutate_failed(
                &entry.dn,
                Some(RC_ENTRY_ALREADY_EXISTS),
                "entry already exists",
            ));
        }

        let mut stored = DirectoryEntry::new(&entry.dn);
        if !entry.object_classes.is_empty() {
            stored
                .attributes
                .insert("objectClass".to_string(), entry.object_classes.clone().into());
        }
        for (name, value) in &entry.attributes {
            stored.attributes.insert(name.clone(), value.clone());
        }

        self.entries.insert(key, stored);
        self.mutations.push(Mutation::Add(entry.clone()));
        Ok(())
    }

    fn modify(&mut self, change: &ChangeRecord) -> DirectoryResult<()> {
        self.check_writable(&change.dn)?;

        let key = change.dn.to_ascii_lowercase();
        let Some(existing) = self.entries.get(&key) else {
            return Err(DirectoryError::mutate_failed(
                &change.dn,
                Some(RC_NO_SUCH_OBJECT),
                "no such object",
            ));
        };

        // Operations apply atomically: work on a copy.
        let mut updated = existing.clone();
        for op in &change.operations {
            apply_operation(&mut updated, op)
                .map_err(|(code, message)| DirectoryError::mutate_failed(&change.dn, Some(code), message))?;
        }

        self.entries.insert(key, updated);
        self.mutations.push(Mutation::Modify(change.clone()));
        Ok(())
    }
}

impl Directory for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> MemoryDirectory {
        MemoryDirectory::new("primary")
            .with_entry(
                DirectoryEntry::new("CN=HR,OU=Groups,DC=ex,DC=com")
                    .with("objectClass", vec!["top", "group"])
                    .with("cn", "HR")
                    .with("gidNumber", "1186")
                    .with("member", vec!["CN=John Doe,OU=Users,DC=ex,DC=com"]),
            )
            .with_entry(
                DirectoryEntry::new("CN=John Doe,OU=Users,DC=ex,DC=com")
                    .with("objectClass", vec!["top", "person", "user"])
                    .with("sAMAccountName", "JohnD")
                    .with("userAccountControl", AttributeValue::Integer(512)),
            )
    }

    // --- search ---

    #[test]
    fn test_search_scoped_to_base() {
        let mut dir = directory();
        let found: Vec<_> = dir
            .search("OU=Users,DC=ex,DC=com", &Filter::present("objectClass"), &[])
            .unwrap()
            .collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].dn, "CN=John Doe,OU=Users,DC=ex,DC=com");
    }

    #[test]
    fn test_search_case_insensitive_values() {
        let mut dir = directory();
        let filter = Filter::and(vec![
            Filter::object_class("user"),
            Filter::eq("samaccountname", "johnd"),
        ]);
        assert_eq!(dir.search("DC=ex,DC=com", &filter, &[]).unwrap().count(), 1);
    }

    #[test]
    fn test_search_integer_values_match_as_text() {
        let mut dir = directory();
        let filter = Filter::eq("userAccountControl", "512");
        assert_eq!(dir.search("DC=ex,DC=com", &filter, &[]).unwrap().count(), 1);
    }

    #[test]
    fn test_search_by_distinguished_name() {
        let mut dir = directory();
        let filter = Filter::eq("distinguishedName", "cn=hr,ou=groups,dc=ex,dc=com");
        let found: Vec<_> = dir.search("DC=ex,DC=com", &filter, &[]).unwrap().collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get_string("cn"), Some("HR"));
    }

    #[test]
    fn test_search_projects_attributes() {
        let mut dir = directory();
        let found: Vec<_> = dir
            .search("DC=ex,DC=com", &Filter::object_class("group"), &["cn", "GIDNUMBER"])
            .unwrap()
            .collect();
        assert_eq!(found[0].attributes.len(), 2);
        assert!(found[0].has("gidNumber"));
        assert!(!found[0].has("member"));
    }

    #[test]
    fn test_search_and_starts_with() {
        let mut dir = directory();
        let filter = Filter::and(vec![
            Filter::starts_with("cn", "h"),
            Filter::object_class("group"),
        ]);
        assert_eq!(dir.search("DC=ex,DC=com", &filter, &[]).unwrap().count(), 1);
        assert_eq!(dir.search_count(), 1);
    }

    #[test]
    fn test_search_failure_injection() {
        let mut dir = directory();
        dir.fail_searches(true);
        let err = dir
            .search("DC=ex,DC=com", &Filter::present("cn"), &[])
            .unwrap_err();
        assert!(err.is_fatal());
    }

    // --- add ---

    #[test]
    fn test_add_entry() {
        let mut dir = MemoryDirectory::new("secondary");
        let entry = NewEntry::new("cn=hr,ou=Group,dc=ex", vec!["posixGroup".to_string()])
            .with_attribute("gidNumber", AttributeValue::Integer(1186));
        dir.add(&entry).unwrap();

        let stored = dir.entry("CN=HR,ou=Group,dc=ex").unwrap();
        assert!(stored.has_object_class("posixGroup"));
        assert_eq!(stored.get_i64("gidNumber"), Some(1186));
        assert_eq!(dir.mutations().len(), 1);
        assert_eq!(dir.mutations()[0].dn(), "cn=hr,ou=Group,dc=ex");
    }

    #[test]
    fn test_add_existing_entry_fails() {
        let mut dir = directory();
        let err = dir
            .add(&NewEntry::new("cn=hr,ou=groups,dc=ex,dc=com", vec![]))
            .unwrap_err();
        assert_eq!(err.result_code(), Some(68));
        assert!(!err.is_fatal());
    }

    // --- modify ---

    #[test]
    fn test_modify_add_and_delete_values() {
        let mut dir = directory();
        let dn = "CN=HR,OU=Groups,DC=ex,DC=com";
        dir.modify(&ChangeRecord::new(dn).with(ChangeOperation::add(
            "member",
            vec!["CN=Jane Roe,OU=Users,DC=ex,DC=com".into()],
        )))
        .unwrap();
        dir.modify(&ChangeRecord::new(dn).with(ChangeOperation::delete(
            "member",
            vec!["cn=john doe,ou=users,dc=ex,dc=com".into()],
        )))
        .unwrap();

        assert_eq!(
            dir.entry(dn).unwrap().get("member"),
            Some(&AttributeValue::from("CN=Jane Roe,OU=Users,DC=ex,DC=com"))
        );
    }

    #[test]
    fn test_modify_replace_and_clear() {
        let mut dir = directory();
        let dn = "CN=John Doe,OU=Users,DC=ex,DC=com";
        dir.modify(
            &ChangeRecord::new(dn)
                .with(ChangeOperation::replace("userAccountControl", vec!["514".into()]))
                .with(ChangeOperation::replace("description", vec![])),
        )
        .unwrap();

        let entry = dir.entry(dn).unwrap();
        assert_eq!(entry.get_i64("userAccountControl"), Some(514));
        assert!(!entry.has("description"));
    }

    #[test]
    fn test_modify_is_atomic() {
        let mut dir = directory();
        let dn = "CN=HR,OU=Groups,DC=ex,DC=com";
        let err = dir
            .modify(
                &ChangeRecord::new(dn)
                    .with(ChangeOperation::replace("cn", vec!["Changed".into()]))
                    .with(ChangeOperation::delete("member", vec!["cn=nobody".into()])),
            )
            .unwrap_err();

        assert_eq!(err.result_code(), Some(16));
        assert_eq!(dir.entry(dn).unwrap().get_string("cn"), Some("HR"));
        assert!(dir.mutations().is_empty());
    }

    #[test]
    fn test_modify_duplicate_value_fails() {
        let mut dir = directory();
        let err = dir
            .modify(&ChangeRecord::new("CN=HR,OU=Groups,DC=ex,DC=com").with(ChangeOperation::add(
                "member",
                vec!["CN=John Doe,OU=Users,DC=ex,DC=com".into()],
            )))
            .unwrap_err();
        assert_eq!(err.result_code(), Some(20));
    }

    #[test]
    fn test_modify_missing_entry() {
        let mut dir = directory();
        let err = dir
            .modify(&ChangeRecord::new("cn=ghost,dc=ex,dc=com"))
            .unwrap_err();
        assert_eq!(err.result_code(), Some(32));
    }

    #[test]
    fn test_injected_mutation_failure() {
        let mut dir = directory();
        dir.fail_mutations_on("cn=hr,ou=groups,dc=ex,dc=com");
        let err = dir
            .modify(&ChangeRecord::new("CN=HR,OU=Groups,DC=ex,DC=com"))
            .unwrap_err();
        assert_eq!(err.result_code(), Some(50));
    }
}
