//! Environment wrappers around a [`Directory`].
//!
//! - [`AuditedDirectory`] forwards everything and appends one JSON line per
//!   mutating call to an audit manifest. Failing to write the manifest is fatal.
//! - [`DryRunDirectory`] forwards searches and reports success for mutations
//!   without sending them.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

use crate::error::{DirectoryError, DirectoryResult};
use crate::operation::{AttributeValue, ChangeRecord, Filter, NewEntry};
use crate::traits::{Directory, DirectoryMutate, DirectorySearch, SearchResults};

const REDACTED: &str = "***REDACTED***";

fn default_sensitive_attributes() -> BTreeSet<String> {
    ["userpassword", "sambantpassword", "sambalmpassword", "unicodepwd"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Append-only JSON-lines log of every mutating directory call.
#[derive(Debug, Clone)]
pub struct AuditManifest {
    path: PathBuf,
    /// Lower-cased attribute names whose values are never written.
    sensitive_attributes: BTreeSet<String>,
}

impl AuditManifest {
    /// Create a manifest writer for `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sensitive_attributes: default_sensitive_attributes(),
        }
    }

    /// Redact an additional attribute.
    pub fn with_sensitive_attribute(mut self, attribute: &str) -> Self {
        self.sensitive_attributes.insert(attribute.to_ascii_lowercase());
        self
    }

    /// Path of the manifest file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether values of `attribute` are redacted.
    pub fn is_sensitive(&self, attribute: &str) -> bool {
        self.sensitive_attributes.contains(&attribute.to_ascii_lowercase())
    }

    /// Append one record as a single JSON line.
    ///
    /// # Errors
    /// Returns `ManifestWriteFailed` if the file cannot be opened or written.
    pub fn append(&self, record: &Value) -> DirectoryResult<()> {
        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            writeln!(file, "{record}")?;
            Ok(())
        };

        write().map_err(|source| DirectoryError::ManifestWriteFailed {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), "Audit manifest record appended");
        Ok(())
    }

    fn render_value(&self, attribute: &str, value: &AttributeValue) -> Value {
        if self.is_sensitive(attribute) {
            return Value::String(REDACTED.to_string());
        }
        match value {
            AttributeValue::String(s) => Value::String(s.clone()),
            AttributeValue::Integer(i) => json!(i),
            AttributeValue::Binary(b) => {
                Value::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
            AttributeValue::Array(arr) => Value::Array(
                arr.iter()
                    .map(|v| self.render_value(attribute, v))
                    .collect(),
            ),
        }
    }

    fn result_json(result: &DirectoryResult<()>) -> Value {
        match result {
            Ok(()) => json!({ "success": true, "code": 0, "message": "success" }),
            Err(err) => json!({
                "success": false,
                "code": err.result_code(),
                "message": err.to_string(),
            }),
        }
    }

    /// Build the record for an add call.
    pub fn add_record(&self, directory: &str, entry: &NewEntry, result: &DirectoryResult<()>) -> Value {
        let attributes: Map<String, Value> = entry
            .attributes
            .iter()
            .map(|(name, value)| (name.clone(), self.render_value(name, value)))
            .collect();

        json!({
            "date": Utc::now().to_rfc3339(),
            "directory": directory,
            "operation": "add",
            "dn": entry.dn,
            "entry": {
                "objectClass": entry.object_classes,
                "attributes": attributes,
            },
            "result": Self::result_json(result),
        })
    }

    /// Build the record for a modify call.
    pub fn modify_record(
        &self,
        directory: &str,
        change: &ChangeRecord,
        result: &DirectoryResult<()>,
    ) -> Value {
        let changes: Vec<Value> = change
            .operations
            .iter()
            .map(|op| {
                let values: Vec<Value> = op
                    .values()
                    .iter()
                    .map(|v| self.render_value(op.attribute(), v))
                    .collect();
                json!({ "op": op.kind(), "attribute": op.attribute(), "values": values })
            })
            .collect();

        json!({
            "date": Utc::now().to_rfc3339(),
            "directory": directory,
            "operation": "modify",
            "dn": change.dn,
            "changes": changes,
            "result": Self::result_json(result),
        })
    }
}

/// Production wrapper: every add/modify is recorded in the audit manifest.
#[derive(Debug)]
pub struct AuditedDirectory<D> {
    inner: D,
    manifest: AuditManifest,
}

impl<D: Directory> AuditedDirectory<D> {
    /// Wrap a directory.
    pub fn new(inner: D, manifest: AuditManifest) -> Self {
        Self { inner, manifest }
    }

    /// Unwrap the directory.
    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<D: Directory> DirectorySearch for AuditedDirectory<D> {
    fn search(
        &mut self,
        base: &str,
        filter: &Filter,
        attributes: &[&str],
    ) -> DirectoryResult<SearchResults> {
        self.inner.search(base, filter, attributes)
    }
}

impl<D: Directory> DirectoryMutate for AuditedDirectory<D> {
    #[instrument(skip(self, entry), fields(directory = %self.inner.name(), dn = %entry.dn))]
    fn add(&mut self, entry: &NewEntry) -> DirectoryResult<()> {
        let result = self.inner.add(entry);
        let record = self.manifest.add_record(self.inner.name(), entry, &result);
        self.manifest.append(&record)?;
        result
    }

    #[instrument(skip(self, change), fields(directory = %self.inner.name(), dn = %change.dn))]
    fn modify(&mut self, change: &ChangeRecord) -> DirectoryResult<()> {
        let result = self.inner.modify(change);
        let record = self.manifest.modify_record(self.inner.name(), change, &result);
        self.manifest.append(&record)?;
        result
    }
}

impl<D: Directory> Directory for AuditedDirectory<D> {
    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// No-op wrapper: reads are live, writes are logged and skipped.
#[derive(Debug)]
pub struct DryRunDirectory<D> {
    inner: D,
}

impl<D: Directory> DryRunDirectory<D> {
    /// Wrap a directory.
    pub fn new(inner: D) -> Self {
        Self { inner }
    }

    /// Unwrap the directory.
    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<D: Directory> DirectorySearch for DryRunDirectory<D> {
    fn search(
        &mut self,
        base: &str,
        filter: &Filter,
        attributes: &[&str],
    ) -> DirectoryResult<SearchResults> {
        self.inner.search(base, filter, attributes)
    }
}

impl<D: Directory> DirectoryMutate for DryRunDirectory<D> {
    fn add(&mut self, entry: &NewEntry) -> DirectoryResult<()> {
        info!(
            directory = %self.inner.name(),
            dn = %entry.dn,
            "Dry run: add not sent"
        );
        Ok(())
    }

    fn modify(&mut self, change: &ChangeRecord) -> DirectoryResult<()> {
        info!(
            directory = %self.inner.name(),
            dn = %change.dn,
            attributes = ?change.attributes(),
            "Dry run: modify not sent"
        );
        Ok(())
    }
}

impl<D: Directory> Directory for DryRunDirectory<D> {
    fn name(&self) -> &str {
        self.inner.name()
    }
}
