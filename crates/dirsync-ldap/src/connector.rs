//! LDAP directory over a blocking `ldap3` connection.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{LdapConn, LdapConnSettings, LdapResult, Mod, Scope, SearchEntry};
use secrecy::ExposeSecret;
use tracing::{debug, info, instrument, warn};

use dirsync_directory::{
    AttributeValue, ChangeOperation, ChangeRecord, Directory, DirectoryEntry, DirectoryError,
    DirectoryMutate, DirectoryResult, DirectorySearch, Filter, NewEntry, SearchResults,
};

use crate::config::LdapConfig;

/// LDAP result code for invalid credentials.
const RC_INVALID_CREDENTIALS: u32 = 49;

/// Entries requested per page. Below the default AD `MaxPageSize` of 1000.
const SEARCH_PAGE_SIZE: i32 = 500;

/// A bound LDAP connection acting as a [`Directory`].
pub struct LdapDirectory {
    name: String,
    config: LdapConfig,
    conn: LdapConn,
}

impl LdapDirectory {
    /// Connect and bind.
    ///
    /// # Errors
    /// `ConnectionFailed` when the server cannot be reached or the bind fails,
    /// `AuthenticationFailed` when the credentials are rejected.
    #[instrument(skip(config), fields(host = %config.host))]
    pub fn connect(name: &str, config: LdapConfig) -> DirectoryResult<Self> {
        config.validate()?;
        let url = config.url();

        debug!(url = %url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(config.connection_timeout_secs))
            .set_starttls(config.use_starttls)
            .set_no_tls_verify(!config.verify_tls);

        let mut conn = LdapConn::with_settings(settings, &url).map_err(|e| {
            DirectoryError::connection_failed_with_source(
                format!("Failed to connect to LDAP server at {url}"),
                e,
            )
        })?;

        let password = config.resolve_password()?;
        debug!(bind_dn = %config.bind_dn, "Performing LDAP bind");

        let result = conn
            .simple_bind(&config.bind_dn, password.expose_secret())
            .map_err(|e| {
                DirectoryError::connection_failed_with_source(
                    format!("LDAP bind failed for {}", config.bind_dn),
                    e,
                )
            })?;

        if result.rc != 0 {
            if result.rc == RC_INVALID_CREDENTIALS {
                return Err(DirectoryError::AuthenticationFailed);
            }
            return Err(DirectoryError::connection_failed(format!(
                "LDAP bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(host = %config.host, "LDAP connection established");

        Ok(Self {
            name: name.to_string(),
            config,
            conn,
        })
    }

    /// Unbind and drop the connection.
    pub fn close(mut self) {
        if let Err(e) = self.conn.unbind() {
            warn!(directory = %self.name, error = %e, "LDAP unbind failed");
        }
    }

    /// Convert an LDAP search entry into a [`DirectoryEntry`].
    ///
    /// Single values stay scalar; multiple values become an array. Values the
    /// server returned as non-UTF-8 are kept as binary.
    fn convert_entry(entry: SearchEntry) -> DirectoryEntry {
        let mut attributes = BTreeMap::new();

        for (name, mut values) in entry.attrs {
            let value = match values.len() {
                0 => continue,
                1 => AttributeValue::String(values.remove(0)),
                _ => AttributeValue::Array(values.into_iter().map(AttributeValue::String).collect()),
            };
            attributes.insert(name, value);
        }

        for (name, mut values) in entry.bin_attrs {
            let value = match values.len() {
                0 => continue,
                1 => AttributeValue::Binary(values.remove(0)),
                _ => AttributeValue::Array(values.into_iter().map(AttributeValue::Binary).collect()),
            };
            attributes.insert(name, value);
        }

        DirectoryEntry {
            dn: entry.dn,
            attributes,
        }
    }

    fn value_set(values: &[AttributeValue]) -> HashSet<Vec<u8>> {
        values.iter().flat_map(AttributeValue::to_byte_values).collect()
    }

    fn to_mod(op: &ChangeOperation) -> Mod<Vec<u8>> {
        let attribute = op.attribute().as_bytes().to_vec();
        let values = Self::value_set(op.values());
        match op {
            ChangeOperation::Add { .. } => Mod::Add(attribute, values),
            ChangeOperation::Delete { .. } => Mod::Delete(attribute, values),
            ChangeOperation::Replace { .. } => Mod::Replace(attribute, values),
        }
    }

    fn check_mutation(dn: &str, result: LdapResult) -> DirectoryResult<()> {
        if result.rc != 0 {
            return Err(DirectoryError::mutate_failed(
                dn,
                Some(result.rc),
                format!("code {}: {}", result.rc, result.text),
            ));
        }
        Ok(())
    }
}

impl DirectorySearch for LdapDirectory {
    #[instrument(skip(self, attributes), fields(directory = %self.name))]
    fn search(
        &mut self,
        base: &str,
        filter: &Filter,
        attributes: &[&str],
    ) -> DirectoryResult<SearchResults> {
        let ldap_filter = filter.to_string();
        debug!(base = %base, filter = %ldap_filter, "Searching LDAP");

        let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
            Box::new(EntriesOnly::new()),
            Box::new(PagedResults::new(SEARCH_PAGE_SIZE)),
        ];
        let mut stream = self
            .conn
            .streaming_search_with(adapters, base, Scope::Subtree, &ldap_filter, attributes.to_vec())
            .map_err(|e| DirectoryError::search_failed(base, &ldap_filter, None, e.to_string()))?;

        let mut entries = Vec::new();
        while let Some(entry) = stream
            .next()
            .map_err(|e| DirectoryError::search_failed(base, &ldap_filter, None, e.to_string()))?
        {
            entries.push(Self::convert_entry(SearchEntry::construct(entry)));
        }

        let status = stream.result();
        if status.rc != 0 {
            return Err(DirectoryError::search_failed(
                base,
                &ldap_filter,
                Some(status.rc),
                status.text,
            ));
        }

        debug!(count = entries.len(), "LDAP search completed");
        Ok(SearchResults::new(entries))
    }
}

impl DirectoryMutate for LdapDirectory {
    #[instrument(skip(self, entry), fields(directory = %self.name, dn = %entry.dn))]
    fn add(&mut self, entry: &NewEntry) -> DirectoryResult<()> {
        let mut attrs: Vec<(Vec<u8>, HashSet<Vec<u8>>)> = Vec::with_capacity(entry.attributes.len() + 1);

        if !entry.object_classes.is_empty() {
            attrs.push((
                b"objectClass".to_vec(),
                entry.object_classes.iter().map(|oc| oc.as_bytes().to_vec()).collect(),
            ));
        }

        for (name, value) in &entry.attributes {
            let values: HashSet<Vec<u8>> = value.to_byte_values().into_iter().collect();
            if !values.is_empty() {
                attrs.push((name.as_bytes().to_vec(), values));
            }
        }

        let result = self.conn.add(&entry.dn, attrs).map_err(|e| {
            DirectoryError::mutate_failed(&entry.dn, None, format!("add request failed: {e}"))
        })?;
        Self::check_mutation(&entry.dn, result)?;

        info!("LDAP entry created");
        Ok(())
    }

    #[instrument(skip(self, change), fields(directory = %self.name, dn = %change.dn))]
    fn modify(&mut self, change: &ChangeRecord) -> DirectoryResult<()> {
        if change.is_empty() {
            return Ok(());
        }

        let mods: Vec<Mod<Vec<u8>>> = change.operations.iter().map(Self::to_mod).collect();

        let result = self.conn.modify(&change.dn, mods).map_err(|e| {
            DirectoryError::mutate_failed(&change.dn, None, format!("modify request failed: {e}"))
        })?;
        Self::check_mutation(&change.dn, result)?;

        info!(attributes = ?change.attributes(), "LDAP entry updated");
        Ok(())
    }
}

impl Directory for LdapDirectory {
    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for LdapDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirectory")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
