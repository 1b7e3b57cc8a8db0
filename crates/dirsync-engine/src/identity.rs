//! User identity resolution across directories.
//!
//! A primary member reference (a DN) is resolved to the login of exactly one
//! secondary account, honouring the exception table. Resolution never fails:
//! every problem is logged, recorded in the run status, and answered with
//! [`ResolvedIdentity::unknown`].

use std::collections::HashMap;

use tracing::{debug, instrument, warn};

use dirsync_directory::dn::split_leading_rdn;
use dirsync_directory::{Directory, DirectoryEntry, DirectorySearch, Filter};

use crate::config::SyncConfig;
use crate::role::DirectoryRole;
use crate::session::RunStatus;
use crate::snapshot::canonical_key;
use crate::tables::{ExceptionTable, ExceptionTarget};

/// Primary account-control codes of a disabled account.
pub const DISABLED_ACCOUNT_CODES: [i64; 2] = [514, 66050];

const PHASE: &str = "resolve_identity";

/// A resolved user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// Secondary login; empty when unresolved.
    pub canonical_id: String,
    pub country_code: Option<String>,
    pub account_active: bool,
}

impl ResolvedIdentity {
    /// The sentinel returned for anything that could not be resolved.
    pub fn unknown() -> Self {
        Self {
            canonical_id: String::new(),
            country_code: None,
            account_active: false,
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        !self.canonical_id.is_empty()
    }
}

/// Whether an account-control code means "active".
#[must_use]
pub fn is_account_active(account_control: i64) -> bool {
    !DISABLED_ACCOUNT_CODES.contains(&account_control)
}

/// Resolves primary member references.
pub trait MemberResolver {
    /// Resolve `reference`, returning [`ResolvedIdentity::unknown`] on failure.
    fn resolve(&mut self, reference: &str) -> ResolvedIdentity;
}

/// How many secondary accounts carry a login.
enum SecondaryMatch {
    One,
    None,
    Many(usize),
}

/// [`MemberResolver`] backed by both directories.
pub struct IdentityResolver<'a> {
    primary: &'a mut dyn Directory,
    secondary: &'a mut dyn Directory,
    config: &'a SyncConfig,
    exceptions: &'a ExceptionTable,
    cache: &'a mut HashMap<String, ResolvedIdentity>,
    status: &'a mut RunStatus,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(
        primary: &'a mut dyn Directory,
        secondary: &'a mut dyn Directory,
        config: &'a SyncConfig,
        exceptions: &'a ExceptionTable,
        cache: &'a mut HashMap<String, ResolvedIdentity>,
        status: &'a mut RunStatus,
    ) -> Self {
        Self {
            primary,
            secondary,
            config,
            exceptions,
            cache,
            status,
        }
    }

    fn fail(&mut self, reference: &str, message: String) -> ResolvedIdentity {
        warn!(member = %reference, "{message}");
        self.status.record_failure(reference, PHASE, message);
        ResolvedIdentity::unknown()
    }

    /// Fetch the primary account behind a DN.
    fn primary_account(&mut self, reference: &str) -> Result<DirectoryEntry, String> {
        let rdn = split_leading_rdn(reference)
            .ok_or_else(|| format!("'{reference}' is not a distinguished name"))?;
        let config = self.config;
        let user = &config.schema(DirectoryRole::Primary).objects.user;
        let filter = Filter::and(vec![
            Filter::object_class(&user.obj_class),
            Filter::eq(&rdn.attribute, &rdn.value),
        ]);
        let attributes = [
            user.name.as_str(),
            user.account_control.as_str(),
            user.country.as_str(),
        ];

        let mut results = self
            .primary
            .search(&rdn.parent, &filter, &attributes)
            .map_err(|e| format!("primary lookup failed: {e}"))?;
        results
            .next()
            .ok_or_else(|| format!("{}={} does not exist in the primary directory", rdn.attribute, rdn.value))
    }

    /// Count secondary accounts whose login is `login`.
    fn secondary_matches(&mut self, login: &str) -> Result<SecondaryMatch, String> {
        let config = self.config;
        let schema = config.schema(DirectoryRole::Secondary);
        let user = &schema.objects.user;
        let filter = Filter::and(vec![
            Filter::object_class(&user.obj_class),
            Filter::eq(&user.name, login),
        ]);

        let results = self
            .secondary
            .search(&schema.user_base(), &filter, &[user.name.as_str()])
            .map_err(|e| format!("secondary lookup failed: {e}"))?;
        Ok(match results.len() {
            0 => SecondaryMatch::None,
            1 => SecondaryMatch::One,
            n => SecondaryMatch::Many(n),
        })
    }

    fn resolve_uncached(&mut self, reference: &str) -> ResolvedIdentity {
        let entry = match self.primary_account(reference) {
            Ok(entry) => entry,
            Err(message) => return self.fail(reference, message),
        };

        let config = self.config;
        let user = &config.schema(DirectoryRole::Primary).objects.user;
        let Some(login) = entry.get_strings(&user.name).first().map(|l| canonical_key(l)) else {
            return self.fail(reference, format!("primary account has no '{}'", user.name));
        };
        let Some(account_control) = entry.get_i64(&user.account_control) else {
            return self.fail(
                reference,
                format!("primary account '{login}' has no numeric '{}'", user.account_control),
            );
        };
        let country_code = entry
            .get_string(&user.country)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        let exceptions = self.exceptions;
        let target = match exceptions.get(&login) {
            Some(ExceptionTarget::Excluded) => {
                debug!(user = %login, "User excluded by the exception table");
                return ResolvedIdentity::unknown();
            }
            Some(ExceptionTarget::Mapped(target)) => Some(target.clone()),
            None => None,
        };
        let secondary_login = target.clone().unwrap_or_else(|| login.clone());

        match self.secondary_matches(&secondary_login) {
            Ok(SecondaryMatch::One) => {
                let identity = ResolvedIdentity {
                    canonical_id: secondary_login,
                    country_code,
                    account_active: is_account_active(account_control),
                };
                self.cache.insert(reference.to_string(), identity.clone());
                identity
            }
            Ok(SecondaryMatch::None) => match target {
                Some(target) => self.fail(
                    reference,
                    format!("'{login}' is in the exception table but '{target}' is not in the secondary directory"),
                ),
                None => self.fail(reference, format!("'{login}' is not in the secondary directory")),
            },
            Ok(SecondaryMatch::Many(count)) => self.fail(
                reference,
                format!("'{secondary_login}' matches {count} secondary accounts"),
            ),
            Err(message) => self.fail(reference, message),
        }
    }
}

impl MemberResolver for IdentityResolver<'_> {
    #[instrument(skip(self))]
    fn resolve(&mut self, reference: &str) -> ResolvedIdentity {
        if let Some(identity) = self.cache.get(reference) {
            return identity.clone();
        }
        self.resolve_uncached(reference)
    }
}
