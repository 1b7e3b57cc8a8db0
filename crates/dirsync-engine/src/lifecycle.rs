//! Secondary account lifecycle.
//!
//! Runs during user sync, before the attribute passes. Brings every secondary
//! account in line with the primary one: missing object classes, enable or
//! disable masks, and creation of accounts that only exist in the primary
//! directory. Password resets are queued as pending changes and written with
//! the rest of the user's attributes.

use secrecy::SecretString;
use tracing::{debug, info, instrument};

use dirsync_directory::dn::escape_dn_value;
use dirsync_directory::{
    AttributeValue, ChangeOperation, ChangeRecord, Directory, NewEntry, PasswordCapability,
    PasswordPolicy, PasswordScheme,
};

use crate::allocator::{allocate_id, allocate_sid};
use crate::apply::settle;
use crate::config::{DirectorySchema, SyncConfig};
use crate::error::{EngineError, EngineResult};
use crate::session::RunStatus;
use crate::snapshot::{UserAccount, UserRecord, UserSnapshot};

const OBJECT_CLASS: &str = "objectClass";
const COMMON_NAME: &str = "cn";

/// Both password encodings.
const ALL_SCHEMES: [PasswordScheme; 2] = [PasswordScheme::SaltedHash, PasswordScheme::LegacyHash];

/// Whether an account's committed value equals a single-valued mask value.
fn mask_matches(account: &UserAccount, attribute: &str, mask: &AttributeValue) -> bool {
    mask.to_text()
        .is_some_and(|expected| expected == account.value(attribute))
}

/// Applies the lifecycle rules to the secondary directory.
pub struct UserLifecycle<'a> {
    directory: &'a mut dyn Directory,
    config: &'a SyncConfig,
    passwords: &'a dyn PasswordCapability,
    policy: PasswordPolicy,
    status: &'a mut RunStatus,
}

impl<'a> UserLifecycle<'a> {
    pub fn new(
        directory: &'a mut dyn Directory,
        config: &'a SyncConfig,
        passwords: &'a dyn PasswordCapability,
        status: &'a mut RunStatus,
    ) -> Self {
        Self {
            directory,
            config,
            passwords,
            policy: config.settings.password_policy(),
            status,
        }
    }

    fn schema(&self) -> &'a DirectorySchema {
        &self.config.secondary.schema
    }

    /// Walk every user in key order.
    #[instrument(skip_all, fields(users = snapshot.len()))]
    pub fn run(&mut self, snapshot: &mut UserSnapshot) -> EngineResult<()> {
        for key in snapshot.keys() {
            let Some(record) = snapshot.get_mut(&key) else {
                continue;
            };
            if record.excluded {
                info!(user = %key, "User mapped to NONE in the exception table, skipping lifecycle");
                continue;
            }

            match (record.accounts.primary.is_some(), record.accounts.secondary.is_some()) {
                (true, true) => self.reconcile_existing(&key, record)?,
                (true, false) => {
                    if let Some(account) = self.create_account(&key)? {
                        record.accounts.secondary = Some(account);
                    }
                }
                (false, true) => debug!(user = %key, "User only exists in the secondary directory"),
                (false, false) => {}
            }
        }
        Ok(())
    }

    fn reconcile_existing(&mut self, key: &str, record: &mut UserRecord) -> EngineResult<()> {
        let Some((primary, secondary)) = record.both_mut() else {
            return Ok(());
        };

        self.add_missing_object_classes(key, secondary)?;

        let config = self.config;
        let account_control = &config.primary.schema.objects.user.account_control;
        let active = primary
            .get(account_control)
            .and_then(|code| code.trim().parse::<i64>().ok())
            .is_some_and(|code| config.settings.active_account_codes.contains(&code));

        let queued = if active {
            self.enable(secondary)
        } else {
            self.disable(secondary)
        };
        if queued {
            info!(user = %key, active, "Account state changed, resetting passwords");
            self.reset_passwords(secondary, &ALL_SCHEMES)?;
        }
        Ok(())
    }

    fn add_missing_object_classes(&mut self, key: &str, account: &mut UserAccount) -> EngineResult<()> {
        let schema = self.schema();
        let template = self.config.new_user_template()?;

        for object_class in &template.mask.object_class {
            if account.has_object_class(object_class) {
                continue;
            }

            let mut change = ChangeRecord::new(&account.dn).with(ChangeOperation::add(
                OBJECT_CLASS,
                vec![AttributeValue::String(object_class.clone())],
            ));
            let carries_sid = object_class.eq_ignore_ascii_case(&schema.sid_object_class);
            if carries_sid {
                let prefix = self.sid_prefix()?;
                let sid = allocate_sid(
                    &mut *self.directory,
                    &schema.base,
                    &schema.objects.user.sid,
                    prefix,
                )?;
                change.push(ChangeOperation::add(
                    &schema.objects.user.sid,
                    vec![AttributeValue::String(sid)],
                ));
            }

            info!(user = %key, object_class = %object_class, "Adding object class");
            let result = self.directory.modify(&change);
            if settle(result, key, "modify_user", self.status)? {
                account.object_classes.push(object_class.clone());
                if carries_sid {
                    self.reset_passwords(account, &[PasswordScheme::LegacyHash])?;
                }
            }
        }
        Ok(())
    }

    /// Queue the enable mask where the account is currently disabled.
    fn enable(&self, account: &mut UserAccount) -> bool {
        let schema = self.schema();
        let mut queued = false;
        for (attribute, enabled) in &schema.enable_user_mask {
            let Some(disabled) = schema.disable_user_mask.get(attribute) else {
                continue;
            };
            if mask_matches(account, attribute, disabled) {
                account.set_pending(attribute.clone(), enabled.clone());
                queued = true;
            }
        }
        queued
    }

    /// Queue the disable mask where the account is not yet disabled.
    fn disable(&self, account: &mut UserAccount) -> bool {
        let mut queued = false;
        for (attribute, disabled) in &self.schema().disable_user_mask {
            if !mask_matches(account, attribute, disabled) {
                account.set_pending(attribute.clone(), disabled.clone());
                queued = true;
            }
        }
        queued
    }

    fn sid_prefix(&self) -> EngineResult<&'a str> {
        self.schema()
            .sid_prefix
            .as_deref()
            .ok_or_else(|| EngineError::invalid_configuration("secondary schema has no sid_prefix"))
    }

    /// Generate one secret and queue its encodings.
    ///
    /// Exhausting the generation budget is fatal.
    fn reset_passwords(&self, account: &mut UserAccount, schemes: &[PasswordScheme]) -> EngineResult<()> {
        let secret: SecretString = self.passwords.generate(&self.policy)?;
        let user = &self.schema().objects.user;
        for scheme in schemes {
            let encoded = self.passwords.encode(&secret, *scheme)?;
            match scheme {
                PasswordScheme::SaltedHash => {
                    account.set_pending(user.password.clone(), AttributeValue::Binary(encoded));
                }
                PasswordScheme::LegacyHash => {
                    account.set_pending(
                        user.nt_password.clone(),
                        String::from_utf8_lossy(&encoded).into_owned(),
                    );
                }
            }
        }
        Ok(())
    }

    /// Create the secondary account of a primary-only user.
    #[instrument(skip(self))]
    fn create_account(&mut self, key: &str) -> EngineResult<Option<UserAccount>> {
        let schema = self.schema();
        let template = self.config.new_user_template()?;
        let user = &schema.objects.user;

        let dn = format!("{}={},{}", user.name, escape_dn_value(key), schema.user_base());
        let mut entry = NewEntry::new(dn, template.mask.object_class.clone());
        for (attribute, value) in &template.mask.attributes {
            entry.set(attribute.clone(), value.clone());
        }
        entry.set(user.name.clone(), key);
        entry.set(COMMON_NAME, key);

        let prefix = self.sid_prefix()?;
        let sid = allocate_sid(&mut *self.directory, &schema.base, &user.sid, prefix)?;
        entry.set(user.sid.clone(), sid);
        entry.set(
            user.home_directory.clone(),
            format!("{}/{key}", schema.home_directory_prefix.trim_end_matches('/')),
        );
        let uid = allocate_id(
            &mut *self.directory,
            &schema.base,
            &user.uid_number,
            template.min_member_number,
        )?;
        entry.set(user.uid_number.clone(), uid);

        info!(user = %key, dn = %entry.dn, uid, "Creating user");
        let result = self.directory.add(&entry);
        if !settle(result, key, "create_user", self.status)? {
            return Ok(None);
        }

        let mut account = UserAccount {
            dn: entry.dn.clone(),
            attributes: entry
                .attributes
                .iter()
                .filter_map(|(name, value)| value.to_text().map(|text| (name.clone(), text)))
                .collect(),
            object_classes: entry.object_classes.clone(),
            ..UserAccount::default()
        };
        self.reset_passwords(&mut account, &ALL_SCHEMES)?;
        Ok(Some(account))
    }
}
