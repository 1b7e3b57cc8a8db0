//! One reconciliation run from configuration to run status.

use std::path::Path;

use tracing::{error, info, info_span, warn};

use dirsync_directory::{AuditManifest, AuditedDirectory, Directory, DryRunDirectory};
use dirsync_engine::{
    CountryControlTable, DirectoryRole, ExceptionTable, RoleMap, RunOptions, RunStatusWriter,
    SyncConfig, SyncEngine, SyncMode, SyncSession,
};
use dirsync_ldap::{DefaultPasswordService, LdapDirectory};

use crate::config::ConnectionsFile;
use crate::error::{CliError, CliResult};
use crate::logging::{init_logging, FileLogging};
use crate::{CommonArgs, Environment};

/// A live directory wrapped for the chosen environment.
enum EnvironmentDirectory {
    Audited(AuditedDirectory<LdapDirectory>),
    DryRun(DryRunDirectory<LdapDirectory>),
}

impl EnvironmentDirectory {
    fn wrap(directory: LdapDirectory, environment: Environment, manifest: &AuditManifest) -> Self {
        match environment {
            Environment::Prod => {
                EnvironmentDirectory::Audited(AuditedDirectory::new(directory, manifest.clone()))
            }
            Environment::Noop => EnvironmentDirectory::DryRun(DryRunDirectory::new(directory)),
        }
    }

    fn as_directory(&mut self) -> &mut dyn Directory {
        match self {
            EnvironmentDirectory::Audited(directory) => directory,
            EnvironmentDirectory::DryRun(directory) => directory,
        }
    }

    fn close(self) {
        match self {
            EnvironmentDirectory::Audited(directory) => directory.into_inner().close(),
            EnvironmentDirectory::DryRun(directory) => directory.into_inner().close(),
        }
    }
}

/// Manifest redacting both password attributes of every directory.
fn audit_manifest(config: &SyncConfig) -> AuditManifest {
    let mut manifest = AuditManifest::new(&config.settings.manifest_path);
    for role in DirectoryRole::ALL {
        let user = &config.schema(role).objects.user;
        manifest = manifest
            .with_sensitive_attribute(&user.password)
            .with_sensitive_attribute(&user.nt_password);
    }
    manifest
}

fn connect(
    connections: &ConnectionsFile,
    role: DirectoryRole,
    environment: Environment,
    manifest: &AuditManifest,
) -> CliResult<EnvironmentDirectory> {
    let directory = LdapDirectory::connect(role.as_str(), connections.connection(role)?)?;
    Ok(EnvironmentDirectory::wrap(directory, environment, manifest))
}

/// Execute one run mode.
///
/// Returns an error only for fatal failures, after the negative run status
/// has been written.
pub fn execute(mode: SyncMode, args: &CommonArgs, options: RunOptions) -> CliResult<()> {
    let config = match SyncConfig::load(&args.config_file) {
        Ok(config) => config,
        Err(e) => {
            // Without a configuration there is no status file to write.
            init_logging(args.console_log_level, None)?;
            error!(path = %args.config_file.display(), error = %e, "Unable to load configuration");
            return Err(e.into());
        }
    };

    let file_logging = FileLogging::for_mode(
        config.settings.log_file.as_deref(),
        &config.settings.log_file_level,
        mode,
    );
    init_logging(args.console_log_level, file_logging.as_ref())?;

    let span = info_span!("run", environment = args.environment.as_str(), mode = %mode);
    let _guard = span.enter();

    let status = RunStatusWriter::new(&config.settings.monitoring_log_file, mode);
    let outcome = run_mode(mode, &config, &args.config_file, args.environment, options);
    record_outcome(&status, outcome)
}

/// Write the run status for an outcome. Fatal errors are passed on.
fn record_outcome(status: &RunStatusWriter, outcome: CliResult<bool>) -> CliResult<()> {
    match outcome {
        Ok(success) => {
            if success {
                info!("Run completed successfully");
            } else {
                warn!("Run completed with failures");
            }
            status.write(success)?;
            Ok(())
        }
        Err(e) => {
            error!(error = %e, code = e.error_code(), "Run aborted");
            if let Err(write_error) = status.write(false) {
                error!(error = %write_error, "Unable to write run status");
            }
            Err(e)
        }
    }
}

/// Connect, run the engine and close. Returns the run outcome.
fn run_mode(
    mode: SyncMode,
    config: &SyncConfig,
    config_file: &Path,
    environment: Environment,
    options: RunOptions,
) -> CliResult<bool> {
    let exceptions = ExceptionTable::load(config.settings.exception_file.as_deref())?;
    let countries = CountryControlTable::load(config.settings.country_control_file.as_deref())?;
    info!(
        exceptions = exceptions.len(),
        country_controlled_groups = countries.len(),
        "Tables loaded"
    );

    let connections = ConnectionsFile::load(config_file)?;
    let manifest = audit_manifest(config);
    let mut primary = connect(&connections, DirectoryRole::Primary, environment, &manifest)?;
    let mut secondary = connect(&connections, DirectoryRole::Secondary, environment, &manifest)?;

    let passwords = DefaultPasswordService::new();
    let mut session = SyncSession::new(options);
    let result = {
        let mut engine = SyncEngine::new(
            config,
            &exceptions,
            &countries,
            &passwords,
            RoleMap::new(primary.as_directory(), secondary.as_directory()),
        );
        engine.run(mode, &mut session)
    };

    primary.close();
    secondary.close();
    result?;

    for failure in session.status.failures() {
        warn!(
            entity = %failure.entity,
            phase = failure.phase,
            message = %failure.message,
            "Run failure"
        );
    }
    Ok(session.is_success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::ConsoleLevel;

    const CONFIG: &str = r#"
settings:
  manifest_path: /tmp/manifest.log
ad:
  schema:
    base: DC=example,DC=com
    groups: OU=Groups
    users: OU=Users
    objects:
      group: {obj_class: group, name: cn, gid_number: gidNumber, members: member}
      user: {obj_class: user, name: sAMAccountName, password: unicodePwd}
openldap:
  schema:
    base: dc=example,dc=com
    groups: ou=Group
    users: ou=People
    objects:
      group: {obj_class: posixGroup, name: cn, gid_number: gidNumber, members: memberUid}
      user: {obj_class: posixAccount, name: uid}
    new_group:
      mask:
        objectClass: [top, posixGroup]
      min_member_number: 5000
    new_user:
      mask:
        objectClass: [top, posixAccount, sambaSamAccount]
      min_member_number: 10000
    sid_prefix: S-1-5-21-1-2-3-
"#;

    // --- manifest ---

    #[test]
    fn test_manifest_redacts_configured_password_attributes() {
        let config = SyncConfig::from_yaml_str(CONFIG).unwrap();
        let manifest = audit_manifest(&config);

        assert_eq!(manifest.path(), Path::new("/tmp/manifest.log"));
        assert!(manifest.is_sensitive("unicodePwd"));
        assert!(manifest.is_sensitive("userPassword"));
        assert!(manifest.is_sensitive("sambaNTPassword"));
        assert!(!manifest.is_sensitive("mail"));
    }

    // --- fatal paths ---

    #[test]
    fn test_missing_configuration_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let args = CommonArgs {
            config_file: dir.path().join("absent.yaml"),
            console_log_level: ConsoleLevel::Error,
            environment: Environment::Noop,
        };

        let err = execute(SyncMode::GroupSync, &args, RunOptions::new()).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_missing_connection_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&config_file).unwrap();
        write!(file, "{CONFIG}").unwrap();

        let config = SyncConfig::load(&config_file).unwrap();
        let err = run_mode(
            SyncMode::UserSync,
            &config,
            &config_file,
            Environment::Noop,
            RunOptions::new(),
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "CONFIG");
    }

    // --- run status ---

    #[test]
    fn test_fatal_error_writes_negative_status() {
        let dir = tempfile::tempdir().unwrap();
        let status = RunStatusWriter::new(&dir.path().join("monitoring.log"), SyncMode::GroupSync);

        let outcome = record_outcome(&status, Err(CliError::Logging("closed".to_string())));

        assert!(outcome.is_err());
        let written = std::fs::read_to_string(dir.path().join("group_sync_monitoring.log")).unwrap();
        assert_eq!(written, "False");
    }

    #[test]
    fn test_completed_run_writes_its_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let status = RunStatusWriter::new(&dir.path().join("monitoring.log"), SyncMode::UserSync);

        record_outcome(&status, Ok(true)).unwrap();
        assert_eq!(std::fs::read_to_string(status.path()).unwrap(), "True");

        record_outcome(&status, Ok(false)).unwrap();
        assert_eq!(std::fs::read_to_string(status.path()).unwrap(), "False");
    }
}
