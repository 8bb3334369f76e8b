//! `mysqldump` / `mysql` invocations
//!
//! Builds the command lines for the dump tool and the administrative client
//! and runs them through a [`CommandRunner`]. Passwords are passed inline as
//! `-p<password>` so neither tool ever prompts. Absent connection values are
//! left off the command line rather than passed empty.

use std::path::Path;

use crate::error::{VaultError, VaultResult};
use crate::observability::{Event, Reporter};
use crate::settings::Settings;
use crate::site::{Credentials, SiteDescriptor};

use super::{CommandOutput, CommandRunner, Invocation, ProcessError};

/// Refuse names that would need quoting inside SQL
pub fn validate_database_name(name: &str) -> VaultResult<()> {
    let bad = |c: char| matches!(c, '`' | '\'' | '"' | '\\' | ';') || c.is_control();

    if name.is_empty() || name.len() > 64 || name.chars().any(bad) {
        return Err(VaultError::invalid(format!(
            "unsupported database name '{}'",
            name
        )));
    }
    Ok(())
}

fn connection_args(mut inv: Invocation, site: &SiteDescriptor, credentials: &Credentials) -> Invocation {
    if let Some(host) = site.db_host() {
        inv = inv
            .arg("-h")
            .arg(host)
            .arg("-P")
            .arg(site.db_port().to_string());
    }
    if let Some(socket) = site.db_socket() {
        inv = inv.arg(format!("--socket={}", socket));
    }
    if let Some(user) = credentials.username() {
        inv = inv.arg("-u").arg(user);
    }
    if let Some(password) = credentials.password() {
        inv = inv.secret_arg(format!("-p{}", password));
    }
    inv
}

/// Dump command for the site's database
pub fn dump_invocation(settings: &Settings, site: &SiteDescriptor) -> VaultResult<Invocation> {
    let db_name = site.require_db_name()?;

    let inv = Invocation::new(&settings.dump_program).arg("--add-drop-table");
    Ok(connection_args(inv, site, site.credentials()).arg(db_name))
}

/// Admin client command executing a single SQL statement
fn admin_statement(
    settings: &Settings,
    site: &SiteDescriptor,
    admin: &Credentials,
    database: Option<&str>,
    sql: String,
) -> Invocation {
    let mut inv = connection_args(Invocation::new(&settings.client_program), site, admin)
        .arg("--batch")
        .arg("--skip-column-names");
    if let Some(database) = database {
        inv = inv.arg(database);
    }
    inv.arg("--execute").arg(sql)
}

/// Runs the administrative client against one site's database server
pub struct MysqlAdmin<'a> {
    runner: &'a dyn CommandRunner,
    reporter: &'a dyn Reporter,
    settings: &'a Settings,
    site: &'a SiteDescriptor,
    admin: &'a Credentials,
}

impl<'a> MysqlAdmin<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        reporter: &'a dyn Reporter,
        settings: &'a Settings,
        site: &'a SiteDescriptor,
        admin: &'a Credentials,
    ) -> Self {
        Self {
            runner,
            reporter,
            settings,
            site,
            admin,
        }
    }

    fn run(&self, step: &'static str, invocation: Invocation) -> VaultResult<CommandOutput> {
        let shown = invocation.to_string();
        self.reporter
            .info(Event::CommandRun.as_str(), &[("step", step), ("command", &shown)]);

        self.runner
            .run(&invocation)
            .map_err(|e| restore_error(step, e))
    }

    pub fn database_exists(&self, name: &str) -> VaultResult<bool> {
        validate_database_name(name)?;
        let sql = format!("SHOW DATABASES LIKE '{}'", escape_like(name));
        let output = self.run(
            "check database",
            admin_statement(self.settings, self.site, self.admin, None, sql),
        )?;
        Ok(output.stdout_lossy().lines().any(|line| line.trim() == name))
    }

    pub fn create_database(&self, name: &str) -> VaultResult<()> {
        validate_database_name(name)?;
        let sql = format!("CREATE DATABASE IF NOT EXISTS `{}`", name);
        self.run(
            "create database",
            admin_statement(self.settings, self.site, self.admin, None, sql),
        )?;
        Ok(())
    }

    pub fn drop_database(&self, name: &str) -> VaultResult<()> {
        validate_database_name(name)?;
        let sql = format!("DROP DATABASE IF EXISTS `{}`", name);
        self.run(
            "drop database",
            admin_statement(self.settings, self.site, self.admin, None, sql),
        )?;
        Ok(())
    }

    /// Execute `script` against `name` with the client's `source` command
    pub fn apply_script(&self, name: &str, script: &Path) -> VaultResult<()> {
        validate_database_name(name)?;
        let sql = format!("source {};", script.display());
        self.run(
            "apply dump",
            admin_statement(self.settings, self.site, self.admin, Some(name), sql),
        )?;
        Ok(())
    }
}

/// Map a dump-tool failure to the backup error taxonomy
pub fn dump_error(err: ProcessError) -> VaultError {
    match err {
        ProcessError::ToolNotFound { program, source } => {
            VaultError::ToolNotFound { program, source }
        }
        ProcessError::NonZeroExit { output, .. } => VaultError::DumpFailed { output },
    }
}

fn restore_error(step: &'static str, err: ProcessError) -> VaultError {
    match err {
        ProcessError::ToolNotFound { program, source } => {
            VaultError::ToolNotFound { program, source }
        }
        ProcessError::NonZeroExit { output, .. } => VaultError::RestoreFailed { step, output },
    }
}

// `_` and `%` are LIKE wildcards
fn escape_like(name: &str) -> String {
    name.replace('_', "\\_").replace('%', "\\%")
}
