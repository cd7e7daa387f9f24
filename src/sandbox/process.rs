//! Process-global isolation: switch cwd and environment, restore on drop
//!
//! While a process-global run is active the live cwd and environment belong
//! to that run. Everything else reads the host view through [`host_dir`],
//! [`host_var`] and [`host_vars_os`], which return the snapshot taken on entry
//! instead. Switching and restoring happen under the write side of the same
//! lock the readers take, so a reader never sees a half-switched process.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use once_cell::sync::Lazy;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error};

use super::SandboxContext;
use crate::error::Result;

/// Serialises every process-global sandbox run.
static PROCESS_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Host cwd and environment, saved while a process-global run has them switched.
static HOST_SNAPSHOT: Lazy<RwLock<Option<HostState>>> = Lazy::new(|| RwLock::new(None));

struct HostState {
    dir: PathBuf,
    env: Vec<(OsString, OsString)>,
}

pub(crate) async fn lock() -> MutexGuard<'static, ()> {
    PROCESS_LOCK.lock().await
}

fn read_snapshot() -> RwLockReadGuard<'static, Option<HostState>> {
    HOST_SNAPSHOT.read().unwrap_or_else(|p| p.into_inner())
}

fn write_snapshot() -> RwLockWriteGuard<'static, Option<HostState>> {
    HOST_SNAPSHOT.write().unwrap_or_else(|p| p.into_inner())
}

/// The host working directory, unaffected by any active process-global run.
pub(crate) fn host_dir() -> std::io::Result<PathBuf> {
    let snapshot = read_snapshot();
    match snapshot.as_ref() {
        Some(host) => Ok(host.dir.clone()),
        None => std::env::current_dir(),
    }
}

/// A host environment variable, unaffected by any active process-global run.
pub(crate) fn host_var(key: &str) -> Option<String> {
    let snapshot = read_snapshot();
    match snapshot.as_ref() {
        Some(host) => host
            .env
            .iter()
            .find(|(k, _)| k.to_str() == Some(key))
            .and_then(|(_, v)| v.clone().into_string().ok()),
        None => std::env::var(key).ok(),
    }
}

/// The host environment as raw OS strings.
pub(crate) fn host_vars_os() -> Vec<(OsString, OsString)> {
    let snapshot = read_snapshot();
    match snapshot.as_ref() {
        Some(host) => host.env.clone(),
        None => std::env::vars_os().collect(),
    }
}

/// The host environment. Non-UTF-8 entries are skipped.
pub(crate) fn host_vars() -> Vec<(String, String)> {
    host_vars_os()
        .into_iter()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Applies a context to the process; dropping restores the host state, so
/// success, error, panic unwinding and cancellation all restore.
///
/// Callers must hold [`lock`] for the guard's whole lifetime.
pub(crate) struct ProcessStateGuard {
    previous_dir: PathBuf,
    previous_env: Vec<(OsString, OsString)>,
}

impl ProcessStateGuard {
    /// Switches cwd and environment to `ctx`.
    ///
    /// Environment keys and values must already be validated; see
    /// [`SandboxContext::resolve`].
    pub(crate) fn enter(ctx: &SandboxContext) -> Result<Self> {
        let mut snapshot = write_snapshot();
        let previous_dir = std::env::current_dir()?;
        let previous_env: Vec<(OsString, OsString)> = std::env::vars_os().collect();

        std::env::set_current_dir(&ctx.working_dir)?;
        for (key, value) in &ctx.env_vars {
            std::env::set_var(key, value);
        }
        *snapshot = Some(HostState {
            dir: previous_dir.clone(),
            env: previous_env.clone(),
        });

        debug!(working_dir = %ctx.working_dir.display(), env = ctx.env_vars.len(), "Entered process-global sandbox");
        Ok(Self {
            previous_dir,
            previous_env,
        })
    }
}

impl Drop for ProcessStateGuard {
    fn drop(&mut self) {
        let mut snapshot = write_snapshot();

        if let Err(e) = std::env::set_current_dir(&self.previous_dir) {
            error!(
                dir = %self.previous_dir.display(),
                error = %e,
                "Failed to restore working directory"
            );
        }

        // Clear then repopulate so variables added during the call vanish too.
        let current: Vec<OsString> = std::env::vars_os().map(|(k, _)| k).collect();
        for key in current {
            std::env::remove_var(key);
        }
        for (key, value) in &self.previous_env {
            std::env::set_var(key, value);
        }

        *snapshot = None;
    }
}
