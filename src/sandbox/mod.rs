//! Sandboxed execution for tool calls
//!
//! Every tool invocation runs through [`Sandbox::run`], which resolves a
//! [`SandboxContext`] (working directory, environment overrides, resource
//! ceilings), enforces the CPU-time deadline, and guarantees that nothing it
//! changed outlives the call.
//!
//! # Isolation modes
//!
//! - [`IsolationMode::Scoped`] (default): the callable receives the context
//!   and resolves paths, environment lookups and child processes through it.
//!   The process cwd and environment are never modified, so concurrent calls
//!   cannot observe each other.
//! - [`IsolationMode::ProcessGlobal`]: the process cwd and environment are
//!   switched for the duration of the call and restored afterwards
//!   (clear-then-repopulate for the environment). A global async mutex
//!   serialises these calls. While one is active, contexts resolved
//!   elsewhere still see the host cwd and environment.
//!
//! # Resource ceilings
//!
//! - `max_cpu_time` bounds the call: when it expires the callable is dropped
//!   and `ResourceLimit` is returned.
//! - Child processes spawned via [`SandboxContext::command`] run under real
//!   `RLIMIT_AS`, `RLIMIT_CPU` and `RLIMIT_FSIZE` limits.
//! - Tools that write files in-process check `max_file_size` themselves.
//!
//! The host process itself is never limited.
//!
//! # Example
//!
//! ```
//! use instantly::sandbox::{Sandbox, SandboxConfig};
//!
//! # tokio_test::block_on(async {
//! let dir = std::env::temp_dir();
//! let config = SandboxConfig::new().with_working_dir(&dir).with_env("GREETING", "hi");
//!
//! let seen = Sandbox::run(&config, |ctx| async move {
//!     Ok(ctx.env("GREETING"))
//! })
//! .await
//! .unwrap();
//!
//! assert_eq!(seen.as_deref(), Some("hi"));
//! # });
//! ```

mod limits;
mod process;
pub mod types;

pub use types::{
    IsolationMode, ResourceLimits, SandboxConfig, SandboxContext, DEFAULT_MAX_CPU_TIME,
    DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_MEMORY,
};

#[cfg(unix)]
pub(crate) use limits::limit_for_signal;

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{InstantlyError, Result};

/// Entry point for sandboxed execution.
pub struct Sandbox;

impl Sandbox {
    /// Runs the async callable `f` under `config`.
    ///
    /// # Errors
    /// - `Config` if the working directory does not exist (before `f` runs)
    /// - `ResourceLimit` if `f` outlives `max_cpu_time`
    /// - whatever `f` returns, unchanged
    pub async fn run<T, F, Fut>(config: &SandboxConfig, f: F) -> Result<T>
    where
        F: FnOnce(SandboxContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match config.isolation_mode() {
            IsolationMode::Scoped => {
                let ctx = SandboxContext::resolve(config)?;
                debug!(working_dir = %ctx.working_dir.display(), "Sandbox run (scoped)");
                with_deadline(ctx.resource_limits.max_cpu_time, f(ctx)).await
            }
            IsolationMode::ProcessGlobal => {
                // Resolve under the lock so relative paths never see another run's cwd.
                let _lock = process::lock().await;
                let ctx = SandboxContext::resolve(config)?;
                let cpu_secs = ctx.resource_limits.max_cpu_time;
                let _restore = process::ProcessStateGuard::enter(&ctx)?;
                with_deadline(cpu_secs, f(ctx)).await
            }
        }
    }

    /// Runs the synchronous callable `f` on the blocking pool under `config`.
    ///
    /// A call that exceeds its deadline is reported as `ResourceLimit`, but
    /// the blocking thread itself cannot be interrupted and runs to
    /// completion in the background.
    pub async fn run_blocking<T, F>(config: &SandboxConfig, f: F) -> Result<T>
    where
        F: FnOnce(SandboxContext) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        Self::run(config, |ctx| async move {
            tokio::task::spawn_blocking(move || f(ctx))
                .await
                .map_err(|e| InstantlyError::Execution(format!("Sandboxed task failed: {e}")))?
        })
        .await
    }
}

async fn with_deadline<T>(secs: u64, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(max_cpu_time = secs, "Sandboxed call exceeded its CPU time limit");
            Err(InstantlyError::ResourceLimit(format!(
                "CPU time limit of {}s exceeded",
                secs
            )))
        }
    }
}
