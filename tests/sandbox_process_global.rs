//! Process-global sandbox isolation.
//!
//! Kept in its own test binary with a single test: it really switches the
//! process working directory and environment, which would race with any
//! other test reading them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::tempdir;

use instantly::error::InstantlyError;
use instantly::sandbox::{IsolationMode, ResourceLimits, Sandbox, SandboxConfig};

fn snapshot() -> (PathBuf, HashMap<String, String>) {
    (
        std::env::current_dir().unwrap(),
        std::env::vars().collect(),
    )
}

#[tokio::test]
async fn test_process_global_restores_cwd_and_env() {
    let dir = tempdir().unwrap();
    let expected_dir = dir.path().canonicalize().unwrap();
    let before = snapshot();
    assert!(std::env::var("INSTANTLY_PG_FLAG").is_err());

    let config = SandboxConfig::new()
        .with_working_dir(dir.path())
        .with_env("INSTANTLY_PG_FLAG", "inside")
        .with_mode(IsolationMode::ProcessGlobal);

    // Success
    let (cwd, flag) = Sandbox::run(&config, |_ctx| async move {
        Ok((
            std::env::current_dir()?.canonicalize()?,
            std::env::var("INSTANTLY_PG_FLAG").ok(),
        ))
    })
    .await
    .unwrap();
    assert_eq!(cwd, expected_dir);
    assert_eq!(flag.as_deref(), Some("inside"));
    assert_eq!(snapshot(), before);

    // Error from the callable, including a variable it added itself
    let err = Sandbox::run(&config, |_ctx| async move {
        std::env::set_var("INSTANTLY_PG_LEAK", "1");
        Err::<(), _>(InstantlyError::Execution("failed inside".into()))
    })
    .await
    .unwrap_err();
    assert!(matches!(err, InstantlyError::Execution(ref m) if m == "failed inside"));
    assert_eq!(snapshot(), before);
    assert!(std::env::var("INSTANTLY_PG_LEAK").is_err());

    // CPU deadline
    let limited = config
        .clone()
        .with_limits(ResourceLimits::default().with_max_cpu_time(1));
    let err = Sandbox::run(&limited, |_ctx| async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    })
    .await
    .unwrap_err();
    assert!(matches!(err, InstantlyError::ResourceLimit(_)));
    assert_eq!(snapshot(), before);

    // Missing working directory fails before anything is switched
    let missing = SandboxConfig::new()
        .with_working_dir(dir.path().join("nope"))
        .with_mode(IsolationMode::ProcessGlobal);
    let err = Sandbox::run(&missing, |_ctx| async move { Ok(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, InstantlyError::Config(_)));
    assert_eq!(snapshot(), before);

    // NUL byte in an environment value is rejected, not passed to set_var
    let nul = SandboxConfig::new()
        .with_env("INSTANTLY_PG_NUL", "a\0b")
        .with_mode(IsolationMode::ProcessGlobal);
    let err = Sandbox::run(&nul, |_ctx| async move { Ok(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, InstantlyError::Config(_)));
    assert_eq!(snapshot(), before);

    // Runs overlapping a switched process still resolve against the host
    let slow = config.clone();
    let first = tokio::spawn(async move {
        Sandbox::run(&slow, |_ctx| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(std::env::current_dir().unwrap().canonicalize().unwrap(), expected_dir);

    let (scoped_dir, scoped_flag) = Sandbox::run(&SandboxConfig::new(), |ctx| async move {
        Ok((ctx.working_dir.clone(), ctx.env("INSTANTLY_PG_FLAG")))
    })
    .await
    .unwrap();
    assert_eq!(scoped_dir, before.0);
    assert_eq!(scoped_flag, None);

    let global = SandboxConfig::new().with_mode(IsolationMode::ProcessGlobal);
    let (global_dir, global_cwd) = Sandbox::run(&global, |ctx| async move {
        Ok((ctx.working_dir.clone(), std::env::current_dir()?))
    })
    .await
    .unwrap();
    assert_eq!(global_dir, before.0);
    assert_eq!(global_cwd, before.0);

    first.await.unwrap().unwrap();
    assert_eq!(snapshot(), before);
}
