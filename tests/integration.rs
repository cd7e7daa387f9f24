//! Integration tests for Instantly
//!
//! These tests drive the public API end to end: tool registration and
//! execution through the agent, event ordering on the bus, keyed state
//! change events, the step loop with hooks, sandbox scoping, and session
//! persistence.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::tempdir;

use instantly::agent::{Agent, FnHook, RunOptions};
use instantly::bus::{Event, EventBus, EventListener, EventType, FnListener, StateChangeEvent};
use instantly::error::{InstantlyError, Result};
use instantly::sandbox::{ResourceLimits, Sandbox, SandboxConfig, SandboxContext};
use instantly::session::{JsonFileSessionStore, SessionStore};
use instantly::tools::{EchoTool, Tool, ToolArgs, ToolMetadata, ToolRegistry};

struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn describe(&self) -> ToolMetadata {
        ToolMetadata::new("explode", "Always fails")
    }

    async fn invoke(&self, _args: ToolArgs, _ctx: &SandboxContext) -> Result<Value> {
        Err(InstantlyError::Execution("kaboom".into()))
    }
}

struct SlowTool;

#[async_trait]
impl Tool for SlowTool {
    fn describe(&self) -> ToolMetadata {
        ToolMetadata::new("slow", "Sleeps for a long time").asynchronous()
    }

    async fn invoke(&self, _args: ToolArgs, _ctx: &SandboxContext) -> Result<Value> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(json!("finished"))
    }
}

struct WorkdirTool;

#[async_trait]
impl Tool for WorkdirTool {
    fn describe(&self) -> ToolMetadata {
        ToolMetadata::new("workdir", "Reports the sandbox working directory")
    }

    async fn invoke(&self, _args: ToolArgs, ctx: &SandboxContext) -> Result<Value> {
        Ok(json!(ctx.working_dir.display().to_string()))
    }
}

/// Records the key of every state change after sleeping for a key-dependent delay.
struct DelayedRecorder {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl EventListener for DelayedRecorder {
    async fn on_event(&self, event: &Event) -> Result<()> {
        let key = event
            .as_state_change()
            .map(|change| change.key.clone())
            .unwrap_or_default();
        let delay = match key.as_str() {
            "a" => 40,
            "b" => 5,
            _ => 15,
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.seen.lock().unwrap().push(key);
        Ok(())
    }
}

// ============================================================================
// Tool Registry
// ============================================================================

#[tokio::test]
async fn test_duplicate_registration_leaves_registry_unchanged() {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool).unwrap();

    let err = registry.register(EchoTool).unwrap_err();
    assert!(matches!(err, InstantlyError::DuplicateName(ref name) if name == "echo"));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.names(), vec!["echo"]);
}

#[tokio::test]
async fn test_lookup_of_missing_tool() {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool).unwrap();

    let err = registry.get_tool("missing").err().unwrap();
    assert!(err.is_not_found());
    assert_eq!(registry.len(), 1);
    assert!(registry.has("echo"));
}

#[tokio::test]
async fn test_agent_rejects_duplicate_tool() {
    let agent = Agent::new("dupes");
    agent.register_tool(EchoTool).await.unwrap();
    let err = agent.register_tool(EchoTool).await.unwrap_err();
    assert!(matches!(err, InstantlyError::DuplicateName(_)));
    assert_eq!(agent.tool_count().await, 1);

    let build = Agent::builder("dupes").tool(EchoTool).tool(EchoTool).build();
    assert!(matches!(build, Err(InstantlyError::DuplicateName(_))));
}

// ============================================================================
// Tool Execution Events
// ============================================================================

#[tokio::test]
async fn test_echo_through_agent() {
    let agent = Agent::new("say hi");
    agent.register_tool(EchoTool).await.unwrap();

    let value = agent
        .execute_tool("echo", ToolArgs::new().with_arg(json!("hi")))
        .await
        .unwrap();
    assert_eq!(value, json!("hi"));

    let history = agent.event_bus().history(Some(EventType::ToolExecution));
    assert_eq!(history.len(), 1);
    let event = history[0].as_tool_execution().unwrap();
    assert_eq!(event.tool_name, "echo");
    assert_eq!(event.args, vec![json!("hi")]);
    assert_eq!(event.result(), Some(&json!("hi")));
    assert!(event.error().is_none());
}

#[tokio::test]
async fn test_exactly_one_event_per_call() {
    let agent = Agent::builder("events")
        .tool(EchoTool)
        .tool(FailingTool)
        .build()
        .unwrap();

    agent
        .execute_tool("echo", ToolArgs::new().with_arg(json!("ok")))
        .await
        .unwrap();
    let failed = agent.execute_tool("explode", ToolArgs::new()).await;
    assert!(matches!(failed, Err(InstantlyError::Execution(ref m)) if m == "kaboom"));
    let missing = agent.execute_tool("missing", ToolArgs::new()).await;
    assert!(matches!(missing, Err(InstantlyError::NotFound(_))));

    let history = agent.event_bus().history(Some(EventType::ToolExecution));
    assert_eq!(history.len(), 3);

    let names: Vec<&str> = history
        .iter()
        .map(|e| e.as_tool_execution().unwrap().tool_name.as_str())
        .collect();
    assert_eq!(names, vec!["echo", "explode", "missing"]);

    let first = history[0].as_tool_execution().unwrap();
    assert!(first.is_success());
    let second = history[1].as_tool_execution().unwrap();
    assert!(second.result().is_none());
    assert!(second.error().unwrap().contains("kaboom"));
    let third = history[2].as_tool_execution().unwrap();
    assert!(third.error().is_some());
}

#[tokio::test]
async fn test_tool_error_wins_over_listener_error() {
    let agent = Agent::builder("listener failures")
        .tool(EchoTool)
        .tool(FailingTool)
        .build()
        .unwrap();
    agent.event_bus().subscribe(
        EventType::ToolExecution,
        FnListener::new(|_event| Err(InstantlyError::Execution("listener broke".into()))),
    );

    let err = agent
        .execute_tool("explode", ToolArgs::new())
        .await
        .unwrap_err();
    assert!(matches!(err, InstantlyError::Execution(ref m) if m == "kaboom"));

    let err = agent
        .execute_tool("echo", ToolArgs::new().with_arg(json!("hi")))
        .await
        .unwrap_err();
    assert!(matches!(err, InstantlyError::Listener { .. }));

    assert_eq!(
        agent.event_bus().history(Some(EventType::ToolExecution)).len(),
        2
    );
}

#[tokio::test]
async fn test_cpu_limit_produces_failure_event() {
    let agent = Agent::builder("slow")
        .tool(SlowTool)
        .sandbox_config(
            SandboxConfig::new().with_limits(ResourceLimits::default().with_max_cpu_time(1)),
        )
        .build()
        .unwrap();

    let err = agent.execute_tool("slow", ToolArgs::new()).await.unwrap_err();
    assert!(matches!(err, InstantlyError::ResourceLimit(_)));

    let history = agent.event_bus().history(Some(EventType::ToolExecution));
    assert_eq!(history.len(), 1);
    assert!(!history[0].as_tool_execution().unwrap().is_success());
}

#[tokio::test]
async fn test_per_call_working_dir_override() {
    let base = tempdir().unwrap();
    let call = tempdir().unwrap();
    let agent = Agent::builder("workdirs")
        .tool(WorkdirTool)
        .sandbox_config(SandboxConfig::new().with_working_dir(base.path()))
        .build()
        .unwrap();

    let from_base = agent.execute_tool("workdir", ToolArgs::new()).await.unwrap();
    assert_eq!(from_base, json!(base.path().display().to_string()));

    let from_call = agent
        .execute_tool_with(
            "workdir",
            ToolArgs::new(),
            &SandboxConfig::new().with_working_dir(call.path()),
        )
        .await
        .unwrap();
    assert_eq!(from_call, json!(call.path().display().to_string()));
}

// ============================================================================
// Event Bus
// ============================================================================

#[tokio::test]
async fn test_history_follows_dispatch_order() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    bus.subscribe(
        EventType::StateChange,
        DelayedRecorder {
            seen: Arc::clone(&seen),
        },
    );

    for key in ["a", "b", "c"] {
        bus.dispatch(Event::state_change(StateChangeEvent::new(
            key,
            None,
            json!(key),
        )))
        .await
        .unwrap();
    }

    let history: Vec<String> = bus
        .history(None)
        .iter()
        .map(|e| e.as_state_change().unwrap().key.clone())
        .collect();
    assert_eq!(history, vec!["a", "b", "c"]);
    // Dispatch waits for every listener, so delivery order matches too.
    assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_history_filter_by_type() {
    let agent = Agent::new("mixed events");
    agent.register_tool(EchoTool).await.unwrap();

    agent.state().set("mode", json!("fast")).await.unwrap();
    agent
        .execute_tool("echo", ToolArgs::new().with_arg(json!("x")))
        .await
        .unwrap();
    agent.state().set("mode", json!("slow")).await.unwrap();

    let bus = agent.event_bus();
    assert_eq!(bus.history(None).len(), 3);
    assert_eq!(bus.history(Some(EventType::StateChange)).len(), 2);
    assert_eq!(bus.history(Some(EventType::ToolExecution)).len(), 1);
    assert_eq!(bus.history(None)[1].event_type(), EventType::ToolExecution);
}

// ============================================================================
// Agent State
// ============================================================================

#[tokio::test]
async fn test_state_change_old_values() {
    let agent = Agent::new("state");
    let state = agent.state();

    state.set("k", json!(1)).await.unwrap();
    state.set("k", json!(2)).await.unwrap();

    let history = agent.event_bus().history(Some(EventType::StateChange));
    assert_eq!(history.len(), 2);

    let first = history[0].as_state_change().unwrap();
    assert_eq!(first.key, "k");
    assert_eq!(first.old_value, None);
    assert_eq!(first.new_value, json!(1));

    let second = history[1].as_state_change().unwrap();
    assert_eq!(second.old_value, Some(json!(1)));
    assert_eq!(second.new_value, json!(2));

    assert_eq!(state.get("k"), Some(json!(2)));
}

#[tokio::test]
async fn test_state_listener_sees_committed_value() {
    let agent = Agent::new("listener reads state");
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    agent.event_bus().subscribe(
        EventType::StateChange,
        FnListener::new(move |event| {
            let change = event.as_state_change().unwrap();
            sink.lock().unwrap().push(change.new_value.clone());
            Ok(())
        }),
    );

    agent.state().set("phase", json!("plan")).await.unwrap();
    agent.state().set("phase", json!("act")).await.unwrap();

    assert_eq!(*observed.lock().unwrap(), vec![json!("plan"), json!("act")]);
}

// ============================================================================
// Agent Loop
// ============================================================================

#[tokio::test]
async fn test_step_ceiling_counts_hooks() {
    let agent = Agent::new("ceiling");
    let starts = Arc::new(Mutex::new(0usize));
    let ends = Arc::new(Mutex::new(0usize));
    let s = Arc::clone(&starts);
    let e = Arc::clone(&ends);

    let steps = agent
        .run(
            RunOptions::with_max_steps(4)
                .on_step_start(FnHook::new(move |_agent: &Agent| {
                    *s.lock().unwrap() += 1;
                    Ok(())
                }))
                .on_step_end(FnHook::new(move |_agent: &Agent| {
                    *e.lock().unwrap() += 1;
                    Ok(())
                })),
        )
        .await
        .unwrap();

    assert_eq!(steps, 4);
    assert_eq!(*starts.lock().unwrap(), 4);
    assert_eq!(*ends.lock().unwrap(), 4);
    assert_eq!(agent.steps_taken(), 4);
}

#[tokio::test]
async fn test_hooks_interleave() {
    let agent = Agent::new("interleave");
    let log = Arc::new(Mutex::new(Vec::new()));
    let start_log = Arc::clone(&log);
    let end_log = Arc::clone(&log);

    agent
        .run(
            RunOptions::with_max_steps(3)
                .on_step_start(FnHook::new(move |_agent: &Agent| {
                    start_log.lock().unwrap().push("start");
                    Ok(())
                }))
                .on_step_end(FnHook::new(move |_agent: &Agent| {
                    end_log.lock().unwrap().push("end");
                    Ok(())
                })),
        )
        .await
        .unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["start", "end", "start", "end", "start", "end"]
    );
}

#[tokio::test]
async fn test_pause_in_hook_stops_before_next_step() {
    let agent = Agent::new("pause");
    let steps = agent
        .run(RunOptions::with_max_steps(10).on_step_end(FnHook::new(|agent: &Agent| {
            if agent.steps_taken() == 1 {
                agent.pause();
            }
            Ok(())
        })))
        .await
        .unwrap();

    // The second step pauses in its end hook; that step still counts.
    assert_eq!(steps, 2);
    assert!(agent.is_paused());

    agent.resume();
    let more = agent.run(RunOptions::with_max_steps(1)).await.unwrap();
    assert_eq!(more, 1);
}

#[tokio::test]
async fn test_hook_error_aborts_run() {
    let agent = Agent::new("abort");
    let err = agent
        .run(RunOptions::with_max_steps(5).on_step_start(FnHook::new(|agent: &Agent| {
            if agent.steps_taken() == 2 {
                return Err(InstantlyError::Execution("stop here".into()));
            }
            Ok(())
        })))
        .await
        .unwrap_err();

    assert!(matches!(err, InstantlyError::Execution(ref m) if m == "stop here"));
    assert_eq!(agent.steps_taken(), 2);
}

#[tokio::test]
async fn test_zero_steps_runs_nothing() {
    let agent = Agent::new("noop");
    let called = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&called);
    let steps = agent
        .run(RunOptions::with_max_steps(0).on_step_start(FnHook::new(move |_agent: &Agent| {
            *flag.lock().unwrap() = true;
            Ok(())
        })))
        .await
        .unwrap();
    assert_eq!(steps, 0);
    assert!(!*called.lock().unwrap());
}

// ============================================================================
// Sandbox
// ============================================================================

#[tokio::test]
async fn test_scoped_sandbox_context() {
    let dir = tempdir().unwrap();
    let before_cwd = std::env::current_dir().unwrap();
    let config = SandboxConfig::new()
        .with_working_dir(dir.path())
        .with_env("INSTANTLY_IT_SCOPED", "1");

    let (working_dir, flag) = Sandbox::run(&config, |ctx| async move {
        Ok((ctx.working_dir.clone(), ctx.env("INSTANTLY_IT_SCOPED")))
    })
    .await
    .unwrap();

    assert_eq!(working_dir, dir.path());
    assert_eq!(flag.as_deref(), Some("1"));
    assert_eq!(std::env::current_dir().unwrap(), before_cwd);
    assert!(std::env::var("INSTANTLY_IT_SCOPED").is_err());
}

#[tokio::test]
async fn test_sandbox_missing_dir_is_config_error() {
    let err = Sandbox::run(
        &SandboxConfig::new().with_working_dir("/definitely/not/here/instantly"),
        |_ctx| async move { Ok(()) },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, InstantlyError::Config(_)));
}

#[tokio::test]
async fn test_filesystem_tool_stays_in_workdir() {
    let dir = tempdir().unwrap();
    let agent = Agent::builder("files")
        .tool(instantly::tools::FileSystemTool::default())
        .sandbox_config(SandboxConfig::new().with_working_dir(dir.path()))
        .build()
        .unwrap();

    agent
        .execute_tool(
            "filesystem",
            ToolArgs::new()
                .with_arg(json!("write"))
                .with_arg(json!("notes.txt"))
                .with_kwarg("content", json!("hello")),
        )
        .await
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(),
        "hello"
    );

    let read = agent
        .execute_tool(
            "filesystem",
            ToolArgs::new()
                .with_arg(json!("read"))
                .with_arg(json!("notes.txt")),
        )
        .await
        .unwrap();
    assert_eq!(read, json!("hello"));
}

// ============================================================================
// Session Persistence
// ============================================================================

#[tokio::test]
async fn test_snapshot_and_restore_through_file_store() {
    let dir = tempdir().unwrap();
    let store = JsonFileSessionStore::with_path(dir.path()).unwrap();

    let agent = Agent::builder("persist me")
        .id("agent-1")
        .tool(EchoTool)
        .build()
        .unwrap();
    agent.state().set("count", json!(3)).await.unwrap();
    agent
        .execute_tool("echo", ToolArgs::new().with_arg(json!("saved")))
        .await
        .unwrap();

    store.save(&agent.snapshot().unwrap()).await.unwrap();

    let loaded = store.load("agent-1").await.unwrap();
    assert_eq!(loaded.task, "persist me");
    assert_eq!(loaded.state.get("count"), Some(&json!(3)));
    assert_eq!(loaded.items.len(), 1);

    let fresh = Agent::builder("persist me").id("agent-1").build().unwrap();
    fresh.restore(&loaded);
    assert_eq!(fresh.state().get("count"), Some(json!(3)));
    // Restoring does not publish.
    assert!(fresh.event_bus().history(None).is_empty());
}
