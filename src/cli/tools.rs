//! `instantly tools`: list, describe and run built-in tools.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use instantly::agent::Agent;
use instantly::bus::EventType;
use instantly::config::Config;
use instantly::sandbox::{ResourceLimits, SandboxConfig};
use instantly::tools::{default_tools, EchoTool, Tool, ToolArgs, ToolRegistry};

use super::ToolsAction;

pub(crate) async fn cmd_tools(action: ToolsAction) -> Result<()> {
    match action {
        ToolsAction::List => cmd_tools_list(),
        ToolsAction::Info { name } => cmd_tools_info(&name),
        ToolsAction::Exec {
            name,
            args,
            kwargs,
            workdir,
            env,
            cpu_time,
        } => {
            let call = parse_tool_args(&args, &kwargs)?;
            let mut overrides = SandboxConfig::new();
            if let Some(dir) = workdir {
                overrides = overrides.with_working_dir(dir);
            }
            for pair in &env {
                let (key, value) = split_pair(pair, "--env")?;
                overrides = overrides.with_env(key, value);
            }
            if let Some(secs) = cpu_time {
                overrides = overrides.with_limits(configured_limits()?.with_max_cpu_time(secs));
            }
            cmd_tools_exec(&name, call, &overrides).await
        }
    }
}

/// Built-in tools enabled by config, plus `echo`.
fn configured_tools(config: &Config) -> Result<Vec<Arc<dyn Tool>>> {
    let mut tools = default_tools(&config.tools).context("Failed to build tools from config")?;
    if config.tools.is_enabled("echo") {
        tools.insert(0, Arc::new(EchoTool));
    }
    Ok(tools)
}

fn configured_limits() -> Result<ResourceLimits> {
    Ok(Config::load()?.sandbox.resource_limits())
}

fn cmd_tools_list() -> Result<()> {
    let config = Config::load()?;
    let mut registry = ToolRegistry::new();
    for tool in configured_tools(&config)? {
        registry.register_arc(tool)?;
    }

    println!("Available Tools ({} total)", registry.len());
    println!("{}", "=".repeat(60));
    println!();

    for meta in registry.list_tools() {
        let tags: Vec<&str> = meta.tags.iter().map(String::as_str).collect();
        println!("  {} (v{})", meta.name, meta.version);
        println!("      {}", meta.description);
        if !tags.is_empty() {
            println!("      Tags: {}", tags.join(", "));
        }
        println!();
    }

    if !config.tools.disabled.is_empty() {
        println!("Disabled: {}", config.tools.disabled.join(", "));
    }
    Ok(())
}

fn cmd_tools_info(name: &str) -> Result<()> {
    let config = Config::load()?;

    match configured_tools(&config)?.into_iter().find(|t| t.name() == name) {
        Some(tool) => {
            let meta = tool.describe();
            println!("Tool: {}", meta.name);
            println!("{}", "-".repeat(40));
            println!("Description: {}", meta.description);
            println!("Version: {}", meta.version);
            if let Some(author) = &meta.author {
                println!("Author: {}", author);
            }
            println!("Async: {}", meta.is_async);
            println!("Requires auth: {}", meta.requires_auth);
            println!(
                "Parameters:\n{}",
                serde_json::to_string_pretty(&tool.parameters())?
            );
        }
        None => {
            println!(
                "Unknown tool '{}'. Run 'instantly tools list' to see all tools.",
                name
            );
        }
    }
    Ok(())
}

async fn cmd_tools_exec(name: &str, args: ToolArgs, overrides: &SandboxConfig) -> Result<()> {
    let config = Config::load()?;
    let agent = Agent::builder(format!("tools exec {}", name))
        .sandbox_config(config.sandbox.to_sandbox_config())
        .tools(configured_tools(&config)?)
        .build()?;

    let result = agent.execute_tool_with(name, args, overrides).await;

    if let Some(event) = agent
        .event_bus()
        .history(Some(EventType::ToolExecution))
        .last()
    {
        println!("Event:");
        println!("{}", serde_json::to_string_pretty(event.as_ref())?);
        println!();
    }

    let value = result.with_context(|| format!("Tool '{}' failed", name))?;
    println!("Result:");
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Interpret a CLI value as JSON when it parses, otherwise as a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn split_pair<'a>(pair: &'a str, flag: &str) -> Result<(&'a str, &'a str)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => bail!("{} expects KEY=VALUE, got '{}'", flag, pair),
    }
}

fn parse_tool_args(args: &[String], kwargs: &[String]) -> Result<ToolArgs> {
    let mut call = ToolArgs::from_args(args.iter().map(|a| parse_value(a)).collect());
    for pair in kwargs {
        let (key, value) = split_pair(pair, "--kw")?;
        call = call.with_kwarg(key, parse_value(value));
    }
    Ok(call)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("[\"a\"]"), json!(["a"]));
        assert_eq!(parse_value("hello world"), json!("hello world"));
        assert_eq!(parse_value("true"), json!(true));
    }

    #[test]
    fn test_parse_tool_args() {
        let call = parse_tool_args(
            &["read".to_string(), "notes.txt".to_string()],
            &["content=hi=there".to_string()],
        )
        .unwrap();
        assert_eq!(call.args, vec![json!("read"), json!("notes.txt")]);
        assert_eq!(call.kwargs.get("content"), Some(&json!("hi=there")));
    }

    #[test]
    fn test_bad_pair() {
        assert!(parse_tool_args(&[], &["novalue".to_string()]).is_err());
        assert!(split_pair("=x", "--env").is_err());
    }

    #[test]
    fn test_configured_tools_include_echo() {
        let names: Vec<String> = configured_tools(&Config::default())
            .unwrap()
            .iter()
            .map(|t| t.name())
            .collect();
        assert_eq!(names[0], "echo");
        assert!(names.contains(&"filesystem".to_string()));
    }
}
