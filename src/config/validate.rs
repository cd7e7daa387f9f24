//! Configuration validation with unknown field detection.

use serde_json::Value;

use super::Config;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &["agent", "sandbox", "tools", "logging"];

const KNOWN_AGENT: &[&str] = &[
    "max_steps",
    "model",
    "temperature",
    "max_tokens",
    "history_window",
];

const KNOWN_SANDBOX: &[&str] = &[
    "working_dir",
    "env_vars",
    "max_memory",
    "max_cpu_time",
    "max_file_size",
    "mode",
];

const KNOWN_TOOLS: &[&str] = &[
    "disabled",
    "web",
    "filesystem",
    "api_request",
    "command",
    "sqlite",
];

const KNOWN_LOGGING: &[&str] = &["format", "file", "level"];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        prev = row;
    }
    prev[b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn check_keys(
    obj: &serde_json::Map<String, Value>,
    prefix: &str,
    known: &[&str],
    out: &mut Vec<Diagnostic>,
) -> bool {
    let mut clean = true;
    for key in obj.keys() {
        if known.contains(&key.as_str()) {
            continue;
        }
        clean = false;
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let message = match suggest_field(key, known) {
            Some(hint) => format!("Unknown field '{}', {}", key, hint),
            None => format!("Unknown field '{}'", key),
        };
        out.push(Diagnostic::new(DiagnosticLevel::Error, path, message));
    }
    clean
}

/// Validate a raw JSON config value against known field names.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let Some(obj) = raw.as_object() else {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "",
            "Config must be a JSON object",
        ));
        return diagnostics;
    };
    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON"));

    let mut clean = check_keys(obj, "", KNOWN_TOP_LEVEL, &mut diagnostics);
    for (section, known) in [
        ("agent", KNOWN_AGENT),
        ("sandbox", KNOWN_SANDBOX),
        ("tools", KNOWN_TOOLS),
        ("logging", KNOWN_LOGGING),
    ] {
        if let Some(inner) = obj.get(section).and_then(Value::as_object) {
            clean &= check_keys(inner, section, known, &mut diagnostics);
        }
    }

    if clean {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }

    if let Some(env) = obj
        .get("sandbox")
        .and_then(|s| s.get("env_vars"))
        .and_then(Value::as_object)
    {
        for key in env.keys() {
            if key.to_ascii_uppercase().contains("KEY") || key.to_ascii_uppercase().contains("TOKEN")
            {
                diagnostics.push(Diagnostic::new(
                    DiagnosticLevel::Warn,
                    format!("sandbox.env_vars.{}", key),
                    "Looks like a secret; prefer a .env file over the config",
                ));
            }
        }
    }

    diagnostics
}

/// Semantic checks on a parsed config.
pub fn validate_values(config: &Config) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let sandbox = &config.sandbox;

    for (field, value) in [
        ("sandbox.max_memory", sandbox.max_memory),
        ("sandbox.max_cpu_time", sandbox.max_cpu_time),
        ("sandbox.max_file_size", sandbox.max_file_size),
    ] {
        if value == 0 {
            out.push(Diagnostic::new(
                DiagnosticLevel::Error,
                field,
                "Must be greater than zero",
            ));
        }
    }

    if let Some(dir) = &sandbox.working_dir {
        if !dir.is_dir() {
            out.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "sandbox.working_dir",
                format!("Directory does not exist: {}", dir.display()),
            ));
        }
    }

    if config.agent.max_steps == Some(0) {
        out.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "agent.max_steps",
            "Zero steps: runs will do nothing",
        ));
    }

    let engine = config.tools.web.search_engine.to_ascii_lowercase();
    if !crate::tools::web::SUPPORTED_ENGINES.contains(&engine.as_str()) {
        out.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "tools.web.search_engine",
            format!("Unsupported search engine: {}", config.tools.web.search_engine),
        ));
    }

    out
}
