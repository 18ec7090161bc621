// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use serde::Serialize;
use std::time::Instant;

use crate::decision::{InfrastructureDecision, SizeTier};
use crate::job::JobSnapshot;
use crate::logbus::LogEvent;
use crate::provision::describe_resources;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// One line from a job's log.
    pub fn event(&self, event: &LogEvent) {
        match self.mode {
            OutputMode::Normal => println!("{event}"),
            OutputMode::Quiet => {}
            OutputMode::Json => print_json(&JsonLog {
                event: "log",
                log: event,
            }),
        }
    }

    /// Print a warning (suppressed in quiet mode).
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("Warning: {message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => print_json(&JsonEvent {
                event: "warning",
                message,
                duration_secs: None,
            }),
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => {
                // Print only the essential result
                println!("{message}");
            }
            OutputMode::Json => print_json(&JsonEvent {
                event: "success",
                message,
                duration_secs: self.duration(),
            }),
        }
    }

    pub fn snapshot(&self, snapshot: &JobSnapshot) {
        match self.mode {
            OutputMode::Json => print_json(&JsonSnapshot {
                event: "job",
                job: snapshot,
            }),
            OutputMode::Quiet => {
                if let Some(url) = &snapshot.url {
                    println!("{url}");
                } else {
                    println!("{}", snapshot.stage);
                }
            }
            OutputMode::Normal => print!("{}", describe_snapshot(snapshot)),
        }
    }

    pub fn decision(&self, decision: &InfrastructureDecision) {
        match self.mode {
            OutputMode::Json => print_json(decision),
            OutputMode::Quiet => println!("{}", decision.shape),
            OutputMode::Normal => print!("{}", describe_decision(decision)),
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    if let Ok(json) = serde_json::to_string(value) {
        println!("{json}");
    }
}

pub fn describe_snapshot(snapshot: &JobSnapshot) -> String {
    let mut out = format!("Job:     {}\nStage:   {}\n", snapshot.id, snapshot.stage);
    let path: Vec<_> = snapshot.stages.iter().map(|s| s.as_str()).collect();
    out.push_str(&format!("History: {}\n", path.join(" -> ")));
    if let Some(decision) = &snapshot.decision {
        out.push_str(&format!("Shape:   {} ({})\n", decision.shape, decision.rule));
    }
    if let Some(url) = &snapshot.url {
        out.push_str(&format!("URL:     {url}\n"));
    }
    if let Some(failure) = &snapshot.failure {
        out.push_str(&format!(
            "Failure: {} during {}\n         {}\n",
            failure.cause, failure.stage, failure.detail
        ));
    }
    if snapshot.teardown_requested {
        out.push_str("Marked for teardown\n");
    }
    if !snapshot.resources.is_empty() {
        out.push_str(&format!(
            "Resources: {}\n",
            describe_resources(&snapshot.resources)
        ));
    }
    out
}

pub fn describe_decision(decision: &InfrastructureDecision) -> String {
    let params = &decision.params;
    let size = match &params.size {
        SizeTier::Instance { instance_type } => instance_type.clone(),
        SizeTier::Function { memory_mb } => format!("{memory_mb} MB"),
    };
    let mut out = format!(
        "Shape:   {}\nRule:    {}\nRegion:  {}\nRuntime: {}\nSize:    {}\n",
        decision.shape,
        decision.rule,
        params.region,
        params.runtime.as_str(),
        size
    );
    if !params.ports.is_empty() {
        let ports: Vec<_> = params.ports.iter().map(u16::to_string).collect();
        out.push_str(&format!("Ports:   {}\n", ports.join(", ")));
    }
    for (label, service) in [
        ("Database", &params.database),
        ("Cache", &params.cache),
        ("Queue", &params.queue),
    ] {
        if let Some(service) = service {
            out.push_str(&format!("{label}: {service}\n"));
        }
    }
    for note in &decision.notes {
        out.push_str(&format!("  - {note}\n"));
    }
    out
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct JsonLog<'a> {
    event: &'a str,
    #[serde(flatten)]
    log: &'a LogEvent,
}

#[derive(Serialize)]
struct JsonSnapshot<'a> {
    event: &'a str,
    #[serde(flatten)]
    job: &'a JobSnapshot,
}
