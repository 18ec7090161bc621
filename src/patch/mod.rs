// ABOUTME: Code preparation: adapts application source to the provisioned environment.
// ABOUTME: Rewrites loopback addresses and listener ports, injects runtime variables into .env.

mod env_file;
mod error;
mod source;

pub use env_file::EnvFile;
pub use error::{Conflict, PatchError};
pub use source::{SKIP_DIRS, SourceTree};

use regex::{Captures, NoExpand, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::config::{PatchConfig, resolve_env_map};
use crate::decision::InfrastructureDecision;
use crate::provision::ProvisionedEnvironment;

pub const ENV_FILE: &str = ".env";

/// Address services bind to on provisioned hosts.
pub const BIND_ADDRESS: &str = "0.0.0.0";

static LOOPBACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(localhost|127\.0\.0\.1)\b").expect("valid loopback pattern"));

/// `port=5000`, `port = 3000`. Not `DB_PORT` or `PORT` from the environment.
static LISTEN_PORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(port\s*=\s*)(\d+)\b").expect("valid port pattern"));

const DATABASE_HINTS: &[&str] = &[
    "database", "db_", "db.", "postgres", "mysql", "mongo", "sqlalchemy", "5432", "3306",
];

const TEXT_EXTENSIONS: &[&str] = &[
    "py", "js", "mjs", "cjs", "ts", "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "env",
];

/// What to do when the source already sets a variable to a different value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    #[default]
    Reject,
    Override,
    KeepExisting,
}

/// Source ready to ship, plus the variables the process must run with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSource {
    pub tree: SourceTree,
    /// Effective runtime variables, as written to `.env`.
    pub env: BTreeMap<String, String>,
    /// Human-readable summary of edits.
    pub changes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Preparer {
    policy: ConflictPolicy,
    extra: BTreeMap<String, String>,
}

impl Preparer {
    pub fn new(policy: ConflictPolicy, extra: BTreeMap<String, String>) -> Self {
        Self { policy, extra }
    }

    pub fn from_config(config: &PatchConfig) -> crate::error::Result<Self> {
        Ok(Self::new(config.on_conflict, resolve_env_map(&config.env)?))
    }

    /// Load the repository off the async runtime, then prepare it.
    pub async fn prepare_repository(
        &self,
        root: &Path,
        decision: &InfrastructureDecision,
        env: &ProvisionedEnvironment,
    ) -> Result<PreparedSource, PatchError> {
        let root = root.to_path_buf();
        let tree = tokio::task::spawn_blocking(move || SourceTree::load(&root))
            .await
            .map_err(|e| PatchError::Task(e.to_string()))??;
        self.prepare(tree, decision, env)
    }

    /// Pure transformation. Running it on its own output changes nothing.
    pub fn prepare(
        &self,
        mut tree: SourceTree,
        decision: &InfrastructureDecision,
        env: &ProvisionedEnvironment,
    ) -> Result<PreparedSource, PatchError> {
        let mut changes = Vec::new();
        let listen_port = decision
            .shape
            .is_host()
            .then(|| decision.params.primary_port())
            .flatten();

        let rewrites: Vec<(PathBuf, String, usize, usize)> = tree
            .iter()
            .filter(|(path, _)| is_text_config(path))
            .filter_map(|(path, bytes)| {
                let text = std::str::from_utf8(bytes).ok()?;
                let (text, hosts) = rewrite_loopback(text, env);
                let (text, ports) = match listen_port {
                    Some(port) => rewrite_listen_port(&text, port),
                    None => (text, 0),
                };
                (hosts + ports > 0).then(|| (path.to_path_buf(), text, hosts, ports))
            })
            .collect();

        for (path, rewritten, hosts, ports) in rewrites {
            if hosts > 0 {
                changes.push(format!(
                    "rewrote {hosts} loopback reference(s) in {}",
                    path.display()
                ));
            }
            if ports > 0 {
                changes.push(format!(
                    "rewrote {ports} listener port(s) in {}",
                    path.display()
                ));
            }
            tree.insert(path, rewritten);
        }

        let wanted = self.injected_variables(decision, env);
        let mut dotenv = tree.text(ENV_FILE).map(EnvFile::parse).unwrap_or_default();

        let mut conflicts = Vec::new();
        for (key, value) in &wanted {
            match dotenv.get(key) {
                Some(existing) if existing == value => {}
                Some(existing) => match self.policy {
                    ConflictPolicy::Reject => conflicts.push(Conflict {
                        variable: key.clone(),
                        existing: existing.to_string(),
                        injected: value.clone(),
                    }),
                    ConflictPolicy::KeepExisting => {
                        changes.push(format!("kept existing {key} in {ENV_FILE}"));
                    }
                    ConflictPolicy::Override => {
                        changes.push(format!("overrode {key} in {ENV_FILE}"));
                        dotenv.set(key, value);
                    }
                },
                None => {
                    changes.push(format!("set {key} in {ENV_FILE}"));
                    dotenv.set(key, value);
                }
            }
        }

        if !conflicts.is_empty() {
            return Err(PatchError::Conflict {
                file: PathBuf::from(ENV_FILE),
                conflicts,
            });
        }

        let rendered = dotenv.render();
        if tree.text(ENV_FILE) != Some(rendered.as_str()) {
            tree.insert(ENV_FILE, rendered);
        }

        let env = dotenv
            .entries()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Ok(PreparedSource { tree, env, changes })
    }

    /// Variables the target shape needs. Operator-configured entries win.
    pub fn injected_variables(
        &self,
        decision: &InfrastructureDecision,
        env: &ProvisionedEnvironment,
    ) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();

        if decision.shape.is_host() {
            vars.insert("HOST".to_string(), BIND_ADDRESS.to_string());
            if let Some(port) = decision.params.primary_port() {
                vars.insert("PORT".to_string(), port.to_string());
            }
        }
        if let Some(url) = &env.database_url {
            vars.insert("DATABASE_URL".to_string(), url.clone());
        }
        if let Some(host) = &env.database_endpoint {
            vars.insert("DB_HOST".to_string(), host.clone());
        }
        if let Some(cache) = &env.cache_endpoint {
            vars.insert("REDIS_URL".to_string(), format!("redis://{cache}:6379"));
        }
        if let Some(queue) = &env.queue_url {
            vars.insert("QUEUE_URL".to_string(), queue.clone());
        }

        vars.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }
}

fn is_text_config(path: &Path) -> bool {
    if path.file_name().and_then(|n| n.to_str()) == Some(ENV_FILE) {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext))
}

/// Point loopback references at provisioned services. Returns the new text
/// and how many lines changed.
fn rewrite_loopback(text: &str, env: &ProvisionedEnvironment) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut changed = 0;

    for line in text.split_inclusive('\n') {
        if !LOOPBACK.is_match(line) {
            out.push_str(line);
            continue;
        }

        let lower = line.to_lowercase();
        let target = if DATABASE_HINTS.iter().any(|hint| lower.contains(hint)) {
            env.database_endpoint.as_deref()
        } else if lower.contains("redis") {
            env.cache_endpoint.as_deref()
        } else {
            Some(BIND_ADDRESS)
        };

        match target {
            Some(target) => {
                out.push_str(&LOOPBACK.replace_all(line, NoExpand(target)));
                changed += 1;
            }
            // Nothing provisioned for it: leave the line alone.
            None => out.push_str(line),
        }
    }

    (out, changed)
}

fn mentions_backing_service(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("redis") || DATABASE_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Point hard-coded listener ports at the port the host exposes. Lines that
/// talk about a database or cache keep their port.
fn rewrite_listen_port(text: &str, port: u16) -> (String, usize) {
    let wanted = port.to_string();
    let mut out = String::with_capacity(text.len());
    let mut changed = 0;

    for line in text.split_inclusive('\n') {
        let stale = LISTEN_PORT
            .captures_iter(line)
            .any(|caps| &caps[2] != wanted);
        if !stale || mentions_backing_service(line) {
            out.push_str(line);
            continue;
        }
        let rewritten =
            LISTEN_PORT.replace_all(line, |caps: &Captures| format!("{}{wanted}", &caps[1]));
        out.push_str(&rewritten);
        changed += 1;
    }

    (out, changed)
}
