//! Operator hooks bound to push and delete events
//!
//! Hook templates are Tera templates compiled once when the engine is
//! built; a template that fails to compile fails construction. Templates
//! reach the outside world only through [`HookActions`], exposed to them as
//! the `log(level, message)` and `notify(url, body)` functions.
//!
//! Evaluation is serialized: the engine owns its compiled templates behind a
//! single lock and renders one hook at a time.

mod actions;

pub use actions::{HookActions, HttpActions, LogLevel, TracingActions};

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tera::{Context, Tera, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::Document;

/// Events a hook can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookEvent {
    Push,
    Delete,
}

/// Hook as declared in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookConfig {
    /// Unique hook name
    pub name: String,
    /// Event the hook fires on
    pub event: HookEvent,
    /// Tera template source
    #[serde(default)]
    pub template: Option<String>,
}

/// A configured hook; read-only once the engine is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    pub name: String,
    pub event: HookEvent,
    compiled: bool,
}

impl Hook {
    /// Whether a template was compiled for this hook
    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    fn template_name(&self) -> String {
        format!("hook:{}", self.name)
    }
}

/// Values a hook template can read
#[derive(Debug, Clone, Serialize)]
pub struct HookContext {
    pub event: HookEvent,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: String,
    /// The freshly indexed document (push events only)
    pub document: Option<Document>,
}

/// Compiles hooks and evaluates them against events
pub struct HookEngine {
    hooks: Vec<Hook>,
    templates: Mutex<Tera>,
}

impl std::fmt::Debug for HookEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookEngine")
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl HookEngine {
    /// Engine with no hooks
    pub fn empty() -> Self {
        Self {
            hooks: Vec::new(),
            templates: Mutex::new(Tera::default()),
        }
    }

    /// Compile every configured hook, failing on the first bad template
    pub fn new(configs: &[HookConfig], actions: Arc<dyn HookActions>) -> Result<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        register_actions(&mut tera, actions);

        let mut names = HashSet::new();
        let mut hooks = Vec::with_capacity(configs.len());

        for config in configs {
            if config.name.trim().is_empty() {
                return Err(Error::invalid_config("hook name must not be empty"));
            }
            if !names.insert(config.name.as_str()) {
                return Err(Error::invalid_config(format!(
                    "duplicate hook name '{}'",
                    config.name
                )));
            }

            let mut hook = Hook {
                name: config.name.clone(),
                event: config.event,
                compiled: false,
            };
            if let Some(source) = &config.template {
                tera.add_raw_template(&hook.template_name(), source)
                    .map_err(|e| Error::hook_compile(&config.name, tera_message(&e)))?;
                hook.compiled = true;
            } else {
                warn!("Hook '{}' has no template and will report an error when fired", hook.name);
            }
            debug!("Registered hook '{}' on {:?}", hook.name, hook.event);
            hooks.push(hook);
        }

        Ok(Self {
            hooks,
            templates: Mutex::new(tera),
        })
    }

    /// All configured hooks
    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    /// Hooks bound to one event
    pub fn hooks_for(&self, event: HookEvent) -> impl Iterator<Item = &Hook> {
        self.hooks.iter().filter(move |h| h.event == event)
    }

    /// Render one hook against an event context, returning its output
    pub fn eval(&self, hook: &Hook, ctx: &HookContext) -> Result<String> {
        if !hook.compiled {
            return Err(Error::HookNotCompiled {
                hook: hook.name.clone(),
            });
        }

        let context = Context::from_serialize(ctx)
            .map_err(|e| Error::hook_eval(&hook.name, tera_message(&e)))?;

        let templates = self.templates.lock().unwrap_or_else(PoisonError::into_inner);
        templates
            .render(&hook.template_name(), &context)
            .map_err(|e| Error::hook_eval(&hook.name, tera_message(&e)))
    }

    /// Run every hook bound to the context's event
    ///
    /// A failing hook does not stop the others; all failures are returned.
    pub fn fire(&self, ctx: &HookContext) -> Vec<Error> {
        let mut failures = Vec::new();
        for hook in self.hooks_for(ctx.event) {
            match self.eval(hook, ctx) {
                Ok(output) => {
                    let output = output.trim();
                    if !output.is_empty() {
                        debug!("Hook '{}' output: {}", hook.name, output);
                    }
                }
                Err(e) => {
                    warn!("{}", e);
                    failures.push(e);
                }
            }
        }
        failures
    }
}

fn register_actions(tera: &mut Tera, actions: Arc<dyn HookActions>) {
    let log_actions = Arc::clone(&actions);
    tera.register_function(
        "log",
        move |args: &HashMap<String, Value>| -> tera::Result<Value> {
            let level = match args.get("level") {
                Some(v) => text(v)
                    .parse::<LogLevel>()
                    .map_err(|e| tera::Error::msg(e.to_string()))?,
                None => LogLevel::Info,
            };
            let message = required(args, "log", "message")?;
            log_actions
                .log(level, &message)
                .map_err(|e| tera::Error::msg(format!("log failed: {:#}", e)))?;
            Ok(Value::String(String::new()))
        },
    );

    tera.register_function(
        "notify",
        move |args: &HashMap<String, Value>| -> tera::Result<Value> {
            let url = required(args, "notify", "url")?;
            let body = args.get("body").map(text).unwrap_or_default();
            actions
                .notify(&url, &body)
                .map_err(|e| tera::Error::msg(format!("notify failed: {:#}", e)))?;
            Ok(Value::String(String::new()))
        },
    );
}

fn required(args: &HashMap<String, Value>, function: &str, name: &str) -> tera::Result<String> {
    args.get(name).map(text).ok_or_else(|| {
        tera::Error::msg(format!("{}() requires a '{}' argument", function, name))
    })
}

/// Strings pass through; anything else is rendered as JSON
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Tera wraps the useful detail in its error source chain
fn tera_message(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
