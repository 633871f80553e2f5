//! Scripted tool executor (testing only)
//!
//! `ScriptedExecutor` answers invocations from a list of rules and records
//! every call, so pipeline stages can be exercised without cargo, git, a
//! solver or a verifier installed.

use std::sync::Mutex;

use async_trait::async_trait;

use cpbench_core::{HarnessError, Result};

use crate::tool::{OutputSink, ToolExecutor, ToolInvocation, ToolOutput};

type Matcher = Box<dyn Fn(&ToolInvocation) -> bool + Send + Sync>;
type Responder = Box<dyn Fn(&ToolInvocation) -> ToolOutput + Send + Sync>;

struct Rule {
    matches: Matcher,
    respond: Responder,
}

/// Executor that answers from scripted rules.
///
/// Rules are tried in registration order; the first match answers. Scripted
/// stdout and stderr are written to file sinks the same way a real process
/// would stream them. An invocation no rule matches fails like a missing
/// program.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Vec<Rule>,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every invocation with this tool name.
    pub fn on(self, name: &str, output: ToolOutput) -> Self {
        self.on_with(name, move |_| output.clone())
    }

    /// Answer every invocation with this tool name through a closure.
    pub fn on_with<F>(self, name: &str, respond: F) -> Self
    where
        F: Fn(&ToolInvocation) -> ToolOutput + Send + Sync + 'static,
    {
        let name = name.to_string();
        self.on_match(move |inv| inv.name == name, respond)
    }

    /// Answer invocations selected by an arbitrary predicate.
    pub fn on_match<M, F>(mut self, matches: M, respond: F) -> Self
    where
        M: Fn(&ToolInvocation) -> bool + Send + Sync + 'static,
        F: Fn(&ToolInvocation) -> ToolOutput + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            matches: Box::new(matches),
            respond: Box::new(respond),
        });
        self
    }

    /// Every invocation received so far, in call order.
    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Invocations with this tool name.
    pub fn calls_named(&self, name: &str) -> Vec<ToolInvocation> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|inv| inv.name == name)
            .cloned()
            .collect()
    }
}

fn write_sink(sink: &OutputSink, content: &str) -> Result<()> {
    if let OutputSink::File(path) = sink {
        std::fs::write(path, content)?;
    }
    Ok(())
}

#[async_trait]
impl ToolExecutor for ScriptedExecutor {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        let rule = self
            .rules
            .iter()
            .find(|rule| (rule.matches)(invocation))
            .ok_or_else(|| HarnessError::ToolSpawn {
                program: invocation.program.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no scripted response for {}", invocation.name),
                ),
            })?;

        let mut output = (rule.respond)(invocation);
        write_sink(&invocation.stdout, &output.stdout)?;
        write_sink(&invocation.stderr, &output.stderr)?;
        if matches!(invocation.stdout, OutputSink::File(_)) {
            output.stdout.clear();
        }
        if matches!(invocation.stderr, OutputSink::File(_)) {
            output.stderr.clear();
        }
        Ok(output)
    }
}
