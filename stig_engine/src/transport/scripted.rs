//! Rule-driven transport for exercising engine components without a real host

use super::{CommandLine, CommandOutput, ExecOptions, Transport, TransportError};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// What a scripted command returns
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Output(CommandOutput),
    Error(TransportError),
    /// Panics inside `execute`, after the call is journaled
    Panic(String),
}

impl ScriptedResponse {
    pub fn ok() -> Self {
        Self::exit(0, "", "")
    }

    pub fn stdout(stdout: &str) -> Self {
        Self::exit(0, stdout, "")
    }

    pub fn exit(exit_code: i32, stdout: &str, stderr: &str) -> Self {
        ScriptedResponse::Output(CommandOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
            duration: Duration::from_millis(1),
        })
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        ScriptedResponse::Error(TransportError::Timeout {
            command: "scripted".to_string(),
            timeout_ms,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Connect,
    Execute,
    PutFile,
    Disconnect,
}

/// One recorded interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCall {
    pub kind: CallKind,
    pub detail: String,
    pub elevated: bool,
}

struct Rule {
    prefix: String,
    responses: VecDeque<ScriptedResponse>,
}

/// Answers commands from a prefix-matched rule table and journals every call
///
/// Unmatched commands succeed with empty output. When several responses are
/// registered for one prefix they are returned in order and the last one
/// repeats.
pub struct ScriptedTransport {
    target: String,
    rules: Mutex<Vec<Rule>>,
    journal: Arc<Mutex<Vec<ScriptedCall>>>,
    connect_error: Option<String>,
    delivery_error: Option<String>,
}

impl ScriptedTransport {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            rules: Mutex::new(Vec::new()),
            journal: Arc::new(Mutex::new(Vec::new())),
            connect_error: None,
            delivery_error: None,
        }
    }

    /// Register a response for commands whose shell form starts with `prefix`
    pub fn respond(self, prefix: &str, response: ScriptedResponse) -> Self {
        {
            let mut rules = lock(&self.rules);
            match rules.iter_mut().find(|r| r.prefix == prefix) {
                Some(rule) => rule.responses.push_back(response),
                None => rules.push(Rule {
                    prefix: prefix.to_string(),
                    responses: VecDeque::from([response]),
                }),
            }
        }
        self
    }

    pub fn fail_connect(mut self, reason: &str) -> Self {
        self.connect_error = Some(reason.to_string());
        self
    }

    pub fn fail_delivery(mut self, reason: &str) -> Self {
        self.delivery_error = Some(reason.to_string());
        self
    }

    /// Share an external journal so calls stay observable after the transport is dropped
    pub fn with_journal(mut self, journal: Arc<Mutex<Vec<ScriptedCall>>>) -> Self {
        self.journal = journal;
        self
    }

    pub fn journal(&self) -> Arc<Mutex<Vec<ScriptedCall>>> {
        Arc::clone(&self.journal)
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        lock(&self.journal).clone()
    }

    /// Shell forms of every executed command, in order
    pub fn executed(&self) -> Vec<String> {
        lock(&self.journal)
            .iter()
            .filter(|c| c.kind == CallKind::Execute)
            .map(|c| c.detail.clone())
            .collect()
    }

    fn record(&self, kind: CallKind, detail: String, elevated: bool) {
        lock(&self.journal).push(ScriptedCall {
            kind,
            detail,
            elevated,
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Transport for ScriptedTransport {
    fn target(&self) -> &str {
        &self.target
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        self.record(CallKind::Connect, self.target.clone(), false);
        match &self.connect_error {
            Some(reason) => Err(TransportError::ConnectFailed {
                target: self.target.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn execute(
        &self,
        command: &CommandLine,
        options: ExecOptions,
    ) -> Result<CommandOutput, TransportError> {
        let shell = command.to_shell_string();
        self.record(CallKind::Execute, shell.clone(), options.elevate);

        let response = {
            let mut rules = lock(&self.rules);
            rules
                .iter_mut()
                .filter(|r| shell.starts_with(&r.prefix))
                .max_by_key(|r| r.prefix.len())
                .and_then(|rule| {
                    if rule.responses.len() > 1 {
                        rule.responses.pop_front()
                    } else {
                        rule.responses.front().cloned()
                    }
                })
        };

        match response.unwrap_or_else(ScriptedResponse::ok) {
            ScriptedResponse::Output(output) => Ok(output),
            ScriptedResponse::Error(TransportError::Timeout { timeout_ms, .. }) => {
                Err(TransportError::Timeout {
                    command: shell,
                    timeout_ms,
                })
            }
            ScriptedResponse::Error(err) => Err(err),
            ScriptedResponse::Panic(message) => panic!("{}", message),
        }
    }

    fn put_file(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        self.record(CallKind::PutFile, remote.to_string(), false);
        match &self.delivery_error {
            Some(reason) => Err(TransportError::DeliveryFailed {
                target: self.target.clone(),
                local: local.display().to_string(),
                remote: remote.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn disconnect(&mut self) {
        self.record(CallKind::Disconnect, self.target.clone(), false);
    }
}
