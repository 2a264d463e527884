//! In-memory executor for tests.
//!
//! Records every command and answers from a rule list: the first rule
//! whose needle occurs in the command replies. Files written through
//! [`shell::write_file_command`](crate::shell::write_file_command) are
//! kept in memory and served back to `cat <path>`. Anything else
//! succeeds with empty output.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{RemoteExecutionError, RemoteResult};
use crate::executor::{CommandOutput, RemoteExecutor, RemoteTarget};

/// Scripted answer to one command.
#[derive(Debug, Clone)]
pub enum Reply {
    Output(CommandOutput),
    /// The session could not be established or was lost.
    Drop,
}

impl Reply {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Reply::Output(CommandOutput {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        })
    }

    pub fn fail(exit_code: i32, stderr: impl Into<String>) -> Self {
        Reply::Output(CommandOutput {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        })
    }
}

struct Rule {
    needle: String,
    /// The last reply repeats once the others are used up.
    replies: VecDeque<Reply>,
}

#[derive(Default)]
struct Host {
    rules: Vec<Rule>,
    files: HashMap<String, String>,
    log: Vec<String>,
}

#[derive(Default)]
pub struct ScriptedExecutor {
    host: Mutex<Host>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `needle` with `reply`.
    pub fn on(self, needle: &str, reply: Reply) -> Self {
        self.on_seq(needle, vec![reply])
    }

    /// Answer successive commands containing `needle` with `replies`.
    pub fn on_seq(self, needle: &str, replies: Vec<Reply>) -> Self {
        self.lock().rules.push(Rule {
            needle: needle.to_string(),
            replies: replies.into(),
        });
        self
    }

    pub fn put_file(&self, path: &str, content: &str) {
        self.lock().files.insert(path.to_string(), content.to_string());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.lock().files.get(path).cloned()
    }

    /// Every command received, in order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Number of commands containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.lock().log.iter().filter(|c| c.contains(needle)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Host> {
        self.host.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Host {
    fn answer(&mut self, command: &str) -> Reply {
        if let Some(rule) = self.rules.iter_mut().find(|r| command.contains(&r.needle)) {
            return if rule.replies.len() > 1 {
                rule.replies.pop_front().unwrap_or(Reply::Drop)
            } else {
                rule.replies.front().cloned().unwrap_or(Reply::Drop)
            };
        }
        if let Some((path, content)) = parse_write(command) {
            self.files.insert(path, content);
            return Reply::ok("");
        }
        if let Some(path) = command.strip_prefix("cat ") {
            return match self.files.get(path.trim()) {
                Some(content) => Reply::ok(content.clone()),
                None => Reply::fail(1, format!("cat: {}: No such file or directory", path.trim())),
            };
        }
        Reply::ok("")
    }
}

/// Recover `(path, content)` from a write command. Only unquoted paths
/// are understood, which is all the pipeline produces.
fn parse_write(command: &str) -> Option<(String, String)> {
    let (_, rest) = command.split_once("echo '")?;
    let (encoded, rest) = rest.split_once("' | base64 -d > ")?;
    let content = STANDARD.decode(encoded).ok()?;
    Some((rest.trim().to_string(), String::from_utf8(content).ok()?))
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn run(&self, target: &RemoteTarget, command: &str) -> RemoteResult<CommandOutput> {
        let mut host = self.lock();
        host.log.push(command.to_string());
        match host.answer(command) {
            Reply::Output(output) => Ok(output),
            Reply::Drop => Err(RemoteExecutionError::ConnectionFailed {
                target: target.to_string(),
                attempts: 1,
                stderr: "Connection closed by remote host".to_string(),
            }),
        }
    }
}
