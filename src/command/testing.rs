//! In-memory [`CommandRunner`] for exercising directory logic without the
//! real directory CLI.
//!
//! Responses are matched by prefix against the rendered command line, first
//! registered rule wins. Every call is recorded so tests can assert exactly
//! which mutations were issued.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::RiskSyncError;

use super::{CommandLine, CommandRunner};

#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<String>>,
}

#[derive(Debug)]
struct Rule {
    prefix: String,
    response: Result<String, String>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands starting with `prefix` succeed with `output`.
    pub fn respond(mut self, prefix: &str, output: &str) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_owned(),
            response: Ok(output.to_owned()),
        });
        self
    }

    /// Commands starting with `prefix` fail with `error`.
    pub fn fail(mut self, prefix: &str, error: &str) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_owned(),
            response: Err(error.to_owned()),
        });
        self
    }

    /// Rendered command lines in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded calls starting with `prefix`.
    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandLine) -> Result<String, RiskSyncError> {
        let rendered = command.to_string();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(rendered.clone());

        match self.rules.iter().find(|r| rendered.starts_with(&r.prefix)) {
            Some(Rule { response: Ok(out), .. }) => Ok(out.trim().to_owned()),
            Some(Rule { response: Err(e), .. }) => Err(RiskSyncError::Command(e.clone())),
            None => Err(RiskSyncError::Command(format!(
                "no scripted response for `{rendered}`"
            ))),
        }
    }
}
