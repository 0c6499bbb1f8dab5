pub mod process;
pub mod testing;

use std::fmt;

use async_trait::async_trait;

use crate::error::RiskSyncError;

/// A fully-formed external command: program plus argument vector.
///
/// Arguments are passed to the process as-is, never through a shell, so
/// account names taken from the risk report cannot inject shell syntax.
/// Arguments added with [`CommandLine::secret_arg`] render as `***` in
/// `Display` output and therefore in logs and error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub(crate) program: String,
    pub(crate) args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Arg {
    pub(crate) value: String,
    pub(crate) secret: bool,
}

impl CommandLine {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_owned(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            secret: false,
        });
        self
    }

    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self = self.arg(value);
        }
        self
    }

    pub fn secret_arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            secret: true,
        });
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.secret {
                f.write_str(" ***")?;
            } else if arg.value.is_empty() || arg.value.contains(char::is_whitespace) {
                write!(f, " '{}'", arg.value)?;
            } else {
                write!(f, " {}", arg.value)?;
            }
        }
        Ok(())
    }
}

/// Executes directory-management commands. The only seam between the
/// reconciliation logic and the outside world's CLI tooling.
///
/// Implementations return trimmed standard output on success.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &CommandLine) -> Result<String, RiskSyncError>;
}
