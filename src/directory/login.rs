use std::sync::LazyLock;

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info};

use crate::error::RiskSyncError;

use super::Directory;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,4}$").expect("email pattern is valid")
});

/// Administrator credentials from config or environment. Missing values are
/// prompted for at login.
#[derive(Default)]
pub struct AdminCredentials {
    pub login: Option<String>,
    pub password: Option<SecretString>,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Interactive console input. A trait so login can be driven by tests.
pub trait Prompter {
    fn read_line(&mut self, prompt: &str) -> Result<String, RiskSyncError>;

    fn read_password(&mut self, prompt: &str) -> Result<SecretString, RiskSyncError>;
}

/// Reads from the controlling terminal: `rustyline` for the login name,
/// `dialoguer` for the hidden password.
///
/// Reads block until the operator answers, so they run under
/// [`tokio::task::block_in_place`]. Inside a runtime this needs the
/// multi-threaded scheduler.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn read_line(&mut self, prompt: &str) -> Result<String, RiskSyncError> {
        tokio::task::block_in_place(|| {
            let mut editor = rustyline::DefaultEditor::new()
                .map_err(|e| RiskSyncError::Prompt(e.to_string()))?;
            editor
                .readline(prompt)
                .map_err(|e| RiskSyncError::Prompt(e.to_string()))
        })
    }

    fn read_password(&mut self, prompt: &str) -> Result<SecretString, RiskSyncError> {
        tokio::task::block_in_place(|| {
            dialoguer::Password::new()
                .with_prompt(prompt)
                .allow_empty_password(true)
                .interact()
                .map(SecretString::from)
                .map_err(|e| RiskSyncError::Prompt(e.to_string()))
        })
    }
}

pub fn validate_email(email: &str) -> Result<(), RiskSyncError> {
    if EMAIL.is_match(email) {
        Ok(())
    } else {
        Err(RiskSyncError::InvalidEmail(email.to_owned()))
    }
}

/// Ask for the administrator's login name until a well-formed one is given.
pub fn read_admin_login(prompter: &mut dyn Prompter) -> Result<String, RiskSyncError> {
    loop {
        let line = prompter.read_line("Enter your Azure administrator's username: ")?;
        let login = line.trim();
        match validate_email(login) {
            Ok(()) => return Ok(login.to_owned()),
            Err(e) => error!(error = %e, "rejected administrator username"),
        }
    }
}

/// Reuse an existing CLI session, or log in with configured or prompted
/// credentials. Returns the signed-in account name.
pub async fn ensure_logged_in(
    directory: &Directory,
    credentials: &AdminCredentials,
    prompter: &mut dyn Prompter,
) -> Result<String, RiskSyncError> {
    if let Some(account) = directory.active_account().await? {
        info!(account = %account, "reusing existing directory session");
        return Ok(account);
    }

    let login = match &credentials.login {
        Some(login) => login.clone(),
        None => read_admin_login(prompter)?,
    };

    let prompted;
    let password = match &credentials.password {
        Some(password) => password,
        None => {
            let entered =
                prompter.read_password(&format!("Enter password for '{login}' and press Enter"))?;
            let trimmed = entered.expose_secret().trim();
            if trimmed.is_empty() {
                return Err(RiskSyncError::Login("please enter a valid password".to_owned()));
            }
            prompted = SecretString::from(trimmed.to_owned());
            &prompted
        }
    };

    directory.login(&login, password).await?;
    info!(account = %login, "logged in to directory");
    Ok(login)
}
