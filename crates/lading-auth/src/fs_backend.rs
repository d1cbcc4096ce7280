//! Accounts read from a JSON file on startup.
//!
//! ```json
//! {"accounts": [{"username": "ci", "password": "<hex sha1 of the password>", "roles": ["write"]}]}
//! ```
//!
//! Passwords are stored as unsalted SHA-1 digests so that existing accounts files keep working.
//! Changes to the file take effect on restart.

use crate::{AuthError, AuthProvider, AuthResult, Credentials};
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::collections::{BTreeSet, HashMap};
use std::io::BufReader;
use std::path::PathBuf;

pub struct FsAuthProvider {
    accounts_file_path: PathBuf,
    accounts: HashMap<String, Account>,
}

#[derive(Deserialize, Clone)]
pub struct Config {
    /// Path of the accounts file.
    pub auth_path: PathBuf,
}

#[derive(Deserialize)]
struct AccountsFile {
    accounts: Vec<Account>,
}

#[derive(Deserialize)]
struct Account {
    username: String,
    password: String,
    #[serde(default)]
    roles: BTreeSet<String>,
}

impl FsAuthProvider {
    pub fn new(config: Config) -> AuthResult<Self> {
        let file = std::fs::File::open(&config.auth_path)
            .with_context(|| format!("Accounts file at {}", config.auth_path.display()))?;
        let parsed: AccountsFile = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parse accounts in {}", config.auth_path.display()))?;

        let accounts: HashMap<_, _> = parsed
            .accounts
            .into_iter()
            .map(|account| (account.username.clone(), account))
            .collect();
        tracing::info!(accounts = accounts.len(), "Loaded accounts");

        Ok(Self {
            accounts_file_path: config.auth_path,
            accounts,
        })
    }

    fn account(&self, credentials: &Credentials) -> AuthResult<&Account> {
        let account = self
            .accounts
            .get(&credentials.username)
            .ok_or(AuthError::InvalidCredentials)?;
        let hashed = hex::encode(Sha1::digest(credentials.password.as_bytes()));
        if account.password.eq_ignore_ascii_case(&hashed) {
            Ok(account)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

#[async_trait]
impl AuthProvider for FsAuthProvider {
    type Config = Config;

    async fn healthcheck(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.accounts_file_path.is_file(),
            "accounts file {} went missing",
            self.accounts_file_path.display()
        );
        Ok(())
    }

    async fn authorize(&self, credentials: &Credentials, required_roles: &[&str]) -> AuthResult<()> {
        let account = self.account(credentials)?;
        if let Some(missing) = required_roles.iter().find(|role| !account.roles.contains(**role)) {
            tracing::debug!(username = %credentials.username, role = *missing, "Missing role");
            return Err(AuthError::Forbidden);
        }
        Ok(())
    }
}
