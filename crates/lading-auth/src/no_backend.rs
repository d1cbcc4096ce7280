//! Useless (but safe) placeholder for a backend
use crate::{AuthError, AuthProvider, AuthResult, Credentials};
use async_trait::async_trait;

pub struct NoAuthProvider;

fn nope<T>() -> AuthResult<T> {
    Err(AuthError::Unimplemented)
}

impl NoAuthProvider {
    pub fn new(_no_config: ()) -> AuthResult<Self> {
        nope()
    }
}

/// Used as fallback to avoid compile error when no backend is configured
#[async_trait]
impl AuthProvider for NoAuthProvider {
    type Config = ();

    async fn healthcheck(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn authorize(&self, _credentials: &Credentials, _required_roles: &[&str]) -> AuthResult<()> {
        nope()
    }
}
