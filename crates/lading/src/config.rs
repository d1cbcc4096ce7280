use anyhow::Context;
use lading_auth::AuthProvider;
use lading_server::{ServiceConfig, UpstreamConfig};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize)]
pub struct Config<A: AuthProvider> {
    pub service: ServiceConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(flatten)]
    pub auth_config: A::Config,
    #[serde(flatten)]
    pub store: StoreConfig,
}

/// Where packages live. Exactly one of `store_fs` or `store_s3` is expected in the config.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum StoreConfig {
    StoreFs(FsStoreConfig),
    StoreS3(S3StoreConfig),
}

#[derive(Deserialize, Debug)]
pub struct FsStoreConfig {
    pub root: PathBuf,
    pub name: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct S3StoreConfig {
    pub name: Option<String>,
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub access_key_secret: Option<String>,
}

impl StoreConfig {
    /// Store identity, from the config or the environment.
    pub fn name(&self) -> anyhow::Result<String> {
        let configured = match self {
            Self::StoreFs(fs) => fs.name.as_ref(),
            Self::StoreS3(s3) => s3.name.as_ref(),
        };
        configured
            .cloned()
            .or_else(|| env_var("LADING_BUCKET_NAME"))
            .or_else(|| env_var("BUCKET_NAME"))
            .context("No store name in config, LADING_BUCKET_NAME or BUCKET_NAME")
    }
}

impl S3StoreConfig {
    pub fn access_key_id(&self) -> anyhow::Result<String> {
        self.access_key_id
            .clone()
            .or_else(|| env_var("LADING_STORE_KEY_ID"))
            .context("Failed to find store key id in environment variable or config")
    }

    pub fn access_key_secret(&self) -> anyhow::Result<String> {
        self.access_key_secret
            .clone()
            .or_else(|| env_var("LADING_STORE_KEY_SECRET"))
            .context("Failed to find store key secret in environment variable or config")
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
