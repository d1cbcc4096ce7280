#![cfg_attr(docsrs, feature(doc_cfg))]

pub use lading_api_types::storage::{ObjectStore, StorageError, StorageResult};

pub mod s3_client;

pub mod fs;
