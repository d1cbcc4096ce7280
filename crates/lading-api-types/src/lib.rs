#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "storage")]
#[cfg_attr(docsrs, doc(cfg(feature = "storage")))]
pub mod storage;
