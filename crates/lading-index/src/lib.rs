//! Package index views computed from an [`ObjectStore`](lading_api_types::storage::ObjectStore).
//!
//! Nothing here is cached: every [`PackageIndex`] or [`Package`] answers from fresh listings of
//! the store, and is meant to be dropped once the request that built it is served.

mod error;
mod index;
mod package;
mod render;

pub use error::{IndexError, IndexResult};
pub use index::{PackageIndex, PackageListing, PackageVersion};
pub use package::Package;
pub use render::{package_href, NOTHING_UPLOADED};
