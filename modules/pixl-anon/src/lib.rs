//! The Anonymisation Engine (§4.6): tag scheme table, recursive whitelist
//! walker, the `Op` sum type, and the Hashing Service client it calls for
//! UID salting and `secure-hash` substitution.

pub mod age;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod overlay;
pub mod scheme;
pub mod time;
pub mod uid;
pub mod validate;

pub use engine::{anonymise_instance, discover_project_slug, AnonContext, Outcome};
pub use error::{AnonError, Result};
pub use hasher::HasherClient;
pub use scheme::SchemeTable;
