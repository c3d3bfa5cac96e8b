//! A read-only probe for Docker Registry v2 repositories: does a tag exist,
//! and does it provide an image for a given architecture and OS
#![deny(missing_docs)]

pub mod client;
pub mod errors;
pub mod manifest;
mod platform;
mod reference;
mod regexp;
mod repository;
pub mod secrets;
mod token_cache;

#[doc(inline)]
pub use errors::{ProbeError, Result};
#[doc(inline)]
pub use reference::{Reference, DOCKER_HUB_REGISTRY};
#[doc(inline)]
pub use repository::Repository;

#[macro_use]
extern crate lazy_static;
