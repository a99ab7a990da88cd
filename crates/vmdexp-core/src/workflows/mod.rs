//! # Workflows Module
//!
//! Session-level pipelines built on top of the composer.
//!
//! A session starts from a [`pool::Pool`] of simulation descriptions. Each
//! description is composed independently ([`pool::compose_pool`]), the
//! successes are partitioned into sets by the [`packer`], and every set is
//! written to disk by the [`materialize::Materializer`], which also records
//! the session in a [`manifest::SessionManifest`]. The manifest is the only
//! input a launcher needs.
//!
//! [`session::run`] chains all of the above.

pub mod manifest;
pub mod materialize;
pub mod packer;
pub mod pool;
pub mod session;
