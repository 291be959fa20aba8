//! modbridge: serve container-backed modules through one composed schema.
//!
//! The engine lives in `modbridge-core`; this crate is its command-line front
//! end. Modules are described by JSON [`fixture`]s and run on the scripted
//! runtime from `modbridge_core::mock`, which is enough to inspect the schema
//! a set of modules composes to and to exercise calls end to end.

pub mod fixture;

pub use fixture::{parse_arg, Fixture, ModuleFixture, OutputFixture};
