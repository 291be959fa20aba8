//! Shared types for the modbridge workspace.
//!
//! This crate provides the language-agnostic pieces every other crate agrees on:
//!
//! - [`typedef`]: the TypeDef IR modules use to describe their objects, interfaces
//!   and functions
//! - [`naming`]: the camel-case normalization and namespacing rules applied to
//!   module-declared names
//! - [`digest`]: the content digest used for module identity and call cache keys
//! - [`resource_id`]: the opaque ID codec for module object values
//! - [`encoding`]: base64 helpers shared by the codec
//! - [`env_utils`]: `MODBRIDGE_*` environment overrides

pub mod digest;
pub mod encoding;
pub mod env_utils;
pub mod naming;
pub mod resource_id;
pub mod typedef;

pub use digest::{Digest, DigestInputs};
pub use naming::{gql_arg_name, gql_field_name, gql_object_name, namespace_object};
pub use resource_id::{decode_module_id, encode_module, ModuleObjectData};
pub use typedef::{
    EnumTypeDef, EnumValueTypeDef, FieldTypeDef, Function, FunctionArg, InterfaceTypeDef,
    ModuleDefinition, ObjectTypeDef, TypeDef, TypeDefKind,
};
