//! The builtin core module.
//!
//! Core types are available to every module without namespacing. Only core
//! objects that can be encoded to and from an ID may cross a module boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use anyhow::{anyhow, Context as _, Result};
use tracing::debug;

use modbridge_types::encoding::{base64_decode, base64_encode};
use modbridge_types::{
    gql_object_name, Digest, EnumTypeDef, FieldTypeDef, Function, FunctionArg, ObjectTypeDef,
    TypeDef, TypeDefKind,
};

use crate::errors::ModError;
use crate::mod_types::{CoreModObject, ListType, ModType, PrimitiveType};
use crate::schema::{
    merge_schemas, resolver_fn, ArgumentDefinition, CompiledSchema, Definition, DefinitionKind,
    FieldDefinition, IdCodec, ObjectResolver, ResolveParams, SchemaDocument, SchemaResolvers,
    TypeRef, TypeResolver, QUERY_TYPE,
};
use crate::value::{ContentDefinition, CoreObject, Value, BLOB_SOURCE_PREFIX};

pub struct CoreMod {
    name: String,
    digest: Digest,
    fragments: Vec<SchemaResolvers>,
    compiled: CompiledSchema,
    introspection_json: String,
    this: Weak<CoreMod>,
}

impl CoreMod {
    /// A core module serving `fragments`, which must merge cleanly.
    pub fn new(name: &str, fragments: Vec<SchemaResolvers>) -> Result<Arc<Self>> {
        let compiled = merge_schemas(&fragments)
            .with_context(|| format!("failed to merge core schema {:?}", name))?;
        let introspection_json = compiled.introspection_json()?;
        debug!(module = %name, fragments = fragments.len(), "built core module");
        Ok(Arc::new_cyclic(|this| Self {
            name: name.to_string(),
            digest: Digest::from_string(name),
            fragments,
            compiled,
            introspection_json,
            this: this.clone(),
        }))
    }

    /// The core API every module can use: content-addressed `File`s.
    pub fn builtin(name: &str) -> Result<Arc<Self>> {
        Self::new(name, vec![file_schema()])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Digest of the core module's name.
    pub fn dag_digest(&self) -> &Digest {
        &self.digest
    }

    pub fn schema(&self) -> Vec<SchemaResolvers> {
        self.fragments.clone()
    }

    pub fn compiled(&self) -> &CompiledSchema {
        &self.compiled
    }

    pub fn introspection_json(&self) -> &str {
        &self.introspection_json
    }

    pub fn declares_enum(&self, name: &str) -> bool {
        self.compiled
            .merged_type(name)
            .is_some_and(|t| t.kind == DefinitionKind::Enum)
    }

    pub fn mod_type_for(&self, type_def: &TypeDef) -> Result<Option<ModType>> {
        match &type_def.kind {
            TypeDefKind::String
            | TypeDefKind::Integer
            | TypeDefKind::Boolean
            | TypeDefKind::Void
            | TypeDefKind::Enum(_) => Ok(Some(ModType::Primitive(PrimitiveType::new(type_def.clone())))),
            TypeDefKind::List(elem) => Ok(self
                .mod_type_for(elem)?
                .map(|underlying| ModType::List(ListType::new(underlying)))),
            TypeDefKind::Object(obj) => {
                let name = gql_object_name(&obj.name);
                let Some(codec) = self
                    .compiled
                    .resolvers()
                    .get(&name)
                    .and_then(TypeResolver::id_codec)
                else {
                    return Ok(None);
                };
                let core = self
                    .this
                    .upgrade()
                    .ok_or_else(|| anyhow!("core module {} was dropped", self.name))?;
                Ok(Some(ModType::CoreObject(CoreModObject {
                    core,
                    type_def: type_def.clone(),
                    codec,
                })))
            }
            TypeDefKind::Interface(_) => Ok(None),
        }
    }

    /// TypeDefs for the core objects that can cross module boundaries, and
    /// for core enums.
    pub fn type_defs(&self) -> Vec<TypeDef> {
        let mut type_defs = Vec::new();
        for (name, resolver) in self.compiled.resolvers() {
            let Some(merged) = self.compiled.merged_type(name) else {
                continue;
            };
            match merged.kind {
                DefinitionKind::Object if resolver.id_codec().is_some() => {
                    let mut obj = ObjectTypeDef::new(name, &merged.description);
                    obj.source_module_name = Some(self.name.clone());
                    for field in &merged.fields {
                        let Some(field_type) = self.type_ref_to_type_def(&field.type_ref) else {
                            continue;
                        };
                        if field.arguments.is_empty() {
                            obj.fields
                                .push(FieldTypeDef::new(&field.name, field_type, &field.description));
                            continue;
                        }
                        let mut function =
                            Function::new(&field.name, field_type).with_description(&field.description);
                        for arg in &field.arguments {
                            if let Some(arg_type) = self.type_ref_to_type_def(&arg.type_ref) {
                                function.args.push(FunctionArg::new(&arg.name, arg_type));
                            }
                        }
                        obj.functions.push(function);
                    }
                    type_defs.push(TypeDef::object(obj));
                }
                DefinitionKind::Enum => {
                    let def = merged
                        .enum_values
                        .iter()
                        .fold(EnumTypeDef::new(name, &merged.description), |def, v| {
                            def.with_value(v, "")
                        });
                    type_defs.push(TypeDef::enumeration(def));
                }
                _ => {}
            }
        }
        type_defs
    }

    fn type_ref_to_type_def(&self, type_ref: &TypeRef) -> Option<TypeDef> {
        let (inner, optional) = match type_ref {
            TypeRef::NonNull(inner) => (inner.as_ref(), false),
            other => (other, true),
        };
        let type_def = match inner {
            TypeRef::List(elem) => TypeDef::list_of(self.type_ref_to_type_def(elem)?),
            TypeRef::Named(name) => match name.as_str() {
                "String" | "ID" => TypeDef::string(),
                "Int" => TypeDef::integer(),
                "Boolean" => TypeDef::boolean(),
                "Void" => TypeDef::void(),
                other => match self.compiled.merged_type(other)?.kind {
                    DefinitionKind::Object => TypeDef::object_ref(other),
                    // ID scalars cross the wire as strings
                    DefinitionKind::Scalar => TypeDef::string(),
                    DefinitionKind::Enum => TypeDef::enumeration(EnumTypeDef::new(other, "")),
                },
            },
            TypeRef::NonNull(_) => return None,
        };
        Some(type_def.with_optional(optional))
    }
}

impl fmt::Debug for CoreMod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreMod")
            .field("name", &self.name)
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Builtin File API
// =============================================================================

const FILE_TYPE: &str = "File";
const FILE_ID_PREFIX: &str = "core:File:";

/// IDs of core files embed their contents.
struct FileCodec;

impl FileCodec {
    fn file(contents: String) -> Value {
        let id = format!("{}{}", FILE_ID_PREFIX, base64_encode(contents.as_bytes()));
        let blob = Digest::from_string(&contents);
        Value::Core(CoreObject {
            type_name: FILE_TYPE.to_string(),
            id,
            fields: [("contents".to_string(), Value::String(contents))]
                .into_iter()
                .collect(),
            definitions: vec![ContentDefinition {
                source: format!("{}{}", BLOB_SOURCE_PREFIX, blob),
            }],
        })
    }
}

impl IdCodec for FileCodec {
    fn from_id(&self, id: &str) -> Result<Value> {
        let encoded = id
            .strip_prefix(FILE_ID_PREFIX)
            .ok_or_else(|| anyhow!("invalid {} ID {:?}", FILE_TYPE, id))?;
        let bytes = base64_decode(encoded, "file ID")?;
        let contents = String::from_utf8(bytes).context("file contents are not UTF-8")?;
        Ok(Self::file(contents))
    }

    fn to_id(&self, value: &Value) -> Result<String> {
        match value {
            Value::Core(obj) if obj.type_name == FILE_TYPE => Ok(obj.id.clone()),
            other => Err(ModError::conversion("File object", other.kind_name()).into()),
        }
    }
}

fn file_schema() -> SchemaResolvers {
    let id_name = format!("{}ID", FILE_TYPE);
    let doc = SchemaDocument {
        definitions: vec![
            Definition::object(FILE_TYPE, "A file with content-addressed contents")
                .with_field(FieldDefinition::new("id", TypeRef::non_null_named(&id_name)))
                .with_field(FieldDefinition::new("contents", TypeRef::non_null_named("String"))),
            Definition::scalar(&id_name, "File identifier"),
        ],
        extensions: vec![Definition::object(QUERY_TYPE, "")
            .with_field(
                FieldDefinition::new("file", TypeRef::non_null_named(FILE_TYPE))
                    .with_description("Creates a file with the given contents")
                    .with_argument(ArgumentDefinition::new(
                        "contents",
                        TypeRef::non_null_named("String"),
                    )),
            )
            .with_field(
                FieldDefinition::new(
                    format!("load{}FromID", FILE_TYPE),
                    TypeRef::non_null_named(FILE_TYPE),
                )
                .with_argument(ArgumentDefinition::new("id", TypeRef::non_null_named(&id_name))),
            )],
    };

    let codec: Arc<dyn IdCodec> = Arc::new(FileCodec);
    let query = ObjectResolver::new()
        .with_field(
            "file",
            resolver_fn(|p: ResolveParams| async move {
                let contents = p
                    .args
                    .get("contents")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("file: missing contents"))?
                    .to_string();
                Ok(FileCodec::file(contents))
            }),
        )
        .with_field(
            format!("load{}FromID", FILE_TYPE),
            resolver_fn(|p: ResolveParams| async move {
                let id = p
                    .args
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("loadFileFromID: missing id"))?;
                FileCodec.from_id(id)
            }),
        );
    let file = ObjectResolver::new()
        .with_field(
            "id",
            resolver_fn(|p: ResolveParams| async move {
                match p.source {
                    Value::Core(obj) => Ok(Value::String(obj.id)),
                    other => Err(ModError::conversion("File object", other.kind_name()).into()),
                }
            }),
        )
        .idable(codec);

    let resolvers: BTreeMap<_, _> = [
        (QUERY_TYPE.to_string(), TypeResolver::Object(query)),
        (FILE_TYPE.to_string(), TypeResolver::Object(file)),
        (id_name, TypeResolver::Scalar),
    ]
    .into_iter()
    .collect();

    SchemaResolvers {
        name: "core.File".to_string(),
        doc,
        resolvers,
    }
}
