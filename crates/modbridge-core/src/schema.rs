//! Schema fragments, merging and field dispatch.
//!
//! Every module contributes [`SchemaResolvers`] fragments: a small schema
//! document plus the resolver functions for the types it defines or extends.
//! [`merge_schemas`] folds fragments into one [`CompiledSchema`], rejecting
//! conflicting definitions and validating the result. A compiled schema renders
//! to SDL, answers the introspection query and can resolve individual fields,
//! which is all a query engine needs from this crate.

use std::collections::{BTreeMap, HashSet};
use std::fmt::{self, Write as _};
use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;

use modbridge_types::{gql_field_name, TypeDef, TypeDefKind};

use crate::errors::{ConflictKind, ModError};
use crate::server::Context;
use crate::value::Value;

pub const QUERY_TYPE: &str = "Query";

const BUILTIN_SCALARS: &[&str] = &["Boolean", "Float", "ID", "Int", "String", "Void"];

// =============================================================================
// Schema document
// =============================================================================

/// Type definitions and extensions making up one schema fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDocument {
    pub definitions: Vec<Definition>,
    /// `extend type` blocks, typically adding root fields to `Query`.
    pub extensions: Vec<Definition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Object,
    Scalar,
    Enum,
}

impl DefinitionKind {
    fn keyword(self) -> &'static str {
        match self {
            DefinitionKind::Object => "type",
            DefinitionKind::Scalar => "scalar",
            DefinitionKind::Enum => "enum",
        }
    }

    fn introspection_kind(self) -> &'static str {
        match self {
            DefinitionKind::Object => "OBJECT",
            DefinitionKind::Scalar => "SCALAR",
            DefinitionKind::Enum => "ENUM",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub kind: DefinitionKind,
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldDefinition>,
    pub enum_values: Vec<String>,
}

impl Definition {
    pub fn object(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: DefinitionKind::Object,
            name: name.into(),
            description: description.into(),
            fields: Vec::new(),
            enum_values: Vec::new(),
        }
    }

    pub fn scalar(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: DefinitionKind::Scalar,
            ..Self::object(name, description)
        }
    }

    pub fn enumeration(
        name: impl Into<String>,
        description: impl Into<String>,
        values: Vec<String>,
    ) -> Self {
        Self {
            kind: DefinitionKind::Enum,
            enum_values: values,
            ..Self::object(name, description)
        }
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub description: String,
    pub arguments: Vec<ArgumentDefinition>,
    pub type_ref: TypeRef,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            arguments: Vec::new(),
            type_ref,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_argument(mut self, arg: ArgumentDefinition) -> Self {
        self.arguments.push(arg);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentDefinition {
    pub name: String,
    pub description: String,
    pub type_ref: TypeRef,
    pub default_value: Option<AstValue>,
}

impl ArgumentDefinition {
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            type_ref,
            default_value: None,
        }
    }
}

/// A reference to a type, with list and non-null wrappers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn non_null_named(name: impl Into<String>) -> Self {
        TypeRef::NonNull(Box::new(TypeRef::named(name)))
    }

    pub fn named_type(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.named_type(),
        }
    }

    pub fn is_list(&self) -> bool {
        match self {
            TypeRef::Named(_) => false,
            TypeRef::List(_) => true,
            TypeRef::NonNull(inner) => inner.is_list(),
        }
    }

    fn introspect(&self, kinds: &BTreeMap<String, DefinitionKind>) -> serde_json::Value {
        match self {
            TypeRef::Named(name) => {
                let kind = kinds
                    .get(name)
                    .map(|k| k.introspection_kind())
                    .unwrap_or("SCALAR");
                json!({"kind": kind, "name": name, "ofType": null})
            }
            TypeRef::List(inner) => {
                json!({"kind": "LIST", "name": null, "ofType": inner.introspect(kinds)})
            }
            TypeRef::NonNull(inner) => {
                json!({"kind": "NON_NULL", "name": null, "ofType": inner.introspect(kinds)})
            }
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => f.write_str(name),
            TypeRef::List(inner) => write!(f, "[{}]", inner),
            TypeRef::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

/// A literal in argument default position.
#[derive(Debug, Clone, PartialEq)]
pub enum AstValue {
    Null,
    String(String),
    Int(i64),
    Boolean(bool),
    Enum(String),
    List(Vec<AstValue>),
    Object(Vec<(String, AstValue)>),
}

impl AstValue {
    /// The runtime value a resolver sees when the argument is omitted.
    pub fn to_value(&self) -> Value {
        match self {
            AstValue::Null => Value::Null,
            AstValue::String(s) | AstValue::Enum(s) => Value::String(s.clone()),
            AstValue::Int(i) => Value::Int(*i),
            AstValue::Boolean(b) => Value::Bool(*b),
            AstValue::List(items) => Value::List(items.iter().map(AstValue::to_value).collect()),
            AstValue::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for AstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AstValue::Null => f.write_str("null"),
            AstValue::String(s) => {
                write!(f, "{}", serde_json::Value::String(s.clone()))
            }
            AstValue::Int(i) => write!(f, "{}", i),
            AstValue::Boolean(b) => write!(f, "{}", b),
            AstValue::Enum(s) => f.write_str(s),
            AstValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            AstValue::Object(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

// =============================================================================
// SDL rendering
// =============================================================================

fn write_description(out: &mut String, description: &str, indent: &str) {
    let description = description.trim();
    if description.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}\"\"\"", indent);
    for line in description.lines() {
        let _ = writeln!(out, "{}{}", indent, line.replace("\"\"\"", "\\\"\"\""));
    }
    let _ = writeln!(out, "{}\"\"\"", indent);
}

fn write_field(out: &mut String, field: &FieldDefinition) {
    write_description(out, &field.description, "  ");
    let _ = write!(out, "  {}", field.name);
    if !field.arguments.is_empty() {
        let multiline = field.arguments.iter().any(|a| !a.description.trim().is_empty());
        out.push('(');
        for (i, arg) in field.arguments.iter().enumerate() {
            if multiline {
                out.push('\n');
                write_description(out, &arg.description, "    ");
                out.push_str("    ");
            } else if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}: {}", arg.name, arg.type_ref);
            if let Some(default) = &arg.default_value {
                let _ = write!(out, " = {}", default);
            }
        }
        if multiline {
            out.push_str("\n  ");
        }
        out.push(')');
    }
    let _ = writeln!(out, ": {}", field.type_ref);
}

fn write_definition(out: &mut String, def: &Definition, extend: bool) {
    write_description(out, &def.description, "");
    if extend {
        out.push_str("extend ");
    }
    let _ = write!(out, "{} {}", def.kind.keyword(), def.name);
    match def.kind {
        DefinitionKind::Scalar => {}
        DefinitionKind::Object => {
            out.push_str(" {\n");
            for field in &def.fields {
                write_field(out, field);
            }
            out.push('}');
        }
        DefinitionKind::Enum => {
            out.push_str(" {\n");
            for value in &def.enum_values {
                let _ = writeln!(out, "  {}", value);
            }
            out.push('}');
        }
    }
    out.push('\n');
}

impl fmt::Display for SchemaDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        let all = self
            .definitions
            .iter()
            .map(|d| (d, false))
            .chain(self.extensions.iter().map(|d| (d, true)));
        for (i, (def, extend)) in all.enumerate() {
            if i > 0 {
                out.push('\n');
            }
            write_definition(&mut out, def, extend);
        }
        f.write_str(&out)
    }
}

// =============================================================================
// Resolvers
// =============================================================================

/// Inputs to a field resolver.
pub struct ResolveParams {
    pub ctx: Context,
    /// The parent value; `Null` for root fields.
    pub source: Value,
    pub args: BTreeMap<String, Value>,
}

pub type ResolveFuture = BoxFuture<'static, Result<Value>>;

pub type FieldResolveFn = Arc<dyn Fn(ResolveParams) -> ResolveFuture + Send + Sync>;

/// Box an async closure as a [`FieldResolveFn`].
pub fn resolver_fn<F, Fut>(f: F) -> FieldResolveFn
where
    F: Fn(ResolveParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |params| f(params).boxed())
}

/// Returns the parent value unchanged.
pub fn passthrough_resolver() -> FieldResolveFn {
    resolver_fn(|params| async move { Ok(params.source) })
}

/// The IDable capability: objects whose values can be encoded to and decoded
/// from an opaque ID string.
pub trait IdCodec: Send + Sync {
    fn from_id(&self, id: &str) -> Result<Value>;
    fn to_id(&self, value: &Value) -> Result<String>;
}

#[derive(Clone, Default)]
pub struct ObjectResolver {
    pub fields: BTreeMap<String, FieldResolveFn>,
    pub id_codec: Option<Arc<dyn IdCodec>>,
}

impl ObjectResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, resolver: FieldResolveFn) -> Self {
        self.fields.insert(name.into(), resolver);
        self
    }

    pub fn set_field(&mut self, name: impl Into<String>, resolver: FieldResolveFn) {
        self.fields.insert(name.into(), resolver);
    }

    pub fn idable(mut self, codec: Arc<dyn IdCodec>) -> Self {
        self.id_codec = Some(codec);
        self
    }
}

#[derive(Clone)]
pub enum TypeResolver {
    Object(ObjectResolver),
    Scalar,
    Enum(Vec<String>),
}

impl TypeResolver {
    pub fn id_codec(&self) -> Option<Arc<dyn IdCodec>> {
        match self {
            TypeResolver::Object(obj) => obj.id_codec.clone(),
            _ => None,
        }
    }
}

impl fmt::Debug for TypeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeResolver::Object(obj) => f
                .debug_struct("Object")
                .field("fields", &obj.fields.keys().collect::<Vec<_>>())
                .field("idable", &obj.id_codec.is_some())
                .finish(),
            TypeResolver::Scalar => f.write_str("Scalar"),
            TypeResolver::Enum(values) => f.debug_tuple("Enum").field(values).finish(),
        }
    }
}

pub type Resolvers = BTreeMap<String, TypeResolver>;

/// One named schema fragment with its resolvers.
#[derive(Clone, Debug)]
pub struct SchemaResolvers {
    /// e.g. `greeter.Greeter` for the fragment defining object `Greeter` of
    /// module `greeter`.
    pub name: String,
    pub doc: SchemaDocument,
    pub resolvers: Resolvers,
}

impl SchemaResolvers {
    pub fn sdl(&self) -> String {
        self.doc.to_string()
    }
}

// =============================================================================
// Merge and validation
// =============================================================================

/// A type after all fragments' definitions and extensions are folded together.
#[derive(Debug, Clone)]
pub struct MergedType {
    pub kind: DefinitionKind,
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldDefinition>,
    pub enum_values: Vec<String>,
}

/// Merge schema fragments, in order, into one validated schema.
pub fn merge_schemas(fragments: &[SchemaResolvers]) -> Result<CompiledSchema> {
    let mut doc = SchemaDocument::default();
    let mut resolvers = Resolvers::new();

    for fragment in fragments {
        doc.definitions.extend(fragment.doc.definitions.iter().cloned());
        doc.extensions.extend(fragment.doc.extensions.iter().cloned());

        for (name, resolver) in &fragment.resolvers {
            merge_resolver(&mut resolvers, name, resolver)
                .with_context(|| format!("failed to merge schema {:?}", fragment.name))?;
        }
    }

    let types = validate(&doc)?;
    Ok(CompiledSchema {
        sdl: doc.to_string(),
        doc,
        types,
        resolvers,
    })
}

fn merge_resolver(resolvers: &mut Resolvers, name: &str, resolver: &TypeResolver) -> Result<()> {
    let conflict = |field: Option<&str>, reason| ModError::MergeConflict {
        type_name: name.to_string(),
        field: field.map(str::to_string),
        reason,
    };

    match (resolvers.get_mut(name), resolver) {
        (None, _) => {
            resolvers.insert(name.to_string(), resolver.clone());
        }
        (Some(TypeResolver::Object(existing)), TypeResolver::Object(incoming)) => {
            for (field, resolve_fn) in &incoming.fields {
                if existing.fields.contains_key(field) {
                    return Err(conflict(Some(field), ConflictKind::Field).into());
                }
                existing.fields.insert(field.clone(), resolve_fn.clone());
            }
            if existing.id_codec.is_none() {
                existing.id_codec = incoming.id_codec.clone();
            }
        }
        (Some(TypeResolver::Scalar), TypeResolver::Scalar) => {
            return Err(conflict(None, ConflictKind::Scalar).into());
        }
        (Some(_), _) => return Err(conflict(None, ConflictKind::Type).into()),
    }
    Ok(())
}

fn validate(doc: &SchemaDocument) -> Result<BTreeMap<String, MergedType>> {
    let invalid = |message: String| anyhow::Error::new(ModError::InvalidSchema { message });

    let mut types: BTreeMap<String, MergedType> = BTreeMap::new();
    for def in &doc.definitions {
        if BUILTIN_SCALARS.contains(&def.name.as_str()) {
            return Err(invalid(format!("type {:?} is builtin and cannot be redefined", def.name)));
        }
        if types.contains_key(&def.name) {
            return Err(invalid(format!("type {:?} is defined more than once", def.name)));
        }
        types.insert(
            def.name.clone(),
            MergedType {
                kind: def.kind,
                name: def.name.clone(),
                description: def.description.clone(),
                fields: def.fields.clone(),
                enum_values: def.enum_values.clone(),
            },
        );
    }

    for ext in &doc.extensions {
        if !types.contains_key(&ext.name) && ext.name == QUERY_TYPE {
            types.insert(
                QUERY_TYPE.to_string(),
                MergedType {
                    kind: DefinitionKind::Object,
                    name: QUERY_TYPE.to_string(),
                    description: String::new(),
                    fields: Vec::new(),
                    enum_values: Vec::new(),
                },
            );
        }
        let Some(target) = types.get_mut(&ext.name) else {
            return Err(invalid(format!("cannot extend undefined type {:?}", ext.name)));
        };
        if target.kind != ext.kind {
            return Err(invalid(format!(
                "cannot extend {} {:?} as a {}",
                target.kind.keyword(),
                ext.name,
                ext.kind.keyword()
            )));
        }
        target.fields.extend(ext.fields.iter().cloned());
    }

    let known = |name: &str| types.contains_key(name) || BUILTIN_SCALARS.contains(&name);

    for ty in types.values() {
        if ty.kind == DefinitionKind::Enum && ty.enum_values.is_empty() {
            return Err(invalid(format!("enum {:?} must define one or more values", ty.name)));
        }
        if ty.kind != DefinitionKind::Object {
            continue;
        }
        if ty.fields.is_empty() {
            return Err(invalid(format!("type {:?} must define one or more fields", ty.name)));
        }
        let mut seen = HashSet::new();
        for field in &ty.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!(
                    "field {}.{} is defined more than once",
                    ty.name, field.name
                )));
            }
            let field_type = field.type_ref.named_type();
            if !known(field_type) {
                return Err(invalid(format!(
                    "field {}.{} has undefined type {:?}",
                    ty.name, field.name, field_type
                )));
            }
            for arg in &field.arguments {
                let arg_type = arg.type_ref.named_type();
                if !known(arg_type) {
                    return Err(invalid(format!(
                        "argument {}.{}({}) has undefined type {:?}",
                        ty.name, field.name, arg.name, arg_type
                    )));
                }
                if types.get(arg_type).map(|t| t.kind) == Some(DefinitionKind::Object) {
                    return Err(invalid(format!(
                        "argument {}.{}({}) must be an input type, got object {:?}",
                        ty.name, field.name, arg.name, arg_type
                    )));
                }
            }
        }
    }

    Ok(types)
}

// =============================================================================
// Compiled schema
// =============================================================================

/// One step of a field path, starting from `Query`.
#[derive(Debug, Clone)]
pub struct Selection {
    pub field: String,
    pub args: BTreeMap<String, Value>,
}

impl Selection {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }
}

/// A merged, validated schema with its resolver table.
pub struct CompiledSchema {
    sdl: String,
    doc: SchemaDocument,
    types: BTreeMap<String, MergedType>,
    resolvers: Resolvers,
}

impl CompiledSchema {
    pub fn sdl(&self) -> &str {
        &self.sdl
    }

    pub fn document(&self) -> &SchemaDocument {
        &self.doc
    }

    pub fn resolvers(&self) -> &Resolvers {
        &self.resolvers
    }

    pub fn merged_type(&self, name: &str) -> Option<&MergedType> {
        self.types.get(name)
    }

    pub fn field(&self, type_name: &str, field: &str) -> Option<&FieldDefinition> {
        self.types
            .get(type_name)?
            .fields
            .iter()
            .find(|f| f.name == field)
    }

    /// The result of the standard introspection query, as JSON text.
    pub fn introspection_json(&self) -> Result<String> {
        let mut kinds: BTreeMap<String, DefinitionKind> = BUILTIN_SCALARS
            .iter()
            .map(|s| (s.to_string(), DefinitionKind::Scalar))
            .collect();
        kinds.extend(self.types.iter().map(|(name, t)| (name.clone(), t.kind)));

        let mut types = Vec::new();
        for name in BUILTIN_SCALARS {
            if !self.types.contains_key(*name) {
                types.push(json!({
                    "kind": "SCALAR",
                    "name": name,
                    "description": null,
                    "fields": null,
                    "enumValues": null,
                }));
            }
        }
        for ty in self.types.values() {
            let fields = (ty.kind == DefinitionKind::Object).then(|| {
                ty.fields
                    .iter()
                    .map(|field| {
                        json!({
                            "name": field.name,
                            "description": non_empty(&field.description),
                            "args": field.arguments.iter().map(|arg| json!({
                                "name": arg.name,
                                "description": non_empty(&arg.description),
                                "type": arg.type_ref.introspect(&kinds),
                                "defaultValue": arg.default_value.as_ref().map(|v| v.to_string()),
                            })).collect::<Vec<_>>(),
                            "type": field.type_ref.introspect(&kinds),
                        })
                    })
                    .collect::<Vec<_>>()
            });
            let enum_values = (ty.kind == DefinitionKind::Enum).then(|| {
                ty.enum_values
                    .iter()
                    .map(|v| json!({"name": v}))
                    .collect::<Vec<_>>()
            });
            types.push(json!({
                "kind": ty.kind.introspection_kind(),
                "name": ty.name,
                "description": non_empty(&ty.description),
                "fields": fields,
                "enumValues": enum_values,
            }));
        }
        types.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        let query_type = self
            .types
            .contains_key(QUERY_TYPE)
            .then(|| json!({"name": QUERY_TYPE}));
        let doc = json!({
            "__schema": {
                "queryType": query_type,
                "types": types,
            }
        });
        serde_json::to_string(&doc).context("failed to marshal introspection result")
    }

    /// Resolve `type_name.field` against `source`.
    ///
    /// Omitted arguments take their declared defaults. An interface value is
    /// unwrapped to its concrete value unless the field belongs to the
    /// interface type it is presented as; fields without a resolver read the
    /// same-named entry of the (unwrapped) source.
    pub async fn resolve(
        &self,
        ctx: &Context,
        type_name: &str,
        field: &str,
        source: Value,
        mut args: BTreeMap<String, Value>,
    ) -> Result<Value> {
        let field_def = self
            .field(type_name, field)
            .ok_or_else(|| ModError::not_found("field", format!("{}.{}", type_name, field)))?;
        for arg in &field_def.arguments {
            if !args.contains_key(&arg.name) {
                if let Some(default) = &arg.default_value {
                    args.insert(arg.name.clone(), default.to_value());
                }
            }
        }

        let source = match source {
            Value::Interface(iv) if iv.iface.name() != type_name => iv.value,
            other => other,
        };

        let resolve_fn = match self.resolvers.get(type_name) {
            Some(TypeResolver::Object(obj)) => obj.fields.get(field).cloned(),
            _ => None,
        };
        match resolve_fn {
            Some(resolve_fn) => {
                resolve_fn(ResolveParams {
                    ctx: ctx.clone(),
                    source,
                    args,
                })
                .await
            }
            None => default_resolve(source, field),
        }
    }

    /// Resolve a chain of fields starting at the root `Query` type.
    pub async fn resolve_path(&self, ctx: &Context, path: &[Selection]) -> Result<Value> {
        let mut type_name = QUERY_TYPE.to_string();
        let mut value = Value::Null;
        for (i, selection) in path.iter().enumerate() {
            let field_type = self
                .field(&type_name, &selection.field)
                .map(|f| f.type_ref.clone())
                .ok_or_else(|| {
                    ModError::not_found("field", format!("{}.{}", type_name, selection.field))
                })?;
            value = self
                .resolve(ctx, &type_name, &selection.field, value, selection.args.clone())
                .await?;
            if i + 1 < path.len() {
                if field_type.is_list() {
                    return Err(anyhow!(
                        "cannot select into list field {}.{}",
                        type_name,
                        selection.field
                    ));
                }
                type_name = field_type.named_type().to_string();
            }
        }
        Ok(value)
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn default_resolve(source: Value, field: &str) -> Result<Value> {
    match source {
        Value::Null => Ok(Value::Null),
        Value::Object(mut map) => Ok(map.remove(field).unwrap_or(Value::Null)),
        Value::Core(obj) => Ok(obj.fields.get(field).cloned().unwrap_or(Value::Null)),
        Value::Interface(iv) => default_resolve(iv.value, field),
        other => Err(ModError::conversion("object", other.kind_name()).into()),
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

// =============================================================================
// TypeDef conversion
// =============================================================================

/// Schema type for a TypeDef. Objects and interfaces are passed as inputs by
/// their `<Name>ID` scalar.
pub fn type_def_to_type_ref(type_def: &TypeDef, is_input: bool) -> TypeRef {
    let inner = match &type_def.kind {
        TypeDefKind::String => TypeRef::named("String"),
        TypeDefKind::Integer => TypeRef::named("Int"),
        TypeDefKind::Boolean => TypeRef::named("Boolean"),
        TypeDefKind::Void => TypeRef::named("Void"),
        TypeDefKind::List(elem) => TypeRef::List(Box::new(type_def_to_type_ref(elem, is_input))),
        TypeDefKind::Object(obj) => id_or_named(&obj.name, is_input),
        TypeDefKind::Interface(iface) => id_or_named(&iface.name, is_input),
        TypeDefKind::Enum(def) => TypeRef::named(def.name.clone()),
    };
    if type_def.optional {
        inner
    } else {
        TypeRef::NonNull(Box::new(inner))
    }
}

fn id_or_named(name: &str, is_input: bool) -> TypeRef {
    if is_input {
        TypeRef::named(format!("{}ID", name))
    } else {
        TypeRef::named(name)
    }
}

/// Schema literal for an argument default, checked against its TypeDef.
/// `None` and JSON `null` both mean "no default".
pub fn ast_default_value(
    type_def: &TypeDef,
    value: Option<&serde_json::Value>,
) -> Result<Option<AstValue>> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => ast_value(type_def, v).map(Some),
    }
}

fn ast_value(type_def: &TypeDef, value: &serde_json::Value) -> Result<AstValue> {
    use serde_json::Value as Json;

    let mismatch = |expected: &str| ModError::conversion(format!("{} default value", expected), json_kind(value));
    match (&type_def.kind, value) {
        (_, Json::Null) => Ok(AstValue::Null),
        (TypeDefKind::String, Json::String(s)) => Ok(AstValue::String(s.clone())),
        (TypeDefKind::String, _) => Err(mismatch("string").into()),
        (TypeDefKind::Integer, Json::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(AstValue::Int(i)),
            // whole floats, as produced by SDKs that only have one number type
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Ok(AstValue::Int(f as i64))
            }
            _ => Err(mismatch("integer").into()),
        },
        (TypeDefKind::Integer, _) => Err(mismatch("integer").into()),
        (TypeDefKind::Boolean, Json::Bool(b)) => Ok(AstValue::Boolean(*b)),
        (TypeDefKind::Boolean, _) => Err(mismatch("bool").into()),
        (TypeDefKind::Void, _) => Err(mismatch("null").into()),
        (TypeDefKind::Enum(def), Json::String(s)) => {
            if def.values.iter().any(|v| &v.name == s) {
                Ok(AstValue::Enum(s.clone()))
            } else {
                Err(anyhow!("{:?} is not a value of enum {}", s, def.name))
            }
        }
        (TypeDefKind::Enum(_), _) => Err(mismatch("enum").into()),
        (TypeDefKind::List(elem), Json::Array(items)) => {
            let items = items
                .iter()
                .map(|item| ast_value(elem, item))
                .collect::<Result<Vec<_>>>()
                .context("failed to get default value for list element")?;
            Ok(AstValue::List(items))
        }
        (TypeDefKind::List(_), _) => Err(mismatch("list").into()),
        (TypeDefKind::Object(obj), Json::Object(map)) => {
            let mut entries = Vec::with_capacity(map.len());
            for (name, v) in map {
                let name = gql_field_name(name);
                let field = obj
                    .field_by_name(&name)
                    .ok_or_else(|| anyhow!("object field {}.{} not found", obj.name, name))?;
                let v = ast_value(&field.type_def, v).with_context(|| {
                    format!("failed to get default value for object field {:?}", name)
                })?;
                entries.push((name, v));
            }
            Ok(AstValue::Object(entries))
        }
        (TypeDefKind::Object(_), _) => Err(mismatch("object").into()),
        (TypeDefKind::Interface(iface), _) => Err(anyhow!(
            "default values are not supported for interface {}",
            iface.name
        )),
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "object",
    }
}
