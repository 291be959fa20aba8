//! The TypeDef IR.
//!
//! Modules describe their API with these types: objects with fields and
//! functions, interfaces with functions, enums, lists and a handful of
//! primitives. TypeDefs are plain values; anything that needs to rename or
//! annotate one works on a clone.
//!
//! # Wire format
//!
//! TypeDefs are exchanged as JSON with a `kind` tag and one payload field per
//! composite kind:
//!
//! ```json
//! {"kind": "LIST", "optional": true, "elementTypeDef": {"kind": "STRING"}}
//! {"kind": "OBJECT", "asObject": {"name": "Greeter", "functions": []}}
//! ```

use std::collections::HashMap;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::naming::{gql_arg_name, gql_field_name, gql_object_name};

/// A language-agnostic type description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTypeDef", into = "RawTypeDef")]
pub struct TypeDef {
    pub optional: bool,
    pub kind: TypeDefKind,
}

/// The closed set of type kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDefKind {
    String,
    Integer,
    Boolean,
    Void,
    List(Box<TypeDef>),
    Object(ObjectTypeDef),
    Interface(InterfaceTypeDef),
    Enum(EnumTypeDef),
}

impl TypeDef {
    pub fn new(kind: TypeDefKind) -> Self {
        Self {
            optional: false,
            kind,
        }
    }

    pub fn string() -> Self {
        Self::new(TypeDefKind::String)
    }

    pub fn integer() -> Self {
        Self::new(TypeDefKind::Integer)
    }

    pub fn boolean() -> Self {
        Self::new(TypeDefKind::Boolean)
    }

    pub fn void() -> Self {
        Self::new(TypeDefKind::Void)
    }

    pub fn list_of(element: TypeDef) -> Self {
        Self::new(TypeDefKind::List(Box::new(element)))
    }

    pub fn object(obj: ObjectTypeDef) -> Self {
        Self::new(TypeDefKind::Object(obj))
    }

    /// A reference to an object by name only, as used in lookups.
    pub fn object_ref(name: &str) -> Self {
        Self::object(ObjectTypeDef::new(name, ""))
    }

    pub fn interface(iface: InterfaceTypeDef) -> Self {
        Self::new(TypeDefKind::Interface(iface))
    }

    pub fn enumeration(def: EnumTypeDef) -> Self {
        Self::new(TypeDefKind::Enum(def))
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Upper-case kind tag, as used on the wire and in error messages.
    pub fn kind_name(&self) -> &'static str {
        self.kind_tag().as_str()
    }

    fn kind_tag(&self) -> KindTag {
        match &self.kind {
            TypeDefKind::String => KindTag::String,
            TypeDefKind::Integer => KindTag::Integer,
            TypeDefKind::Boolean => KindTag::Boolean,
            TypeDefKind::Void => KindTag::Void,
            TypeDefKind::List(_) => KindTag::List,
            TypeDefKind::Object(_) => KindTag::Object,
            TypeDefKind::Interface(_) => KindTag::Interface,
            TypeDefKind::Enum(_) => KindTag::Enum,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self.kind,
            TypeDefKind::String | TypeDefKind::Integer | TypeDefKind::Boolean | TypeDefKind::Void
        )
    }

    pub fn as_list(&self) -> Option<&TypeDef> {
        match &self.kind {
            TypeDefKind::List(elem) => Some(elem),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectTypeDef> {
        match &self.kind {
            TypeDefKind::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut ObjectTypeDef> {
        match &mut self.kind {
            TypeDefKind::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_interface(&self) -> Option<&InterfaceTypeDef> {
        match &self.kind {
            TypeDefKind::Interface(iface) => Some(iface),
            _ => None,
        }
    }

    pub fn as_interface_mut(&mut self) -> Option<&mut InterfaceTypeDef> {
        match &mut self.kind {
            TypeDefKind::Interface(iface) => Some(iface),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumTypeDef> {
        match &self.kind {
            TypeDefKind::Enum(def) => Some(def),
            _ => None,
        }
    }

    /// Strip any list wrappers.
    pub fn underlying(&self) -> &TypeDef {
        match &self.kind {
            TypeDefKind::List(elem) => elem.underlying(),
            _ => self,
        }
    }

    /// Name of an object, interface or enum type.
    pub fn named_type(&self) -> Option<&str> {
        match &self.kind {
            TypeDefKind::Object(obj) => Some(&obj.name),
            TypeDefKind::Interface(iface) => Some(&iface.name),
            TypeDefKind::Enum(def) => Some(&def.name),
            _ => None,
        }
    }

    /// Apply the naming rules to every name in this TypeDef, recording the
    /// declared spelling as the original name where one wasn't given.
    pub fn normalize(&mut self) {
        match &mut self.kind {
            TypeDefKind::List(elem) => elem.normalize(),
            TypeDefKind::Object(obj) => obj.normalize(),
            TypeDefKind::Interface(iface) => iface.normalize(),
            TypeDefKind::Enum(def) => def.normalize(),
            TypeDefKind::String | TypeDefKind::Integer | TypeDefKind::Boolean | TypeDefKind::Void => {}
        }
    }

    /// Structural subtyping: covariant on return types, contravariant on args.
    pub fn is_subtype_of(&self, other: &TypeDef) -> bool {
        if self.optional != other.optional {
            return false;
        }
        match (&self.kind, &other.kind) {
            (TypeDefKind::String, TypeDefKind::String)
            | (TypeDefKind::Integer, TypeDefKind::Integer)
            | (TypeDefKind::Boolean, TypeDefKind::Boolean)
            | (TypeDefKind::Void, TypeDefKind::Void) => true,
            (TypeDefKind::Enum(a), TypeDefKind::Enum(b)) => a.name == b.name,
            (TypeDefKind::List(a), TypeDefKind::List(b)) => a.is_subtype_of(b),
            // same name means same object within one namespaced schema
            (TypeDefKind::Object(a), TypeDefKind::Object(b)) => a.name == b.name,
            (TypeDefKind::Object(a), TypeDefKind::Interface(b)) => a.is_subtype_of(b),
            (TypeDefKind::Interface(a), TypeDefKind::Interface(b)) => a.is_subtype_of(b),
            _ => false,
        }
    }
}

/// A custom object declared by a module.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectTypeDef {
    /// CamelCase name as used in the schema.
    pub name: String,
    /// Name as declared by the module's SDK.
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fields: Vec<FieldTypeDef>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor: Option<Box<Function>>,
    /// Only set on TypeDefs handed out by a module's `type_defs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_module_name: Option<String>,
}

impl ObjectTypeDef {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: gql_object_name(name),
            original_name: name.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, name: &str, type_def: TypeDef, description: &str) -> Self {
        self.fields.push(FieldTypeDef::new(name, type_def, description));
        self
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    pub fn with_constructor(mut self, constructor: Function) -> Self {
        self.constructor = Some(Box::new(constructor));
        self
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldTypeDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_original_name(&self, name: &str) -> Option<&FieldTypeDef> {
        self.fields.iter().find(|f| f.original_name == name)
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    fn normalize(&mut self) {
        if self.original_name.is_empty() {
            self.original_name = self.name.clone();
        }
        self.name = gql_object_name(&self.name);
        for field in &mut self.fields {
            field.normalize();
        }
        for function in &mut self.functions {
            function.normalize();
        }
        if let Some(constructor) = &mut self.constructor {
            constructor.normalize();
        }
    }

    /// Whether this object structurally implements `iface`.
    pub fn is_subtype_of(&self, iface: &InterfaceTypeDef) -> bool {
        let fns: HashMap<&str, &Function> =
            self.functions.iter().map(|f| (f.name.as_str(), f)).collect();
        let fields: HashMap<&str, &FieldTypeDef> =
            self.fields.iter().map(|f| (f.name.as_str(), f)).collect();

        for iface_fn in &iface.functions {
            if let Some(field) = fields.get(iface_fn.name.as_str()) {
                // a field satisfies a zero-arg interface function
                if !iface_fn.args.is_empty() || !field.type_def.is_subtype_of(&iface_fn.return_type) {
                    return false;
                }
                continue;
            }
            match fns.get(iface_fn.name.as_str()) {
                Some(obj_fn) if obj_fn.is_subtype_of(iface_fn) => {}
                _ => return false,
            }
        }
        true
    }
}

/// A static field on an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTypeDef {
    pub name: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub description: String,
    pub type_def: TypeDef,
}

impl FieldTypeDef {
    pub fn new(name: &str, type_def: TypeDef, description: &str) -> Self {
        Self {
            name: gql_field_name(name),
            original_name: name.to_string(),
            description: description.to_string(),
            type_def,
        }
    }

    fn normalize(&mut self) {
        if self.original_name.is_empty() {
            self.original_name = self.name.clone();
        }
        self.name = gql_field_name(&self.name);
        self.type_def.normalize();
    }
}

/// A function on an object or interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub description: String,
    pub return_type: TypeDef,
    #[serde(default)]
    pub args: Vec<FunctionArg>,
}

impl Function {
    pub fn new(name: &str, return_type: TypeDef) -> Self {
        Self {
            name: gql_field_name(name),
            original_name: name.to_string(),
            description: String::new(),
            return_type,
            args: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_arg(mut self, name: &str, type_def: TypeDef) -> Self {
        self.args.push(FunctionArg::new(name, type_def));
        self
    }

    pub fn with_arg_default(
        mut self,
        name: &str,
        type_def: TypeDef,
        default_value: serde_json::Value,
    ) -> Self {
        let mut arg = FunctionArg::new(name, type_def);
        arg.default_value = Some(default_value);
        self.args.push(arg);
        self
    }

    /// Case-insensitive argument lookup.
    pub fn lookup_arg(&self, name_any_case: &str) -> Option<&FunctionArg> {
        self.args
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name_any_case))
    }

    fn normalize(&mut self) {
        if self.original_name.is_empty() {
            self.original_name = self.name.clone();
        }
        self.name = gql_field_name(&self.name);
        self.return_type.normalize();
        for arg in &mut self.args {
            arg.normalize();
        }
    }

    pub fn is_subtype_of(&self, other: &Function) -> bool {
        if !self.return_type.is_subtype_of(&other.return_type) {
            return false;
        }
        for (i, other_arg) in other.args.iter().enumerate() {
            let Some(arg) = self.args.get(i) else {
                return false;
            };
            if arg.name != other_arg.name || arg.type_def.optional != other_arg.type_def.optional {
                return false;
            }
            // contravariant: the interface's arg type must be usable where ours is expected
            if !other_arg.type_def.is_subtype_of(&arg.type_def) {
                return false;
            }
        }
        true
    }
}

/// An argument to a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionArg {
    pub name: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub description: String,
    pub type_def: TypeDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
}

impl FunctionArg {
    pub fn new(name: &str, type_def: TypeDef) -> Self {
        Self {
            name: gql_arg_name(name),
            original_name: name.to_string(),
            description: String::new(),
            type_def,
            default_value: None,
        }
    }

    fn normalize(&mut self) {
        if self.original_name.is_empty() {
            self.original_name = self.name.clone();
        }
        self.name = gql_arg_name(&self.name);
        self.type_def.normalize();
    }
}

/// An interface declared by a module.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceTypeDef {
    pub name: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_module_name: Option<String>,
}

impl InterfaceTypeDef {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: gql_object_name(name),
            original_name: name.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    fn normalize(&mut self) {
        if self.original_name.is_empty() {
            self.original_name = self.name.clone();
        }
        self.name = gql_object_name(&self.name);
        for function in &mut self.functions {
            function.normalize();
        }
    }

    pub fn is_subtype_of(&self, other: &InterfaceTypeDef) -> bool {
        let fns: HashMap<&str, &Function> =
            self.functions.iter().map(|f| (f.name.as_str(), f)).collect();
        other.functions.iter().all(|other_fn| {
            fns.get(other_fn.name.as_str())
                .is_some_and(|f| f.is_subtype_of(other_fn))
        })
    }
}

/// An enum declared by a module. Values cross the module boundary as strings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumTypeDef {
    pub name: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub values: Vec<EnumValueTypeDef>,
}

impl EnumTypeDef {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: gql_object_name(name),
            original_name: name.to_string(),
            description: description.to_string(),
            values: Vec::new(),
        }
    }

    pub fn with_value(mut self, name: &str, description: &str) -> Self {
        self.values.push(EnumValueTypeDef {
            name: name.to_string(),
            description: description.to_string(),
        });
        self
    }

    fn normalize(&mut self) {
        if self.original_name.is_empty() {
            self.original_name = self.name.clone();
        }
        self.name = gql_object_name(&self.name);
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumValueTypeDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// What a module returns when asked to describe itself.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub objects: Vec<TypeDef>,
    #[serde(default)]
    pub interfaces: Vec<TypeDef>,
}

impl ModuleDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_object(mut self, obj: ObjectTypeDef) -> Self {
        self.objects.push(TypeDef::object(obj));
        self
    }

    pub fn with_interface(mut self, iface: InterfaceTypeDef) -> Self {
        self.interfaces.push(TypeDef::interface(iface));
        self
    }

    /// The TypeDef describing a module definition itself, used as the return
    /// type of the self-describing call.
    pub fn type_def() -> TypeDef {
        TypeDef::object(ObjectTypeDef::new("Module", ""))
    }
}

// =============================================================================
// Wire representation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum KindTag {
    String,
    Integer,
    Boolean,
    Void,
    List,
    Object,
    Interface,
    Enum,
}

impl KindTag {
    fn as_str(self) -> &'static str {
        match self {
            KindTag::String => "STRING",
            KindTag::Integer => "INTEGER",
            KindTag::Boolean => "BOOLEAN",
            KindTag::Void => "VOID",
            KindTag::List => "LIST",
            KindTag::Object => "OBJECT",
            KindTag::Interface => "INTERFACE",
            KindTag::Enum => "ENUM",
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTypeDef {
    kind: KindTag,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    element_type_def: Option<Box<TypeDef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    as_object: Option<ObjectTypeDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    as_interface: Option<InterfaceTypeDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    as_enum: Option<EnumTypeDef>,
}

impl TryFrom<RawTypeDef> for TypeDef {
    type Error = anyhow::Error;

    fn try_from(raw: RawTypeDef) -> Result<Self, Self::Error> {
        let tag = raw.kind;
        let missing = |field: &str| anyhow!("{} type def is missing {}", tag.as_str(), field);
        let kind = match tag {
            KindTag::String => TypeDefKind::String,
            KindTag::Integer => TypeDefKind::Integer,
            KindTag::Boolean => TypeDefKind::Boolean,
            KindTag::Void => TypeDefKind::Void,
            KindTag::List => {
                TypeDefKind::List(raw.element_type_def.ok_or_else(|| missing("elementTypeDef"))?)
            }
            KindTag::Object => TypeDefKind::Object(raw.as_object.ok_or_else(|| missing("asObject"))?),
            KindTag::Interface => {
                TypeDefKind::Interface(raw.as_interface.ok_or_else(|| missing("asInterface"))?)
            }
            KindTag::Enum => TypeDefKind::Enum(raw.as_enum.ok_or_else(|| missing("asEnum"))?),
        };
        Ok(TypeDef {
            optional: raw.optional,
            kind,
        })
    }
}

impl From<TypeDef> for RawTypeDef {
    fn from(td: TypeDef) -> Self {
        let kind = td.kind_tag();
        let mut raw = RawTypeDef {
            kind,
            optional: td.optional,
            element_type_def: None,
            as_object: None,
            as_interface: None,
            as_enum: None,
        };
        match td.kind {
            TypeDefKind::List(elem) => raw.element_type_def = Some(elem),
            TypeDefKind::Object(obj) => raw.as_object = Some(obj),
            TypeDefKind::Interface(iface) => raw.as_interface = Some(iface),
            TypeDefKind::Enum(def) => raw.as_enum = Some(def),
            TypeDefKind::String | TypeDefKind::Integer | TypeDefKind::Boolean | TypeDefKind::Void => {}
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn animal() -> InterfaceTypeDef {
        InterfaceTypeDef::new("Animal", "").with_function(Function::new("sound", TypeDef::string()))
    }

    #[test]
    fn test_wire_format() {
        let td = TypeDef::list_of(TypeDef::string()).with_optional(true);
        let json = serde_json::to_value(&td).unwrap();
        assert_eq!(
            json,
            json!({"kind": "LIST", "optional": true, "elementTypeDef": {"kind": "STRING"}})
        );
        let back: TypeDef = serde_json::from_value(json).unwrap();
        assert_eq!(back, td);
    }

    #[test]
    fn test_missing_payload_is_rejected() {
        let err = serde_json::from_value::<TypeDef>(json!({"kind": "OBJECT"})).unwrap_err();
        assert!(err.to_string().contains("asObject"));
    }

    #[test]
    fn test_field_requires_type() {
        let field: FieldTypeDef =
            serde_json::from_value(json!({"name": "text", "typeDef": {"kind": "STRING"}})).unwrap();
        assert_eq!(field, FieldTypeDef {
            name: "text".into(),
            original_name: String::new(),
            description: String::new(),
            type_def: TypeDef::string(),
        });
        assert!(serde_json::from_value::<FieldTypeDef>(json!({"name": "text"})).is_err());
    }

    #[test]
    fn test_normalize_records_original_names() {
        let mut td: TypeDef = serde_json::from_value(json!({
            "kind": "OBJECT",
            "asObject": {
                "name": "my_object",
                "fields": [{"name": "FullName", "typeDef": {"kind": "STRING"}}],
                "functions": [{
                    "name": "do_thing",
                    "returnType": {"kind": "VOID"},
                    "args": [{"name": "the_arg", "typeDef": {"kind": "INTEGER"}}]
                }]
            }
        }))
        .unwrap();
        td.normalize();
        let obj = td.as_object().unwrap();
        assert_eq!(obj.name, "MyObject");
        assert_eq!(obj.original_name, "my_object");
        assert_eq!(obj.fields[0].name, "fullName");
        assert_eq!(obj.fields[0].original_name, "FullName");
        assert_eq!(obj.functions[0].name, "doThing");
        assert_eq!(obj.functions[0].args[0].name, "theArg");
        assert_eq!(obj.functions[0].args[0].original_name, "the_arg");

        // idempotent
        let before = td.clone();
        td.normalize();
        assert_eq!(td, before);
    }

    #[test]
    fn test_object_implements_interface_via_function_or_field() {
        let dog = ObjectTypeDef::new("Dog", "")
            .with_function(Function::new("sound", TypeDef::string()));
        assert!(dog.is_subtype_of(&animal()));

        let cat = ObjectTypeDef::new("Cat", "").with_field("sound", TypeDef::string(), "");
        assert!(cat.is_subtype_of(&animal()));

        let rock = ObjectTypeDef::new("Rock", "")
            .with_function(Function::new("sound", TypeDef::integer()));
        assert!(!rock.is_subtype_of(&animal()));

        let empty = ObjectTypeDef::new("Empty", "");
        assert!(!empty.is_subtype_of(&animal()));
    }

    #[test]
    fn test_covariant_returns_contravariant_args() {
        let animal_td = TypeDef::interface(animal());
        let dog_td = TypeDef::object(
            ObjectTypeDef::new("Dog", "").with_function(Function::new("sound", TypeDef::string())),
        );

        // returning a Dog satisfies "returns Animal"
        let iface_fn = Function::new("pet", animal_td.clone());
        let obj_fn = Function::new("pet", dog_td.clone());
        assert!(obj_fn.is_subtype_of(&iface_fn));
        assert!(!iface_fn.is_subtype_of(&obj_fn));

        // accepting any Animal satisfies "accepts Dog", not the other way around
        let iface_fn = Function::new("feed", TypeDef::void()).with_arg("pet", dog_td);
        let obj_fn = Function::new("feed", TypeDef::void()).with_arg("pet", animal_td);
        assert!(obj_fn.is_subtype_of(&iface_fn));
        assert!(!iface_fn.is_subtype_of(&obj_fn));
    }

    #[test]
    fn test_optional_mismatch_is_not_subtype() {
        assert!(!TypeDef::string()
            .with_optional(true)
            .is_subtype_of(&TypeDef::string()));
    }

    #[test]
    fn test_underlying_and_named_type() {
        let td = TypeDef::list_of(TypeDef::list_of(TypeDef::object_ref("thing")));
        assert_eq!(td.underlying().named_type(), Some("Thing"));
        assert_eq!(td.kind_name(), "LIST");
        assert!(td.as_list().is_some());
        assert!(TypeDef::void().is_primitive());
    }

    #[test]
    fn test_lookup_arg_is_case_insensitive() {
        let f = Function::new("greet", TypeDef::string()).with_arg("Name", TypeDef::string());
        assert!(f.lookup_arg("NAME").is_some());
        assert!(f.lookup_arg("other").is_none());
    }
}
