//! JSON program manifests: the descriptor source for the command line tools
//! and the integration fixtures.
//!
//! Types, fields and methods receive their ids, and therefore their tokens,
//! in the order they are listed. Type signatures are written as in IL
//! disassembly (`int32`, `string`, `Demo.Box[]`, `int32&`, `uint8*`);
//! method references as `Demo.Base::Name`, optionally followed by the
//! parameter list (`Demo.Base::Name(int32, string)`) to pick an overload.

use super::{
    Accessibility, FieldDef, ImportDescriptor, Metadata, MetadataBuilder, MethodDef, MethodId,
    Parameter, TypeDef, TypeId, TypeKind, VtableLayout,
};
use crate::{error::ManifestError, types::TypeSig};
use serde::Deserialize;
use std::{collections::HashMap, path::Path};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramManifest {
    #[serde(default)]
    pub types: Vec<TypeManifest>,
    /// User strings, addressed by `ldstr` tokens `0x70000001` onwards.
    #[serde(default)]
    pub strings: Vec<String>,
}

#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindManifest {
    Class,
    ValueType,
    Interface,
    Enum,
    Delegate,
}

impl From<KindManifest> for TypeKind {
    fn from(kind: KindManifest) -> Self {
        match kind {
            KindManifest::Class => TypeKind::Class,
            KindManifest::ValueType => TypeKind::ValueType,
            KindManifest::Interface => TypeKind::Interface,
            KindManifest::Enum => TypeKind::Enum,
            KindManifest::Delegate => TypeKind::Delegate,
        }
    }
}

fn yes() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeManifest {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    pub kind: KindManifest,
    #[serde(default = "yes")]
    pub public: bool,
    pub extends: Option<String>,
    #[serde(default)]
    pub implements: Vec<String>,
    pub underlying: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldManifest>,
    #[serde(default)]
    pub methods: Vec<MethodManifest>,
}

impl TypeManifest {
    fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldManifest {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, rename = "static")]
    pub static_member: bool,
    /// Initial data as hex, for fields backing array initializers.
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterManifest {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub params: bool,
}

#[derive(Copy, Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutManifest {
    #[default]
    ReuseSlot,
    NewSlot,
}

#[derive(Copy, Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessManifest {
    Private,
    FamilyAndAssembly,
    Assembly,
    Family,
    FamilyOrAssembly,
    #[default]
    Public,
}

impl From<AccessManifest> for Accessibility {
    fn from(access: AccessManifest) -> Self {
        match access {
            AccessManifest::Private => Accessibility::Private,
            AccessManifest::FamilyAndAssembly => Accessibility::FamilyAndAssembly,
            AccessManifest::Assembly => Accessibility::Assembly,
            AccessManifest::Family => Accessibility::Family,
            AccessManifest::FamilyOrAssembly => Accessibility::FamilyOrAssembly,
            AccessManifest::Public => Accessibility::Public,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportManifest {
    pub library: String,
    pub entry_point: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodManifest {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterManifest>,
    #[serde(default = "void")]
    pub returns: String,
    #[serde(default, rename = "static")]
    pub static_member: bool,
    #[serde(default, rename = "virtual")]
    pub virtual_member: bool,
    #[serde(default, rename = "abstract")]
    pub abstract_member: bool,
    #[serde(default)]
    pub layout: LayoutManifest,
    #[serde(default)]
    pub access: AccessManifest,
    #[serde(default)]
    pub pinvoke: bool,
    pub import: Option<ImportManifest>,
    #[serde(default)]
    pub overrides: Vec<String>,
    #[serde(default)]
    pub locals: Vec<String>,
    /// Method body as hex.
    pub il: Option<String>,
}

fn void() -> String {
    "void".to_string()
}

/// Resolves manifest type names against the declared types.
struct SignatureParser {
    types: HashMap<String, TypeId>,
}

impl SignatureParser {
    fn parse(&self, text: &str) -> Result<TypeSig, ManifestError> {
        let text = text.trim();
        if let Some(inner) = text.strip_suffix("[]") {
            return Ok(TypeSig::vector(self.parse(inner)?));
        }
        if let Some(inner) = text.strip_suffix('&') {
            return Ok(TypeSig::by_ref(self.parse(inner)?));
        }
        if let Some(inner) = text.strip_suffix('*') {
            return Ok(TypeSig::pointer(self.parse(inner)?));
        }
        let ty = match text {
            "" => return Err(ManifestError::InvalidSignature(text.to_string())),
            "void" => TypeSig::Void,
            "bool" => TypeSig::Boolean,
            "char" => TypeSig::Char,
            "int8" => TypeSig::Int8,
            "uint8" => TypeSig::UInt8,
            "int16" => TypeSig::Int16,
            "uint16" => TypeSig::UInt16,
            "int32" => TypeSig::Int32,
            "uint32" => TypeSig::UInt32,
            "int64" => TypeSig::Int64,
            "uint64" => TypeSig::UInt64,
            "float32" => TypeSig::Float32,
            "float64" => TypeSig::Float64,
            "native int" | "intptr" => TypeSig::IntPtr,
            "native uint" | "uintptr" => TypeSig::UIntPtr,
            "object" => TypeSig::Object,
            "string" => TypeSig::String,
            "System.RuntimeFieldHandle" => TypeSig::RuntimeFieldHandle,
            name => TypeSig::Type(
                *self
                    .types
                    .get(name)
                    .ok_or_else(|| ManifestError::UnknownType(name.to_string()))?,
            ),
        };
        Ok(ty)
    }

    fn type_id(&self, name: &str) -> Result<TypeId, ManifestError> {
        self.types
            .get(name)
            .copied()
            .ok_or_else(|| ManifestError::UnknownType(name.to_string()))
    }
}

fn decode_hex(owner: &str, text: &str) -> Result<Vec<u8>, ManifestError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact).map_err(|source| ManifestError::Hex {
        method: owner.to_string(),
        source,
    })
}

impl ProgramManifest {
    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Builds the metadata tables. Types are declared first so that bases,
    /// interfaces and signatures may refer to types listed later; overrides
    /// are resolved last, once every method has an id.
    pub fn build(&self) -> Result<Metadata, ManifestError> {
        let mut builder = MetadataBuilder::new();
        let mut types = HashMap::new();
        let mut ids = vec![];
        for ty in &self.types {
            let full_name = ty.full_name();
            let mut def = TypeDef::new(ty.namespace.clone(), ty.name.clone(), ty.kind.into());
            def.public = ty.public;
            let id = builder.add_type(def);
            if types.insert(full_name.clone(), id).is_some() {
                return Err(ManifestError::DuplicateType(full_name));
            }
            ids.push(id);
        }
        let parser = SignatureParser { types };

        let mut pending_overrides = vec![];
        for (manifest, &id) in self.types.iter().zip(&ids) {
            let def = builder.type_def_mut(id);
            def.extends = manifest.extends.as_deref().map(|b| parser.type_id(b)).transpose()?;
            def.implements = manifest
                .implements
                .iter()
                .map(|i| parser.type_id(i))
                .collect::<Result<_, ManifestError>>()?;
            def.underlying = manifest.underlying.as_deref().map(|u| parser.parse(u)).transpose()?;

            for field in &manifest.fields {
                let ty = parser.parse(&field.ty)?;
                let mut def = if field.static_member {
                    FieldDef::static_field(field.name.clone(), ty)
                } else {
                    FieldDef::instance(field.name.clone(), ty)
                };
                if let Some(data) = &field.data {
                    def = def.with_initial_value(decode_hex(&field.name, data)?);
                }
                builder.add_field(id, def);
            }

            for method in &manifest.methods {
                let owner = format!("{}::{}", manifest.full_name(), method.name);
                let parameters = method
                    .parameters
                    .iter()
                    .map(|p| {
                        Ok(Parameter {
                            name: p.name.clone(),
                            ty: parser.parse(&p.ty)?,
                            param_array: p.params,
                        })
                    })
                    .collect::<Result<Vec<_>, ManifestError>>()?;
                let mut def = MethodDef::instance(method.name.clone(), parameters, parser.parse(&method.returns)?);
                def.static_member = method.static_member;
                def.virtual_member = method.virtual_member || method.abstract_member;
                def.abstract_member = method.abstract_member;
                def.vtable_layout = match method.layout {
                    LayoutManifest::ReuseSlot => VtableLayout::ReuseSlot,
                    LayoutManifest::NewSlot => VtableLayout::NewSlot,
                };
                def.accessibility = method.access.into();
                def.pinvoke = method.pinvoke || method.import.is_some();
                def.import = method.import.as_ref().map(|i| ImportDescriptor {
                    library: i.library.clone(),
                    entry_point: i.entry_point.clone(),
                });
                if let Some(il) = &method.il {
                    let locals = method
                        .locals
                        .iter()
                        .map(|l| parser.parse(l))
                        .collect::<Result<_, ManifestError>>()?;
                    def = def.with_body(locals, decode_hex(&owner, il)?);
                }
                let method_id = builder.add_method(id, def);
                if !method.overrides.is_empty() {
                    pending_overrides.push((method_id, &method.overrides));
                }
            }
        }

        let mut overrides = vec![];
        for (method, references) in pending_overrides {
            let resolved = references
                .iter()
                .map(|r| self.resolve_method(&parser, r))
                .collect::<Result<Vec<_>, ManifestError>>()?;
            overrides.push((method, resolved));
        }
        for (method, resolved) in overrides {
            builder.method_def_mut(method).overrides = resolved;
        }
        for value in &self.strings {
            builder.add_string(value.clone());
        }
        Ok(builder.build())
    }

    /// `Type::Name` or `Type::Name(params)`, against the manifest's own
    /// method listing so ids line up with declaration order.
    fn resolve_method(&self, parser: &SignatureParser, reference: &str) -> Result<MethodId, ManifestError> {
        let unknown = || ManifestError::UnknownMethod(reference.to_string());
        let (type_name, rest) = reference.split_once("::").ok_or_else(unknown)?;
        let (name, params) = match rest.split_once('(') {
            Some((name, params)) => {
                let params = params.strip_suffix(')').ok_or_else(unknown)?;
                let params = params
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| parser.parse(p))
                    .collect::<Result<Vec<_>, ManifestError>>()?;
                (name, Some(params))
            }
            None => (rest, None),
        };
        let type_id = parser.type_id(type_name)?;

        let mut next = 0usize;
        for (index, ty) in self.types.iter().enumerate() {
            for method in &ty.methods {
                let id = MethodId::from(next);
                next += 1;
                if index != type_id.index() || method.name != name {
                    continue;
                }
                let matches = match &params {
                    None => true,
                    Some(expected) => {
                        expected.len() == method.parameters.len()
                            && expected
                                .iter()
                                .zip(&method.parameters)
                                .all(|(e, p)| parser.parse(&p.ty).is_ok_and(|t| t == *e))
                    }
                };
                if matches {
                    return Ok(id);
                }
            }
        }
        Err(unknown())
    }
}
