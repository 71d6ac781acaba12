//! Flat descriptor tables for one translated program.
//!
//! Types, methods and fields are addressed by index newtypes rather than by
//! reference, so ancestor walks and override lookups are plain index iteration.
//! The tables are read-only once built; the only mutation is the idempotent
//! "this type/field is used" registration, which is guarded by a lock so that
//! method decodes may share one `Metadata`.

use crate::types::TypeSig;
use parking_lot::Mutex;
use std::{
    collections::BTreeSet,
    fmt::{self, Display, Formatter},
};

pub mod manifest;

macro_rules! table_index {
    ($name:ident, $table:expr) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub const TABLE: u8 = $table;

            pub fn index(self) -> usize {
                self.0 as usize
            }

            pub fn token(self) -> Token {
                Token::new(Self::TABLE, self.0 + 1)
            }
        }

        impl From<usize> for $name {
            fn from(index: usize) -> Self {
                $name(index as u32)
            }
        }
    };
}

table_index!(TypeId, 0x02);
table_index!(FieldId, 0x04);
table_index!(MethodId, 0x06);

/// A metadata token as it appears in instruction operands: table in the top
/// byte, 1-based row in the low 24 bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    pub const USER_STRING_TABLE: u8 = 0x70;

    pub fn new(table: u8, row: u32) -> Self {
        Token(((table as u32) << 24) | (row & 0x00FF_FFFF))
    }

    pub fn table(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn row(self) -> u32 {
        self.0 & 0x00FF_FFFF
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenTarget {
    Type(TypeId),
    Method(MethodId),
    Field(FieldId),
    UserString(usize),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Class,
    ValueType,
    Interface,
    Enum,
    Delegate,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Accessibility {
    Private,
    FamilyAndAssembly,
    Assembly,
    Family,
    FamilyOrAssembly,
    Public,
}

impl Accessibility {
    /// Visible to derived types, which is what vtables and implicit interface
    /// implementation consider.
    pub fn is_visible(self) -> bool {
        matches!(
            self,
            Accessibility::Public | Accessibility::Family | Accessibility::FamilyOrAssembly
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VtableLayout {
    ReuseSlot,
    NewSlot,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDef {
    pub namespace: String,
    pub name: String,
    pub kind: TypeKind,
    pub public: bool,
    pub extends: Option<TypeId>,
    pub implements: Vec<TypeId>,
    pub fields: Vec<FieldId>,
    pub methods: Vec<MethodId>,
    /// Underlying integer type, for enums.
    pub underlying: Option<TypeSig>,
}

impl TypeDef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            kind,
            public: true,
            extends: None,
            implements: vec![],
            fields: vec![],
            methods: vec![],
            underlying: None,
        }
    }

    pub fn extending(mut self, base: TypeId) -> Self {
        self.extends = Some(base);
        self
    }

    pub fn implementing(mut self, interfaces: impl IntoIterator<Item = TypeId>) -> Self {
        self.implements.extend(interfaces);
        self
    }

    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub ty: TypeSig,
    /// Declared with `params`/`ParamArrayAttribute`.
    pub param_array: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: TypeSig) -> Self {
        Self {
            name: name.into(),
            ty,
            param_array: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodBody {
    pub locals: Vec<TypeSig>,
    pub il: Vec<u8>,
}

/// Where a foreign call entry point lives: the include/library that declares
/// it and the native symbol name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportDescriptor {
    pub library: String,
    pub entry_point: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDef {
    pub name: String,
    pub declaring_type: TypeId,
    pub parameters: Vec<Parameter>,
    pub return_type: TypeSig,
    pub static_member: bool,
    pub virtual_member: bool,
    pub abstract_member: bool,
    pub vtable_layout: VtableLayout,
    pub accessibility: Accessibility,
    pub pinvoke: bool,
    pub import: Option<ImportDescriptor>,
    /// Interface or base methods this method explicitly implements.
    pub overrides: Vec<MethodId>,
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// A public, non-virtual instance method. `declaring_type` is filled in by
    /// [`MetadataBuilder::add_method`].
    pub fn instance(name: impl Into<String>, parameters: Vec<Parameter>, return_type: TypeSig) -> Self {
        Self {
            name: name.into(),
            declaring_type: TypeId(u32::MAX),
            parameters,
            return_type,
            static_member: false,
            virtual_member: false,
            abstract_member: false,
            vtable_layout: VtableLayout::ReuseSlot,
            accessibility: Accessibility::Public,
            pinvoke: false,
            import: None,
            overrides: vec![],
            body: None,
        }
    }

    pub fn static_method(name: impl Into<String>, parameters: Vec<Parameter>, return_type: TypeSig) -> Self {
        Self {
            static_member: true,
            ..Self::instance(name, parameters, return_type)
        }
    }

    /// `virtual` in C#: a fresh dispatch slot.
    pub fn new_slot(mut self) -> Self {
        self.virtual_member = true;
        self.vtable_layout = VtableLayout::NewSlot;
        self
    }

    /// `override` in C#: reuses the inherited slot.
    pub fn reuse_slot(mut self) -> Self {
        self.virtual_member = true;
        self.vtable_layout = VtableLayout::ReuseSlot;
        self
    }

    pub fn abstract_method(mut self) -> Self {
        self.abstract_member = true;
        self.new_slot()
    }

    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    pub fn overriding(mut self, methods: impl IntoIterator<Item = MethodId>) -> Self {
        self.overrides.extend(methods);
        self
    }

    pub fn with_body(mut self, locals: Vec<TypeSig>, il: Vec<u8>) -> Self {
        self.body = Some(MethodBody { locals, il });
        self
    }

    pub fn foreign(mut self, import: Option<ImportDescriptor>) -> Self {
        self.pinvoke = true;
        self.static_member = true;
        self.import = import;
        self
    }

    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor" || self.name == ".cctor"
    }

    pub fn is_new_slot(&self) -> bool {
        self.virtual_member && self.vtable_layout == VtableLayout::NewSlot
    }

    pub fn is_reuse_slot(&self) -> bool {
        self.virtual_member && self.vtable_layout == VtableLayout::ReuseSlot
    }

    pub fn has_param_array(&self) -> bool {
        self.parameters.iter().any(|p| p.param_array)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub declaring_type: TypeId,
    pub ty: TypeSig,
    pub static_member: bool,
    /// Raw initializer bytes (`.data` mapped fields), referenced by `ldtoken`.
    pub initial_value: Option<Vec<u8>>,
}

impl FieldDef {
    pub fn instance(name: impl Into<String>, ty: TypeSig) -> Self {
        Self {
            name: name.into(),
            declaring_type: TypeId(u32::MAX),
            ty,
            static_member: false,
            initial_value: None,
        }
    }

    pub fn static_field(name: impl Into<String>, ty: TypeSig) -> Self {
        Self {
            static_member: true,
            ..Self::instance(name, ty)
        }
    }

    pub fn with_initial_value(mut self, data: Vec<u8>) -> Self {
        self.initial_value = Some(data);
        self
    }
}

#[derive(Debug, Default)]
struct Registrations {
    types: BTreeSet<TypeSig>,
    fields: BTreeSet<FieldId>,
    includes: BTreeSet<String>,
}

/// The metadata provider for one program.
#[derive(Debug)]
pub struct Metadata {
    types: Vec<TypeDef>,
    methods: Vec<MethodDef>,
    fields: Vec<FieldDef>,
    strings: Vec<String>,
    registrations: Mutex<Registrations>,
}

impl Metadata {
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        self.types.iter().enumerate().map(|(i, t)| (TypeId::from(i), t))
    }

    pub fn methods(&self) -> impl Iterator<Item = (MethodId, &MethodDef)> {
        self.methods
            .iter()
            .enumerate()
            .map(|(i, m)| (MethodId::from(i), m))
    }

    pub fn type_def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.index()]
    }

    pub fn method_def(&self, id: MethodId) -> &MethodDef {
        &self.methods[id.index()]
    }

    pub fn field_def(&self, id: FieldId) -> &FieldDef {
        &self.fields[id.index()]
    }

    pub fn find_type(&self, full_name: &str) -> Option<TypeId> {
        self.types()
            .find(|(_, t)| t.full_name() == full_name)
            .map(|(id, _)| id)
    }

    pub fn user_string(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn resolve(&self, token: Token) -> Option<TokenTarget> {
        let row = token.row() as usize;
        if row == 0 {
            return None;
        }
        let index = row - 1;
        match token.table() {
            TypeId::TABLE if index < self.types.len() => Some(TokenTarget::Type(index.into())),
            MethodId::TABLE if index < self.methods.len() => {
                Some(TokenTarget::Method(index.into()))
            }
            FieldId::TABLE if index < self.fields.len() => Some(TokenTarget::Field(index.into())),
            Token::USER_STRING_TABLE if index < self.strings.len() => {
                Some(TokenTarget::UserString(index))
            }
            _ => None,
        }
    }

    /// Records `ty` as used. Returns `true` the first time a signature is seen.
    pub fn register_type(&self, ty: &TypeSig) -> bool {
        self.registrations.lock().types.insert(ty.clone())
    }

    pub fn register_field(&self, field: FieldId) -> bool {
        self.registrations.lock().fields.insert(field)
    }

    pub fn register_include(&self, include: &str) -> bool {
        self.registrations.lock().includes.insert(include.to_string())
    }

    pub fn registered_types(&self) -> Vec<TypeSig> {
        self.registrations.lock().types.iter().cloned().collect()
    }

    pub fn registered_fields(&self) -> Vec<FieldId> {
        self.registrations.lock().fields.iter().copied().collect()
    }

    pub fn registered_includes(&self) -> Vec<String> {
        self.registrations.lock().includes.iter().cloned().collect()
    }
}

#[derive(Debug, Default)]
pub struct MetadataBuilder {
    types: Vec<TypeDef>,
    methods: Vec<MethodDef>,
    fields: Vec<FieldDef>,
    strings: Vec<String>,
}

impl MetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&mut self, def: TypeDef) -> TypeId {
        let id = TypeId::from(self.types.len());
        self.types.push(def);
        id
    }

    pub fn type_def_mut(&mut self, id: TypeId) -> &mut TypeDef {
        &mut self.types[id.index()]
    }

    pub fn add_method(&mut self, parent: TypeId, mut def: MethodDef) -> MethodId {
        let id = MethodId::from(self.methods.len());
        def.declaring_type = parent;
        self.methods.push(def);
        self.types[parent.index()].methods.push(id);
        id
    }

    pub fn method_def_mut(&mut self, id: MethodId) -> &mut MethodDef {
        &mut self.methods[id.index()]
    }

    pub fn add_field(&mut self, parent: TypeId, mut def: FieldDef) -> FieldId {
        let id = FieldId::from(self.fields.len());
        def.declaring_type = parent;
        self.fields.push(def);
        self.types[parent.index()].fields.push(id);
        id
    }

    /// Adds a user string, returning its `ldstr` token.
    pub fn add_string(&mut self, value: impl Into<String>) -> Token {
        self.strings.push(value.into());
        Token::new(Token::USER_STRING_TABLE, self.strings.len() as u32)
    }

    pub fn build(self) -> Metadata {
        Metadata {
            types: self.types,
            methods: self.methods,
            fields: self.fields,
            strings: self.strings,
            registrations: Mutex::new(Registrations::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip_through_resolve() {
        let mut builder = MetadataBuilder::new();
        let ty = builder.add_type(TypeDef::new("Demo", "Foo", TypeKind::Class));
        let m = builder.add_method(ty, MethodDef::static_method("Run", vec![], TypeSig::Void));
        let f = builder.add_field(ty, FieldDef::instance("value", TypeSig::Int32));
        let s = builder.add_string("hello");
        let metadata = builder.build();

        assert_eq!(metadata.resolve(ty.token()), Some(TokenTarget::Type(ty)));
        assert_eq!(metadata.resolve(m.token()), Some(TokenTarget::Method(m)));
        assert_eq!(metadata.resolve(f.token()), Some(TokenTarget::Field(f)));
        assert_eq!(metadata.resolve(s), Some(TokenTarget::UserString(0)));
        assert_eq!(metadata.resolve(Token::new(0x06, 2)), None);
        assert_eq!(metadata.resolve(Token::new(0x06, 0)), None);
    }

    #[test]
    fn registration_is_idempotent() {
        let metadata = MetadataBuilder::new().build();
        assert!(metadata.register_type(&TypeSig::Int32));
        assert!(!metadata.register_type(&TypeSig::Int32));
        assert_eq!(metadata.registered_types(), vec![TypeSig::Int32]);
    }
}
