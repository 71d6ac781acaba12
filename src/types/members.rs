use crate::{
    metadata::{FieldDef, FieldId, Metadata, MethodDef, MethodId},
    types::{TypeDescription, TypeSig},
};
use std::{
    fmt::{Debug, Formatter},
    hash::{Hash, Hasher},
};

#[derive(Clone, Copy)]
pub struct MethodDescription<'a> {
    pub metadata: &'a Metadata,
    pub id: MethodId,
}

impl<'a> MethodDescription<'a> {
    pub fn new(metadata: &'a Metadata, id: MethodId) -> Self {
        Self { metadata, id }
    }

    pub fn method(&self) -> &'a MethodDef {
        self.metadata.method_def(self.id)
    }

    pub fn name(&self) -> &'a str {
        &self.method().name
    }

    pub fn parent(&self) -> TypeDescription<'a> {
        TypeDescription::new(self.metadata, self.method().declaring_type)
    }

    /// `Namespace.Type::Name`
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.parent().type_name(), self.name())
    }

    /// The type of the implicit `this` argument, if any.
    pub fn receiver(&self) -> Option<TypeSig> {
        if self.method().static_member {
            return None;
        }
        let parent = self.parent();
        Some(if parent.is_value_type() {
            TypeSig::by_ref(parent.signature())
        } else {
            parent.signature()
        })
    }

    /// Parameter types as the callee sees them, `this` first for instance methods.
    pub fn argument_types(&self) -> Vec<TypeSig> {
        self.receiver()
            .into_iter()
            .chain(self.method().parameters.iter().map(|p| p.ty.clone()))
            .collect()
    }

    pub fn is_visible(&self) -> bool {
        self.method().accessibility.is_visible()
    }
}

impl Debug for MethodDescription<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let method = self.method();
        if method.static_member {
            write!(f, "static ")?;
        }
        write!(
            f,
            "{} {}(",
            method.return_type.show(self.metadata),
            self.full_name()
        )?;
        for (i, p) in method.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p.ty.show(self.metadata))?;
        }
        write!(f, ")")
    }
}

impl PartialEq for MethodDescription<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.metadata, other.metadata) && self.id == other.id
    }
}

impl Eq for MethodDescription<'_> {}

impl Hash for MethodDescription<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[derive(Clone, Copy)]
pub struct FieldDescription<'a> {
    pub metadata: &'a Metadata,
    pub id: FieldId,
}

impl<'a> FieldDescription<'a> {
    pub fn new(metadata: &'a Metadata, id: FieldId) -> Self {
        Self { metadata, id }
    }

    pub fn field(&self) -> &'a FieldDef {
        self.metadata.field_def(self.id)
    }

    pub fn parent(&self) -> TypeDescription<'a> {
        TypeDescription::new(self.metadata, self.field().declaring_type)
    }
}

impl Debug for FieldDescription<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let field = self.field();
        if field.static_member {
            write!(f, "static ")?;
        }

        write!(
            f,
            "{} {}::{}",
            field.ty.show(self.metadata),
            self.parent().type_name(),
            field.name
        )
    }
}

impl PartialEq for FieldDescription<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.metadata, other.metadata) && self.id == other.id
    }
}

impl Eq for FieldDescription<'_> {}

impl Hash for FieldDescription<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
