use crate::metadata::{Metadata, TypeDef, TypeId, TypeKind};
use crate::types::members::{FieldDescription, MethodDescription};
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};

pub mod comparer;
pub mod members;
mod signature;

pub use signature::{TypeCategory, TypeSig};

#[derive(Clone, Copy)]
pub struct TypeDescription<'a> {
    pub metadata: &'a Metadata,
    pub id: TypeId,
}

impl Debug for TypeDescription<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

impl PartialEq for TypeDescription<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.metadata, other.metadata) && self.id == other.id
    }
}

impl Eq for TypeDescription<'_> {}

impl Hash for TypeDescription<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<'a> TypeDescription<'a> {
    pub fn new(metadata: &'a Metadata, id: TypeId) -> Self {
        Self { metadata, id }
    }

    pub fn definition(&self) -> &'a TypeDef {
        self.metadata.type_def(self.id)
    }

    pub fn type_name(&self) -> String {
        self.definition().full_name()
    }

    pub fn kind(&self) -> TypeKind {
        self.definition().kind
    }

    pub fn is_interface(&self) -> bool {
        self.kind() == TypeKind::Interface
    }

    pub fn is_enum(&self) -> bool {
        self.kind() == TypeKind::Enum
    }

    pub fn is_delegate(&self) -> bool {
        self.kind() == TypeKind::Delegate
    }

    pub fn is_value_type(&self) -> bool {
        matches!(self.kind(), TypeKind::ValueType | TypeKind::Enum)
    }

    pub fn is_reference_type(&self) -> bool {
        !self.is_value_type()
    }

    pub fn signature(&self) -> TypeSig {
        TypeSig::Type(self.id)
    }

    pub fn base(&self) -> Option<TypeDescription<'a>> {
        self.definition()
            .extends
            .map(|id| TypeDescription::new(self.metadata, id))
    }

    /// This type followed by its base types, most-derived first.
    pub fn ancestors(&self) -> Ancestors<'a> {
        Ancestors {
            current: Some(*self),
        }
    }

    pub fn declared_methods(&self) -> impl Iterator<Item = MethodDescription<'a>> + 'a {
        let metadata = self.metadata;
        self.definition()
            .methods
            .iter()
            .map(move |&id| MethodDescription::new(metadata, id))
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldDescription<'a>> + 'a {
        let metadata = self.metadata;
        self.definition()
            .fields
            .iter()
            .map(move |&id| FieldDescription::new(metadata, id))
    }

    /// Interfaces listed directly on this type.
    pub fn interfaces(&self) -> impl Iterator<Item = TypeDescription<'a>> + 'a {
        let metadata = self.metadata;
        self.definition()
            .implements
            .iter()
            .map(move |&id| TypeDescription::new(metadata, id))
    }

    /// Interfaces listed on this type together with the interfaces they
    /// extend, in listing order.
    pub fn listed_interfaces(&self) -> Vec<TypeDescription<'a>> {
        fn visit<'t>(t: TypeDescription<'t>, out: &mut Vec<TypeDescription<'t>>) {
            for interface in t.interfaces() {
                if !out.contains(&interface) {
                    out.push(interface);
                    visit(interface, out);
                }
            }
        }
        let mut out = vec![];
        visit(*self, &mut out);
        out
    }

    /// Interfaces implemented anywhere along the ancestor chain, collected
    /// derived to base, deduplicated, then reversed so base-most come first.
    pub fn all_interfaces(&self) -> Vec<TypeDescription<'a>> {
        let mut seen = vec![];
        for ancestor in self.ancestors() {
            for interface in ancestor.listed_interfaces() {
                if !seen.contains(&interface) {
                    seen.push(interface);
                }
            }
        }
        seen.reverse();
        seen
    }

    fn implements(&self, interface: TypeDescription<'a>) -> bool {
        self.interfaces()
            .any(|i| i == interface || i.implements(interface))
    }

    /// `self` can be stored in a location typed `target`.
    pub fn is_assignable_to(&self, target: TypeDescription<'a>) -> bool {
        if target.is_interface() {
            return self.ancestors().any(|a| a == target || a.implements(target));
        }
        self.ancestors().any(|a| a == target)
    }
}

pub struct Ancestors<'a> {
    current: Option<TypeDescription<'a>>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = TypeDescription<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = current.base();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataBuilder, TypeDef};

    #[test]
    fn ancestors_walk_from_derived_to_base() {
        let mut builder = MetadataBuilder::new();
        let a = builder.add_type(TypeDef::new("Demo", "A", TypeKind::Class));
        let b = builder.add_type(TypeDef::new("Demo", "B", TypeKind::Class).extending(a));
        let c = builder.add_type(TypeDef::new("Demo", "C", TypeKind::Class).extending(b));
        let metadata = builder.build();

        let names: Vec<_> = TypeDescription::new(&metadata, c)
            .ancestors()
            .map(|t| t.type_name())
            .collect();
        assert_eq!(names, ["Demo.C", "Demo.B", "Demo.A"]);
    }

    #[test]
    fn interfaces_are_assignable_through_inheritance() {
        let mut builder = MetadataBuilder::new();
        let root = builder.add_type(TypeDef::new("Demo", "IRoot", TypeKind::Interface));
        let leaf = builder.add_type(
            TypeDef::new("Demo", "ILeaf", TypeKind::Interface).implementing([root]),
        );
        let base = builder.add_type(TypeDef::new("Demo", "Base", TypeKind::Class).implementing([leaf]));
        let derived = builder.add_type(TypeDef::new("Demo", "Derived", TypeKind::Class).extending(base));
        let metadata = builder.build();

        let derived = TypeDescription::new(&metadata, derived);
        assert!(derived.is_assignable_to(TypeDescription::new(&metadata, root)));
        assert!(derived.is_assignable_to(TypeDescription::new(&metadata, base)));
        assert!(!TypeDescription::new(&metadata, base).is_assignable_to(derived));
        assert_eq!(
            TypeDescription::new(&metadata, derived.id)
                .all_interfaces()
                .iter()
                .map(|t| t.type_name())
                .collect::<Vec<_>>(),
            ["Demo.IRoot", "Demo.ILeaf"]
        );
        assert!(TypeSig::Object.is_assignable_from(&TypeSig::Type(leaf), &metadata));
        assert!(!TypeSig::Object.is_assignable_from(&TypeSig::Int32, &metadata));
    }
}
