//! Signature comparison shared by overload ordering, virtual slot assignment and
//! interface implementation lookup.
//!
//! Every ordering here is a strict total order that depends only on the
//! descriptors themselves, never on declaration order, because generated
//! names are derived from it.

use crate::{
    metadata::{Metadata, TypeKind},
    types::{members::MethodDescription, TypeCategory, TypeDescription, TypeSig},
};
use std::cmp::Ordering;

/// Whether the receiver (first argument) takes part in a signature comparison.
/// Overrides legitimately narrow the receiver, so virtual matching ignores it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SignatureKind {
    Plain,
    Virtual,
}

pub struct TypeComparer<'a> {
    metadata: &'a Metadata,
}

impl<'a> TypeComparer<'a> {
    pub fn new(metadata: &'a Metadata) -> Self {
        Self { metadata }
    }

    pub fn types_equal(&self, a: &TypeSig, b: &TypeSig) -> bool {
        a == b
    }

    pub fn type_slices_equal(&self, a: &[TypeSig], b: &[TypeSig]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(a, b)| self.types_equal(a, b))
    }

    /// Orders narrower types before the types they are assignable to, by-value
    /// before by-reference, and otherwise primitive < value type < class <
    /// interface < array < pointer.
    pub fn compare_types(&self, a: &TypeSig, b: &TypeSig) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let (a_inner, a_ref) = strip_by_ref(a);
        let (b_inner, b_ref) = strip_by_ref(b);
        self.compare_referents(a_inner, b_inner)
            .then(a_ref.cmp(&b_ref))
    }

    fn compare_referents(&self, a: &TypeSig, b: &TypeSig) -> Ordering {
        let rank = self.rank(a).cmp(&self.rank(b));
        if rank != Ordering::Equal {
            return rank;
        }
        match (a, b) {
            (TypeSig::Vector(l), TypeSig::Vector(r)) | (TypeSig::Pointer(l), TypeSig::Pointer(r)) => {
                self.compare_types(l, r)
            }
            _ if a.is_primitive() && b.is_primitive() => a.cmp(b),
            _ => self
                .depth(b)
                .cmp(&self.depth(a))
                .then_with(|| {
                    a.show(self.metadata)
                        .to_string()
                        .cmp(&b.show(self.metadata).to_string())
                })
                .then_with(|| a.cmp(b)),
        }
    }

    // System.Object sits above every reference kind it is assignable from.
    fn rank(&self, t: &TypeSig) -> u8 {
        match t {
            TypeSig::Object => 5,
            _ => match t.category(self.metadata) {
                TypeCategory::Primitive => 0,
                TypeCategory::Value => 1,
                TypeCategory::Class => 2,
                TypeCategory::Interface => 3,
                TypeCategory::Array => 4,
                TypeCategory::Pointer => 6,
                TypeCategory::ByRef => 7,
                TypeCategory::Void => 8,
            },
        }
    }

    /// Inheritance depth: longer chains are narrower.
    fn depth(&self, t: &TypeSig) -> usize {
        match t {
            TypeSig::String => 1,
            TypeSig::Type(id) => {
                let desc = TypeDescription::new(self.metadata, *id);
                if desc.kind() == TypeKind::Interface {
                    interface_depth(desc)
                } else {
                    desc.ancestors().count()
                }
            }
            _ => 0,
        }
    }

    /// Name and argument types equal; the receiver is skipped for
    /// [`SignatureKind::Virtual`]. Return types are not compared.
    pub fn signatures_equal(
        &self,
        a: MethodDescription,
        b: MethodDescription,
        kind: SignatureKind,
    ) -> bool {
        if a.name() != b.name() {
            return false;
        }
        let (a_args, b_args) = (a.argument_types(), b.argument_types());
        if a_args.len() != b_args.len() {
            return false;
        }
        if a.method().static_member != b.method().static_member {
            return false;
        }
        let skip = match kind {
            SignatureKind::Virtual if a.receiver().is_some() => 1,
            _ => 0,
        };
        self.type_slices_equal(&a_args[skip..], &b_args[skip..])
    }

    pub fn compare_signatures(
        &self,
        a: MethodDescription,
        b: MethodDescription,
        kind: SignatureKind,
    ) -> Ordering {
        let by_name = a.name().cmp(b.name());
        if by_name != Ordering::Equal {
            return by_name;
        }
        let (a_args, b_args) = (a.argument_types(), b.argument_types());
        let by_count = a_args.len().cmp(&b_args.len());
        if by_count != Ordering::Equal {
            return by_count;
        }
        let by_args = a_args
            .iter()
            .zip(&b_args)
            .enumerate()
            .map(|(index, (l, r))| {
                if kind == SignatureKind::Virtual && index == 0 {
                    Ordering::Equal
                } else {
                    self.compare_types(l, r)
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal);
        by_args
            .then_with(|| {
                self.compare_types(&a.method().return_type, &b.method().return_type)
            })
            .then_with(|| a.parent().type_name().cmp(&b.parent().type_name()))
    }
}

fn strip_by_ref(t: &TypeSig) -> (&TypeSig, bool) {
    match t {
        TypeSig::ByRef(inner) => (inner, true),
        other => (other, false),
    }
}

fn interface_depth(t: TypeDescription) -> usize {
    1 + t.interfaces().map(interface_depth).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataBuilder, MethodDef, Parameter, TypeDef};

    #[test]
    fn test_types_equal_primitive() {
        let metadata = MetadataBuilder::new().build();
        let comparer = TypeComparer::new(&metadata);

        assert!(comparer.types_equal(&TypeSig::Int32, &TypeSig::Int32));
        assert!(!comparer.types_equal(&TypeSig::Int32, &TypeSig::Int64));
    }

    #[test]
    fn test_by_value_before_by_ref() {
        let metadata = MetadataBuilder::new().build();
        let comparer = TypeComparer::new(&metadata);

        let by_ref = TypeSig::by_ref(TypeSig::Int32);
        assert_eq!(comparer.compare_types(&TypeSig::Int32, &by_ref), Ordering::Less);
        assert_eq!(comparer.compare_types(&by_ref, &TypeSig::Int32), Ordering::Greater);
        assert_eq!(
            comparer.compare_types(&by_ref, &TypeSig::by_ref(TypeSig::Object)),
            Ordering::Less
        );
    }

    #[test]
    fn test_derived_before_base() {
        let mut builder = MetadataBuilder::new();
        let base = builder.add_type(TypeDef::new("Demo", "Zebra", TypeKind::Class));
        let derived = builder.add_type(TypeDef::new("Demo", "Aardvark", TypeKind::Class).extending(base));
        let iface = builder.add_type(TypeDef::new("Demo", "IThing", TypeKind::Interface));
        let value = builder.add_type(TypeDef::new("Demo", "Point", TypeKind::ValueType));
        let metadata = builder.build();
        let comparer = TypeComparer::new(&metadata);

        let mut sorted = vec![
            TypeSig::pointer(TypeSig::Int32),
            TypeSig::Object,
            TypeSig::Type(base),
            TypeSig::vector(TypeSig::Int32),
            TypeSig::Type(iface),
            TypeSig::Type(derived),
            TypeSig::Type(value),
            TypeSig::Int64,
        ];
        sorted.sort_by(|a, b| comparer.compare_types(a, b));
        assert_eq!(
            sorted,
            vec![
                TypeSig::Int64,
                TypeSig::Type(value),
                TypeSig::Type(derived),
                TypeSig::Type(base),
                TypeSig::Type(iface),
                TypeSig::vector(TypeSig::Int32),
                TypeSig::Object,
                TypeSig::pointer(TypeSig::Int32),
            ]
        );
    }

    #[test]
    fn test_virtual_signature_ignores_receiver() {
        let mut builder = MetadataBuilder::new();
        let base = builder.add_type(TypeDef::new("Demo", "Base", TypeKind::Class));
        let derived = builder.add_type(TypeDef::new("Demo", "Derived", TypeKind::Class).extending(base));
        let params = || vec![Parameter::new("x", TypeSig::Int32)];
        let m1 = builder.add_method(base, MethodDef::instance("M", params(), TypeSig::Void).new_slot());
        let m2 = builder.add_method(derived, MethodDef::instance("M", params(), TypeSig::Void).reuse_slot());
        let m3 = builder.add_method(derived, MethodDef::instance("M", vec![], TypeSig::Void));
        let metadata = builder.build();
        let comparer = TypeComparer::new(&metadata);
        let d = |id| MethodDescription::new(&metadata, id);

        assert!(comparer.signatures_equal(d(m1), d(m2), SignatureKind::Virtual));
        assert!(!comparer.signatures_equal(d(m1), d(m2), SignatureKind::Plain));
        assert!(!comparer.signatures_equal(d(m1), d(m3), SignatureKind::Virtual));
        assert_eq!(
            comparer.compare_signatures(d(m3), d(m1), SignatureKind::Virtual),
            Ordering::Less
        );
    }
}
