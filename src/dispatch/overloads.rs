use crate::{
    metadata::MethodId,
    types::{
        comparer::{SignatureKind, TypeComparer},
        members::MethodDescription,
    },
};
use std::{cmp::Ordering, collections::BTreeMap};

/// Methods sharing a name, in the order that decides their `_{n}` suffixes.
pub type OverloadGroups = BTreeMap<String, Vec<MethodId>>;

fn compare_overloads(comparer: &TypeComparer, a: MethodDescription, b: MethodDescription) -> Ordering {
    let (ma, mb) = (a.method(), b.method());
    ma.static_member
        .cmp(&mb.static_member)
        .then(ma.has_param_array().cmp(&mb.has_param_array()))
        .then(ma.parameters.len().cmp(&mb.parameters.len()))
        .then(ma.is_new_slot().cmp(&mb.is_new_slot()))
        .then_with(|| comparer.compare_signatures(a, b, SignatureKind::Plain))
        .then(a.id.cmp(&b.id))
}

/// Groups `methods` by name and orders each group: instance before static,
/// parameter arrays last, fewer parameters first, overrides before new slots,
/// then by signature.
pub fn order_overloads<'a>(
    comparer: &TypeComparer,
    methods: impl IntoIterator<Item = MethodDescription<'a>>,
) -> OverloadGroups {
    let mut groups: BTreeMap<String, Vec<MethodDescription<'a>>> = BTreeMap::new();
    for method in methods {
        groups.entry(method.name().to_string()).or_default().push(method);
    }
    groups
        .into_iter()
        .map(|(name, mut group)| {
            group.sort_by(|a, b| compare_overloads(comparer, *a, *b));
            (name, group.into_iter().map(|m| m.id).collect())
        })
        .collect()
}

/// Where `method` falls within its name group on the declaring type, computed
/// straight from metadata for types no table holds.
pub fn overload_position(comparer: &TypeComparer, method: MethodDescription) -> usize {
    order_overloads(comparer, method.parent().declared_methods())
        .get(method.name())
        .and_then(|group| group.iter().position(|m| *m == method.id))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{MetadataBuilder, MethodDef, Parameter, TypeDef, TypeKind},
        types::{TypeDescription, TypeSig},
    };

    #[test]
    fn groups_sort_by_kind_then_arity_then_signature() {
        let mut builder = MetadataBuilder::new();
        let ty = builder.add_type(TypeDef::new("Demo", "Printer", TypeKind::Class));
        let p = |t| Parameter::new("value", t);
        let by_static = builder.add_method(ty, MethodDef::static_method("Print", vec![], TypeSig::Void));
        let by_object = builder.add_method(ty, MethodDef::instance("Print", vec![p(TypeSig::Object)], TypeSig::Void));
        let by_int = builder.add_method(ty, MethodDef::instance("Print", vec![p(TypeSig::Int32)], TypeSig::Void));
        let mut params = p(TypeSig::vector(TypeSig::Object));
        params.param_array = true;
        let by_params = builder.add_method(ty, MethodDef::instance("Print", vec![params], TypeSig::Void));
        let none = builder.add_method(ty, MethodDef::instance("Print", vec![], TypeSig::Void));
        let other = builder.add_method(ty, MethodDef::instance("Flush", vec![], TypeSig::Void));
        let metadata = builder.build();
        let comparer = TypeComparer::new(&metadata);

        let groups = order_overloads(&comparer, TypeDescription::new(&metadata, ty).declared_methods());
        assert_eq!(groups["Flush"], vec![other]);
        assert_eq!(groups["Print"], vec![none, by_int, by_object, by_params, by_static]);
        assert_eq!(overload_position(&comparer, MethodDescription::new(&metadata, by_object)), 2);
        assert_eq!(overload_position(&comparer, MethodDescription::new(&metadata, other)), 0);
    }
}
