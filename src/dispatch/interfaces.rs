use crate::{
    error::TranslateError,
    metadata::{MethodId, TypeId},
    types::{
        comparer::{SignatureKind, TypeComparer},
        members::MethodDescription,
        TypeDescription,
    },
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InterfaceEntry {
    pub interface_method: MethodId,
    pub implementation: MethodId,
    /// Found through an explicit override rather than by signature.
    pub explicit: bool,
}

/// How one type implements one interface: an entry per interface method, in
/// the interface's declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceMap {
    pub interface: TypeId,
    pub entries: Vec<InterfaceEntry>,
}

impl InterfaceMap {
    pub fn implementation_of(&self, interface_method: MethodId) -> Option<MethodId> {
        self.entries
            .iter()
            .find(|e| e.interface_method == interface_method)
            .map(|e| e.implementation)
    }
}

struct InterfaceResolver<'c, 'a> {
    comparer: &'c TypeComparer<'a>,
    ty: TypeDescription<'a>,
    /// `ty` and its ancestors, most-derived first.
    chain: Vec<TypeDescription<'a>>,
}

impl<'c, 'a> InterfaceResolver<'c, 'a> {
    fn defect(&self, detail: String) -> TranslateError {
        TranslateError::ResolutionDefect {
            type_name: self.ty.type_name(),
            detail,
        }
    }

    fn matches(&self, candidate: MethodDescription<'a>, interface_method: MethodDescription<'a>) -> bool {
        self.comparer
            .signatures_equal(candidate, interface_method, SignatureKind::Virtual)
    }

    fn explicit(&self, interface_method: MethodDescription<'a>) -> Option<MethodDescription<'a>> {
        self.chain
            .iter()
            .flat_map(|t| t.declared_methods())
            .find(|m| m.method().overrides.contains(&interface_method.id))
    }

    /// The visible instance method the interface binds to by signature on
    /// the nearest type that lists the interface.
    fn anchor(
        &self,
        interface: TypeDescription<'a>,
        interface_method: MethodDescription<'a>,
    ) -> Result<MethodDescription<'a>, TranslateError> {
        let anchor_type = self
            .chain
            .iter()
            .find(|t| t.listed_interfaces().contains(&interface))
            .ok_or_else(|| self.defect(format!("no type lists {}", interface.type_name())))?;

        let mut visible: Vec<MethodDescription<'a>> = vec![];
        for method in anchor_type.ancestors().flat_map(|t| t.declared_methods()) {
            let def = method.method();
            if def.is_constructor() || def.static_member || !method.is_visible() {
                continue;
            }
            if !visible
                .iter()
                .any(|v| self.comparer.signatures_equal(*v, method, SignatureKind::Virtual))
            {
                visible.push(method);
            }
        }

        let mut candidates = visible
            .into_iter()
            .filter(|m| self.matches(*m, interface_method));
        match (candidates.next(), candidates.next()) {
            (Some(anchor), None) => Ok(anchor),
            (None, _) => Err(self.defect(format!(
                "no implementation of {}",
                interface_method.full_name()
            ))),
            (Some(_), Some(_)) => Err(self.defect(format!(
                "ambiguous implementation of {}",
                interface_method.full_name()
            ))),
        }
    }

    /// Follows overrides of `anchor` from its declaring type toward `ty`,
    /// stopping before the first method that starts a new slot.
    fn most_derived_override(
        &self,
        anchor: MethodDescription<'a>,
        interface_method: MethodDescription<'a>,
    ) -> MethodDescription<'a> {
        let anchor_type = anchor.parent();
        self.chain
            .iter()
            .rev()
            .filter(|t| t.is_assignable_to(anchor_type))
            .flat_map(|t| t.declared_methods())
            .filter(|m| self.matches(*m, interface_method))
            .take_while(|m| *m == anchor || m.method().is_reuse_slot())
            .last()
            .unwrap_or(anchor)
    }

    fn resolve(&self, interface: TypeDescription<'a>) -> Result<InterfaceMap, TranslateError> {
        let entries = interface
            .declared_methods()
            .map(|interface_method| {
                if let Some(method) = self.explicit(interface_method) {
                    return Ok(InterfaceEntry {
                        interface_method: interface_method.id,
                        implementation: method.id,
                        explicit: true,
                    });
                }
                let anchor = self.anchor(interface, interface_method)?;
                let method = self.most_derived_override(anchor, interface_method);
                dispatch_trace!(
                    self.ty.type_name(),
                    interface_method = %interface_method.full_name(),
                    implementation = %method.full_name(),
                    "implicit interface binding"
                );
                Ok(InterfaceEntry {
                    interface_method: interface_method.id,
                    implementation: method.id,
                    explicit: false,
                })
            })
            .collect::<Result<Vec<_>, TranslateError>>()?;
        Ok(InterfaceMap {
            interface: interface.id,
            entries,
        })
    }
}

/// Implementation maps for every interface `ty` implements, base-most
/// interface first.
pub fn resolve_interface_maps<'a>(
    comparer: &TypeComparer<'a>,
    ty: TypeDescription<'a>,
) -> Result<Vec<InterfaceMap>, TranslateError> {
    let resolver = InterfaceResolver {
        comparer,
        ty,
        chain: ty.ancestors().collect(),
    };
    ty.all_interfaces()
        .into_iter()
        .map(|interface| resolver.resolve(interface))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{Accessibility, MetadataBuilder, MethodDef, TypeDef, TypeKind},
        types::TypeSig,
    };

    #[test]
    fn new_slot_stops_the_override_walk() {
        let mut builder = MetadataBuilder::new();
        let iface = builder.add_type(TypeDef::new("Demo", "IRun", TypeKind::Interface));
        let a = builder.add_type(TypeDef::new("Demo", "A", TypeKind::Class).implementing([iface]));
        let b = builder.add_type(TypeDef::new("Demo", "B", TypeKind::Class).extending(a));
        let c = builder.add_type(TypeDef::new("Demo", "C", TypeKind::Class).extending(b));
        let run = || MethodDef::instance("Run", vec![], TypeSig::Void);
        let i_run = builder.add_method(iface, run().abstract_method());
        builder.add_method(a, run().new_slot());
        let b_run = builder.add_method(b, run().reuse_slot());
        builder.add_method(c, run().new_slot());
        let metadata = builder.build();

        let maps = resolve_interface_maps(&TypeComparer::new(&metadata), TypeDescription::new(&metadata, c)).unwrap();
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].implementation_of(i_run), Some(b_run));
        assert!(!maps[0].entries[0].explicit);
    }

    #[test]
    fn missing_implementation_is_a_defect() {
        let mut builder = MetadataBuilder::new();
        let iface = builder.add_type(TypeDef::new("Demo", "IRun", TypeKind::Interface));
        let a = builder.add_type(TypeDef::new("Demo", "A", TypeKind::Class).implementing([iface]));
        builder.add_method(iface, MethodDef::instance("Run", vec![], TypeSig::Void).abstract_method());
        builder.add_method(
            a,
            MethodDef::instance("Run", vec![], TypeSig::Void).with_accessibility(Accessibility::Private),
        );
        let metadata = builder.build();

        let err = resolve_interface_maps(&TypeComparer::new(&metadata), TypeDescription::new(&metadata, a))
            .unwrap_err();
        assert!(matches!(err, TranslateError::ResolutionDefect { ref type_name, .. } if type_name == "Demo.A"));
    }
}
