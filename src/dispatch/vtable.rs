use crate::{
    metadata::{MethodId, TypeId},
    types::{
        comparer::{SignatureKind, TypeComparer},
        members::MethodDescription,
        TypeDescription,
    },
};

/// One dispatch position. `slot` is the index in the type's slot list and is
/// stable down the hierarchy; `sibling` counts earlier new-slot methods with
/// the same virtual signature.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VirtualSlot {
    pub slot: usize,
    pub sibling: usize,
    pub method: MethodId,
}

/// Assigns dispatch slots to `methods`, given base to derived in declaration
/// order. Each method looks for the nearest already assigned slot with the
/// same virtual signature: none appends a slot, a new-slot method appends a
/// sibling, an override replaces the entry in place.
pub fn assign_virtual_slots<'a>(
    comparer: &TypeComparer,
    methods: impl IntoIterator<Item = MethodDescription<'a>>,
) -> Vec<VirtualSlot> {
    let mut slots: Vec<(MethodDescription<'a>, usize)> = vec![];
    for method in methods.into_iter().filter(|m| m.method().virtual_member) {
        let matched = slots
            .iter()
            .rposition(|(existing, _)| comparer.signatures_equal(*existing, method, SignatureKind::Virtual));
        match matched {
            None => slots.push((method, 0)),
            Some(index) if method.method().is_new_slot() => {
                let sibling = slots[index].1 + 1;
                slots.push((method, sibling));
            }
            Some(index) => slots[index].0 = method,
        }
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(slot, (method, sibling))| VirtualSlot {
            slot,
            sibling,
            method: method.id,
        })
        .collect()
}

/// Every virtual method of `ty` and its ancestors, base first.
pub fn chain_virtual_methods<'a>(ty: TypeDescription<'a>) -> Vec<MethodDescription<'a>> {
    let mut chain: Vec<_> = ty.ancestors().collect();
    chain.reverse();
    chain
        .into_iter()
        .flat_map(|t| t.declared_methods())
        .filter(|m| m.method().virtual_member)
        .collect()
}

/// A type needs its own table when it declares any override or new slot.
/// Types without a base always own one.
pub fn owns_vtable(ty: TypeDescription) -> bool {
    ty.base().is_none() || ty.declared_methods().any(|m| m.method().virtual_member)
}

/// The type whose table `ty` uses: itself, or its nearest ancestor that owns one.
pub fn vtable_owner(ty: TypeDescription) -> TypeId {
    ty.ancestors()
        .find(|t| owns_vtable(*t))
        .map_or(ty.id, |t| t.id)
}

/// A vtable as emitted: only the slots whose method is visible to derived
/// types, in slot order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VTable {
    pub owner: TypeId,
    pub entries: Vec<VirtualSlot>,
}

impl VTable {
    pub fn build(comparer: &TypeComparer, ty: TypeDescription) -> Self {
        let entries = assign_virtual_slots(comparer, chain_virtual_methods(ty))
            .into_iter()
            .filter(|s| MethodDescription::new(ty.metadata, s.method).is_visible())
            .collect();
        Self {
            owner: ty.id,
            entries,
        }
    }

    pub fn entry_for(&self, slot: usize) -> Option<&VirtualSlot> {
        self.entries.iter().find(|e| e.slot == slot)
    }
}
