//! Compile-time reproduction of virtual and interface dispatch.
//!
//! For every type the resolver computes overload order, virtual slots, which
//! vtable the type uses, interface implementation maps and GC mark targets.
//! Each type is resolved independently; a failing type is reported and left
//! out without affecting the others.

use crate::{
    error::TranslateError,
    metadata::{Metadata, MethodId, TypeId},
    types::{comparer::TypeComparer, TypeDescription},
};
use std::collections::{BTreeMap, HashMap};

mod interfaces;
mod mark;
mod overloads;
mod vtable;

pub use interfaces::{resolve_interface_maps, InterfaceEntry, InterfaceMap};
pub use mark::{mark_targets, MarkTargets};
pub use overloads::{order_overloads, overload_position, OverloadGroups};
pub use vtable::{
    assign_virtual_slots, chain_virtual_methods, owns_vtable, vtable_owner, VTable, VirtualSlot,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDispatch {
    pub ty: TypeId,
    pub overloads: OverloadGroups,
    /// Every dispatch slot of the type, including slots of non-visible methods.
    pub slots: Vec<VirtualSlot>,
    /// The type whose vtable instances of this type point at. `None` for interfaces.
    pub vtable_owner: Option<TypeId>,
    pub interfaces: Vec<InterfaceMap>,
    pub mark_targets: MarkTargets,
}

impl TypeDispatch {
    pub fn owns_vtable(&self) -> bool {
        self.vtable_owner == Some(self.ty)
    }

    pub fn slot_of(&self, method: MethodId) -> Option<&VirtualSlot> {
        self.slots.iter().find(|s| s.method == method)
    }

    pub fn interface_map(&self, interface: TypeId) -> Option<&InterfaceMap> {
        self.interfaces.iter().find(|m| m.interface == interface)
    }
}

pub struct DispatchResolver<'a> {
    metadata: &'a Metadata,
    comparer: TypeComparer<'a>,
}

impl<'a> DispatchResolver<'a> {
    pub fn new(metadata: &'a Metadata) -> Self {
        Self {
            metadata,
            comparer: TypeComparer::new(metadata),
        }
    }

    pub fn resolve_type(&self, id: TypeId) -> Result<TypeDispatch, TranslateError> {
        let ty = TypeDescription::new(self.metadata, id);
        let overloads = order_overloads(&self.comparer, ty.declared_methods());

        if ty.is_interface() {
            return Ok(TypeDispatch {
                ty: id,
                overloads,
                slots: vec![],
                vtable_owner: None,
                interfaces: vec![],
                mark_targets: MarkTargets::Fields(vec![]),
            });
        }

        let slots = assign_virtual_slots(&self.comparer, chain_virtual_methods(ty));
        let owner = vtable_owner(ty);
        let interfaces = resolve_interface_maps(&self.comparer, ty)?;
        dispatch_trace!(
            ty.type_name(),
            slots = slots.len(),
            interfaces = interfaces.len(),
            owns_vtable = owner == id,
            "resolved dispatch"
        );
        Ok(TypeDispatch {
            ty: id,
            overloads,
            slots,
            vtable_owner: Some(owner),
            interfaces,
            mark_targets: mark_targets(ty),
        })
    }

    /// Resolves every type in `types`. Types that fail are returned alongside
    /// the tables instead of aborting the batch.
    pub fn resolve_all(
        &self,
        types: impl IntoIterator<Item = TypeId>,
    ) -> (DispatchTables, Vec<TranslateError>) {
        let mut tables = DispatchTables::default();
        let mut failures = vec![];
        for id in types {
            match self.resolve_type(id) {
                Ok(dispatch) => tables.insert(self.metadata, &self.comparer, dispatch),
                Err(e) => failures.push(e),
            }
        }
        (tables, failures)
    }
}

/// Resolved dispatch for a set of types, plus the lookups code generation
/// needs to address methods and slots by name.
#[derive(Debug, Default)]
pub struct DispatchTables {
    types: BTreeMap<TypeId, TypeDispatch>,
    vtables: BTreeMap<TypeId, VTable>,
    overload_positions: HashMap<MethodId, usize>,
}

impl DispatchTables {
    fn insert(&mut self, metadata: &Metadata, comparer: &TypeComparer, dispatch: TypeDispatch) {
        for group in dispatch.overloads.values() {
            for (position, method) in group.iter().enumerate() {
                self.overload_positions.insert(*method, position);
            }
        }
        if let Some(owner) = dispatch.vtable_owner {
            self.vtables
                .entry(owner)
                .or_insert_with(|| VTable::build(comparer, TypeDescription::new(metadata, owner)));
        }
        self.types.insert(dispatch.ty, dispatch);
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDispatch> {
        self.types.values()
    }

    pub fn get(&self, ty: TypeId) -> Option<&TypeDispatch> {
        self.types.get(&ty)
    }

    /// The table `ty` dispatches through. Types sharing a table get the same
    /// reference.
    pub fn vtable_of(&self, ty: TypeId) -> Option<&VTable> {
        let owner = self.types.get(&ty)?.vtable_owner?;
        self.vtables.get(&owner)
    }

    /// Position of `method` within its name group on the declaring type, or
    /// `None` when that type was never resolved.
    pub fn overload_index(&self, method: MethodId) -> Option<usize> {
        self.overload_positions.get(&method).copied()
    }

    /// The slot `method` occupies on its declaring type.
    pub fn virtual_slot(&self, metadata: &Metadata, method: MethodId) -> Option<&VirtualSlot> {
        let declaring = metadata.method_def(method).declaring_type;
        self.types.get(&declaring)?.slot_of(method)
    }
}
