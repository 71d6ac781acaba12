use crate::types::TypeSig;

/// Identifies one typed storage location standing in for an evaluation stack
/// position: `depth` is the stack position, `variant` distinguishes the
/// types seen at that position across all paths.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId {
    pub depth: u16,
    pub variant: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackSlot {
    pub id: SlotId,
    pub ty: TypeSig,
}

impl StackSlot {
    pub fn symbol_name(&self) -> String {
        format!("stack{}_{}", self.id.depth, self.id.variant)
    }
}

#[derive(Debug)]
struct StackHolder {
    depth: u16,
    variants: Vec<TypeSig>,
}

impl StackHolder {
    fn get_or_add(&mut self, ty: &TypeSig) -> SlotId {
        let variant = match self.variants.iter().position(|t| t == ty) {
            Some(i) => i,
            None => {
                self.variants.push(ty.clone());
                self.variants.len() - 1
            }
        };
        SlotId {
            depth: self.depth,
            variant: variant as u16,
        }
    }
}

/// The typed evaluation stack of one decode run. Slots are allocated lazily
/// per (depth, type) and never freed, so the same pair always maps to the
/// same slot for the whole method.
#[derive(Debug, Default)]
pub struct EvaluationStack {
    holders: Vec<StackHolder>,
    current: Vec<SlotId>,
}

impl EvaluationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.current.len()
    }

    pub fn push(&mut self, ty: &TypeSig) -> SlotId {
        let depth = self.current.len();
        if depth >= self.holders.len() {
            self.holders.push(StackHolder {
                depth: depth as u16,
                variants: vec![],
            });
        }
        let slot = self.holders[depth].get_or_add(ty);
        self.current.push(slot);
        slot
    }

    pub fn pop(&mut self) -> Option<SlotId> {
        self.current.pop()
    }

    pub fn peek(&self) -> Option<SlotId> {
        self.current.last().copied()
    }

    pub fn slot_type(&self, slot: SlotId) -> &TypeSig {
        &self.holders[slot.depth as usize].variants[slot.variant as usize]
    }

    /// Types currently on the stack, bottom first.
    pub fn snapshot(&self) -> Vec<TypeSig> {
        self.current
            .iter()
            .map(|slot| self.slot_type(*slot).clone())
            .collect()
    }

    /// Rebuilds the stack from a snapshot, reusing the slot already known for
    /// each (depth, type) pair.
    pub fn restore(&mut self, snapshot: &[TypeSig]) {
        self.current.clear();
        for ty in snapshot {
            self.push(ty);
        }
    }

    pub fn extract(&self) -> Vec<StackSlot> {
        self.holders
            .iter()
            .flat_map(|holder| {
                holder.variants.iter().enumerate().map(|(variant, ty)| StackSlot {
                    id: SlotId {
                        depth: holder.depth,
                        variant: variant as u16,
                    },
                    ty: ty.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_depth_same_type_reuses_slot() {
        let mut stack = EvaluationStack::new();
        let first = stack.push(&TypeSig::Int32);
        stack.pop();
        let second = stack.push(&TypeSig::Int32);
        assert_eq!(first, second);

        stack.pop();
        let other = stack.push(&TypeSig::Int64);
        assert_ne!(first, other);
        assert_eq!(other.depth, 0);
        assert_eq!(stack.extract().len(), 2);
    }

    #[test]
    fn restore_rebuilds_from_snapshot() {
        let mut stack = EvaluationStack::new();
        let a = stack.push(&TypeSig::Int32);
        let b = stack.push(&TypeSig::Object);
        let snapshot = stack.snapshot();

        stack.pop();
        stack.pop();
        stack.push(&TypeSig::Float64);
        stack.restore(&snapshot);

        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pop(), Some(b));
        assert_eq!(stack.pop(), Some(a));
        assert_eq!(stack.pop(), None);
    }
}
