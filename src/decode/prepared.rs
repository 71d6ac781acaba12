use crate::{
    decode::{SlotId, StackSlot},
    emit::node::{BranchTarget, LabelId, Node, TypingId},
    metadata::{FieldId, ImportDescriptor, MethodId},
    types::TypeSig,
};
use std::collections::BTreeMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobId(pub u32);

/// A raw data blob referenced from the method body, emitted once as a constant
/// array named after the prepared function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclaredValue {
    pub id: BlobId,
    pub field: FieldId,
    pub data: Vec<u8>,
}

/// Where a decoded instruction sits: its byte offset and the stack typing it
/// was decoded under.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CodeLocation {
    pub offset: usize,
    pub typing: TypingId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PreparedInstruction {
    /// `None` for the jump that ends a path falling into an already decoded region.
    pub location: Option<CodeLocation>,
    pub node: Node,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Label {
    pub id: LabelId,
    pub offset: usize,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Paths actually decoded.
    pub paths: usize,
    /// Paths dropped because their (offset, typing) was already decoded.
    pub merged: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedBody {
    pub instructions: Vec<PreparedInstruction>,
    pub locals: Vec<TypeSig>,
    pub stacks: Vec<StackSlot>,
    pub labels: Vec<Label>,
    pub typings: Vec<Vec<TypeSig>>,
    /// Every decoded offset with the typings it was decoded under, in decode order.
    pub regions: BTreeMap<usize, Vec<TypingId>>,
    pub blobs: Vec<DeclaredValue>,
    pub stats: DecodeStats,
}

impl DecodedBody {
    pub fn stack_slot(&self, id: SlotId) -> Option<&StackSlot> {
        self.stacks.iter().find(|s| s.id == id)
    }

    pub fn stacks_at_depth(&self, depth: u16) -> impl Iterator<Item = &StackSlot> {
        self.stacks.iter().filter(move |s| s.id.depth == depth)
    }

    pub fn label_at(&self, offset: usize) -> Option<LabelId> {
        self.labels.iter().find(|l| l.offset == offset).map(|l| l.id)
    }

    /// How many distinct typings `offset` was decoded under.
    pub fn decode_count(&self, offset: usize) -> usize {
        self.regions.get(&offset).map_or(0, Vec::len)
    }

    pub fn typing(&self, id: TypingId) -> &[TypeSig] {
        &self.typings[id.0 as usize]
    }

    /// `L_0000` for the first typing an offset was decoded under, `L_0000_1`
    /// for the second, and so on.
    pub fn label_name(&self, label: LabelId, offset: usize, typing: TypingId) -> String {
        let base = format!("L_{:04x}", label.0);
        let variant = self
            .regions
            .get(&offset)
            .and_then(|typings| typings.iter().position(|t| *t == typing));
        debug_assert!(
            variant.is_some(),
            "offset {offset:#06x} was never decoded under typing {typing:?}"
        );
        let variant = variant.unwrap_or(0);
        if variant == 0 {
            base
        } else {
            format!("{base}_{variant}")
        }
    }

    pub fn target_name(&self, target: BranchTarget) -> String {
        self.label_name(target.label, target.offset, target.typing)
    }

    /// The label to define in front of the instruction at `location`, if it is
    /// a branch target.
    pub fn label_definition(&self, location: CodeLocation) -> Option<String> {
        self.label_at(location.offset)
            .map(|label| self.label_name(label, location.offset, location.typing))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    pub ty: TypeSig,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FunctionBody {
    Decoded(DecodedBody),
    /// Foreign call bridge: no body, the symbol comes from the import.
    Foreign(ImportDescriptor),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PreparedFunction {
    pub method: MethodId,
    pub name: String,
    pub return_type: TypeSig,
    pub arguments: Vec<Argument>,
    pub body: FunctionBody,
}

impl PreparedFunction {
    pub fn decoded(&self) -> Option<&DecodedBody> {
        match &self.body {
            FunctionBody::Decoded(body) => Some(body),
            FunctionBody::Foreign(_) => None,
        }
    }
}
