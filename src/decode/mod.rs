//! Path-specializing bytecode decoder.
//!
//! A method body is decoded as a FIFO worklist of paths. Each path starts at a
//! byte offset with a snapshot of the evaluation stack's types and runs until
//! an instruction ends it or it falls into a region that was already decoded
//! with the same stack typing. An offset reached under a different typing is
//! decoded again, so every emitted instruction works on statically typed slots.

use crate::{
    emit::node::{BranchTarget, LabelId, Symbol, TypingId},
    error::DecodeError,
    instructions::{self, IlConverter},
    metadata::{FieldId, Metadata, Token, TokenTarget},
    types::{
        members::{FieldDescription, MethodDescription},
        TypeSig,
    },
};
use std::collections::{BTreeMap, HashMap, VecDeque};

mod prepared;
mod stack;

pub use prepared::*;
pub use stack::{EvaluationStack, SlotId, StackSlot};

#[derive(Debug, Default)]
struct Typings {
    list: Vec<Vec<TypeSig>>,
    index: HashMap<Vec<TypeSig>, TypingId>,
}

impl Typings {
    fn intern(&mut self, typing: Vec<TypeSig>) -> TypingId {
        if let Some(id) = self.index.get(&typing) {
            return *id;
        }
        let id = TypingId(self.list.len() as u32);
        self.list.push(typing.clone());
        self.index.insert(typing, id);
        id
    }

    fn get(&self, id: TypingId) -> &[TypeSig] {
        &self.list[id.0 as usize]
    }
}

#[derive(Debug)]
struct PendingPath {
    offset: usize,
    snapshot: Vec<TypeSig>,
}

enum Region {
    Fresh,
    AlreadyDecoded,
}

/// Everything an instruction converter can see and touch while decoding one
/// instruction.
pub struct DecodeContext<'a> {
    method: MethodDescription<'a>,
    il: &'a [u8],
    index: usize,
    instruction_offset: usize,
    arguments: Vec<TypeSig>,
    locals: &'a [TypeSig],
    stack: EvaluationStack,
    typings: Typings,
    regions: BTreeMap<usize, Vec<TypingId>>,
    labels: Vec<Label>,
    label_index: HashMap<usize, LabelId>,
    pending: VecDeque<PendingPath>,
    blobs: Vec<DeclaredValue>,
    stats: DecodeStats,
}

impl<'a> DecodeContext<'a> {
    fn new(method: MethodDescription<'a>, il: &'a [u8], locals: &'a [TypeSig]) -> Self {
        Self {
            method,
            il,
            index: 0,
            instruction_offset: 0,
            arguments: method.argument_types(),
            locals,
            stack: EvaluationStack::new(),
            typings: Typings::default(),
            regions: BTreeMap::new(),
            labels: vec![],
            label_index: HashMap::new(),
            pending: VecDeque::new(),
            blobs: vec![],
            stats: DecodeStats::default(),
        }
    }

    pub fn metadata(&self) -> &'a Metadata {
        self.method.metadata
    }

    pub fn method(&self) -> MethodDescription<'a> {
        self.method
    }

    pub fn method_name(&self) -> String {
        self.method.full_name()
    }

    /// Offset of the instruction being decoded.
    pub fn offset(&self) -> usize {
        self.instruction_offset
    }

    /// Offset of the next unread byte; branch deltas are relative to it once
    /// the operand has been read.
    pub fn position(&self) -> usize {
        self.index
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.depth()
    }

    fn fetch<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.index + N;
        let bytes = self
            .il
            .get(self.index..end)
            .ok_or(DecodeError::EndOfBody {
                offset: self.instruction_offset,
            })?;
        self.index = end;
        let mut buf = [0; N];
        buf.copy_from_slice(bytes);
        Ok(buf)
    }

    pub fn fetch_u8(&mut self) -> Result<u8, DecodeError> {
        self.fetch::<1>().map(|[b]| b)
    }

    pub fn fetch_i8(&mut self) -> Result<i8, DecodeError> {
        self.fetch::<1>().map(i8::from_le_bytes)
    }

    pub fn fetch_u16(&mut self) -> Result<u16, DecodeError> {
        self.fetch::<2>().map(u16::from_le_bytes)
    }

    pub fn fetch_u32(&mut self) -> Result<u32, DecodeError> {
        self.fetch::<4>().map(u32::from_le_bytes)
    }

    pub fn fetch_i32(&mut self) -> Result<i32, DecodeError> {
        self.fetch::<4>().map(i32::from_le_bytes)
    }

    pub fn fetch_i64(&mut self) -> Result<i64, DecodeError> {
        self.fetch::<8>().map(i64::from_le_bytes)
    }

    pub fn fetch_f32(&mut self) -> Result<f32, DecodeError> {
        self.fetch::<4>().map(f32::from_le_bytes)
    }

    pub fn fetch_f64(&mut self) -> Result<f64, DecodeError> {
        self.fetch::<8>().map(f64::from_le_bytes)
    }

    pub fn fetch_token(&mut self) -> Result<Token, DecodeError> {
        self.fetch_u32().map(Token)
    }

    pub fn push(&mut self, ty: &TypeSig) -> Symbol {
        Symbol::Stack(self.stack.push(ty))
    }

    pub fn pop(&mut self) -> Result<Symbol, DecodeError> {
        self.stack
            .pop()
            .map(Symbol::Stack)
            .ok_or(DecodeError::StackUnderflow {
                offset: self.instruction_offset,
            })
    }

    /// Pops `count` values, returned in push order.
    pub fn pop_many(&mut self, count: usize) -> Result<Vec<Symbol>, DecodeError> {
        let mut values = (0..count)
            .map(|_| self.pop())
            .collect::<Result<Vec<_>, _>>()?;
        values.reverse();
        Ok(values)
    }

    pub fn peek(&self) -> Result<Symbol, DecodeError> {
        self.stack
            .peek()
            .map(Symbol::Stack)
            .ok_or(DecodeError::StackUnderflow {
                offset: self.instruction_offset,
            })
    }

    pub fn symbol_type(&self, symbol: Symbol) -> Result<TypeSig, DecodeError> {
        match symbol {
            Symbol::Stack(slot) => Ok(self.stack.slot_type(slot).clone()),
            Symbol::Local(index) => self.local_type(index),
            Symbol::Argument(index) => self.argument_type(index),
        }
    }

    pub fn argument_type(&self, index: u16) -> Result<TypeSig, DecodeError> {
        self.arguments
            .get(index as usize)
            .cloned()
            .ok_or_else(|| self.invalid_operand(format!("argument {index} out of range")))
    }

    pub fn local_type(&self, index: u16) -> Result<TypeSig, DecodeError> {
        self.locals
            .get(index as usize)
            .cloned()
            .ok_or_else(|| self.invalid_operand(format!("local {index} out of range")))
    }

    pub fn invalid_operand(&self, detail: impl Into<String>) -> DecodeError {
        DecodeError::InvalidOperand {
            offset: self.instruction_offset,
            detail: detail.into(),
        }
    }

    fn unresolved(&self, token: Token) -> DecodeError {
        DecodeError::UnresolvedToken {
            token: token.0,
            offset: self.instruction_offset,
        }
    }

    pub fn resolve_method(&self, token: Token) -> Result<MethodDescription<'a>, DecodeError> {
        match self.metadata().resolve(token) {
            Some(TokenTarget::Method(id)) => Ok(MethodDescription::new(self.metadata(), id)),
            _ => Err(self.unresolved(token)),
        }
    }

    pub fn resolve_field(&self, token: Token) -> Result<FieldDescription<'a>, DecodeError> {
        match self.metadata().resolve(token) {
            Some(TokenTarget::Field(id)) => Ok(FieldDescription::new(self.metadata(), id)),
            _ => Err(self.unresolved(token)),
        }
    }

    pub fn resolve_string(&self, token: Token) -> Result<&'a str, DecodeError> {
        match self.metadata().resolve(token) {
            Some(TokenTarget::UserString(index)) => self
                .metadata()
                .user_string(index)
                .ok_or_else(|| self.unresolved(token)),
            _ => Err(self.unresolved(token)),
        }
    }

    pub fn resolve_token(&self, token: Token) -> Result<TokenTarget, DecodeError> {
        self.metadata()
            .resolve(token)
            .ok_or_else(|| self.unresolved(token))
    }

    /// Marks a type as used by the generated code.
    pub fn register_type(&self, ty: &TypeSig) {
        self.metadata().register_type(ty);
    }

    /// Registers the declared data of `field` as a blob of this method. A field
    /// is registered once per method however often it is loaded.
    pub fn register_declared_value(&mut self, field: FieldId) -> Result<(BlobId, usize), DecodeError> {
        if let Some(existing) = self.blobs.iter().find(|b| b.field == field) {
            return Ok((existing.id, existing.data.len()));
        }
        let data = self
            .metadata()
            .field_def(field)
            .initial_value
            .clone()
            .ok_or_else(|| self.invalid_operand("field has no declared value"))?;
        let id = BlobId(self.blobs.len() as u32);
        let size = data.len();
        self.blobs.push(DeclaredValue {
            id,
            field,
            data,
        });
        self.metadata().register_field(field);
        Ok((id, size))
    }

    fn label_for(&mut self, offset: usize) -> LabelId {
        if let Some(label) = self.label_index.get(&offset) {
            return *label;
        }
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(Label { id, offset });
        self.label_index.insert(offset, id);
        id
    }

    /// Queues a path starting at the absolute offset `target` with the
    /// current stack typing.
    pub fn enqueue_path(&mut self, target: i64) -> Result<BranchTarget, DecodeError> {
        if target < 0 || target as usize >= self.il.len() {
            return Err(DecodeError::InvalidBranchTarget {
                target,
                offset: self.instruction_offset,
            });
        }
        let offset = target as usize;
        let snapshot = self.stack.snapshot();
        let typing = self.typings.intern(snapshot.clone());
        let label = self.label_for(offset);
        self.pending.push_back(PendingPath { offset, snapshot });
        Ok(BranchTarget {
            label,
            offset,
            typing,
        })
    }

    /// Same as [`Self::enqueue_path`] with a delta relative to the next instruction.
    pub fn enqueue_relative(&mut self, delta: i32) -> Result<BranchTarget, DecodeError> {
        self.enqueue_path(self.index as i64 + delta as i64)
    }

    fn is_decoded(&self, offset: usize, typing: TypingId) -> bool {
        self.regions
            .get(&offset)
            .is_some_and(|typings| typings.contains(&typing))
    }

    fn enter(&mut self, offset: usize, typing: TypingId) -> Result<Region, DecodeError> {
        let depth = self.typings.get(typing).len();
        let decoded = self.regions.entry(offset).or_default();
        if decoded.contains(&typing) {
            return Ok(Region::AlreadyDecoded);
        }
        if let Some(first) = decoded.first() {
            let expected = self.typings.get(*first).len();
            if expected != depth {
                return Err(DecodeError::StackDepthMismatch {
                    offset,
                    expected,
                    actual: depth,
                });
            }
        }
        decoded.push(typing);
        Ok(Region::Fresh)
    }

    fn fetch_converter(&mut self) -> Result<instructions::Converter, DecodeError> {
        let first = self.fetch_u8()?;
        if let Some(converter) = instructions::try_get_converter(first) {
            return Ok(converter);
        }
        let second = self.fetch_u8()?;
        let word = (u16::from(first) << 8) | u16::from(second);
        instructions::try_get_wide_converter(word).ok_or(DecodeError::InvalidOpcode {
            opcode: word,
            offset: self.instruction_offset,
        })
    }

    fn decode_path(&mut self, out: &mut Vec<PreparedInstruction>) -> Result<(), DecodeError> {
        loop {
            let offset = self.index;
            self.instruction_offset = offset;
            if offset >= self.il.len() {
                return Err(DecodeError::EndOfBody { offset });
            }
            let typing = self.typings.intern(self.stack.snapshot());
            if let Region::AlreadyDecoded = self.enter(offset, typing)? {
                let label = self.label_for(offset);
                out.push(PreparedInstruction {
                    location: None,
                    node: crate::emit::node::Node::Jump(BranchTarget {
                        label,
                        offset,
                        typing,
                    }),
                });
                return Ok(());
            }

            let converter = self.fetch_converter()?;
            crate::decode_trace_instruction!(self, offset, converter.name());
            let operand = converter.decode_operand(self)?;
            let node = converter.apply(operand, self)?;
            out.push(PreparedInstruction {
                location: Some(CodeLocation { offset, typing }),
                node,
            });
            if converter.is_end_of_path() {
                return Ok(());
            }
        }
    }

    fn run(mut self) -> Result<DecodedBody, DecodeError> {
        let mut instructions = vec![];
        self.pending.push_back(PendingPath {
            offset: 0,
            snapshot: vec![],
        });

        while let Some(path) = self.pending.pop_front() {
            let typing = self.typings.intern(path.snapshot.clone());
            if self.is_decoded(path.offset, typing) {
                self.stats.merged += 1;
                crate::decode_trace_path!(self, offset = path.offset, "merged");
                continue;
            }
            if self.regions.contains_key(&path.offset) {
                crate::decode_trace_path!(
                    self,
                    offset = path.offset,
                    typing = typing.0,
                    "re-decoding under a new typing"
                );
            }
            self.stats.paths += 1;
            crate::decode_trace_path!(
                self,
                offset = path.offset,
                depth = path.snapshot.len(),
                "path {}",
                self.stats.paths
            );
            self.stack.restore(&path.snapshot);
            self.index = path.offset;
            self.decode_path(&mut instructions)?;
        }

        Ok(DecodedBody {
            instructions,
            locals: self.locals.to_vec(),
            stacks: self.stack.extract(),
            labels: self.labels,
            typings: self.typings.list,
            regions: self.regions,
            blobs: self.blobs,
            stats: self.stats,
        })
    }
}

/// Decodes the body of `method` into prepared instructions.
pub fn decode_method(method: MethodDescription) -> Result<DecodedBody, DecodeError> {
    let body = method.method().body.as_ref();
    let il = body.map_or(&[][..], |b| b.il.as_slice());
    if il.is_empty() {
        return Err(DecodeError::EmptyBody);
    }
    let locals = body.map_or(&[][..], |b| b.locals.as_slice());
    for local in locals {
        method.metadata.register_type(local);
    }
    DecodeContext::new(method, il, locals).run()
}
