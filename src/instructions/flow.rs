use super::{BranchForm, IlConverter, Operand};
use crate::{
    decode::DecodeContext,
    emit::node::{CompareOp, Node},
    error::DecodeError,
    types::TypeSig,
};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Branch {
    pub name: &'static str,
    pub form: BranchForm,
}

impl IlConverter for Branch {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_end_of_path(&self) -> bool {
        true
    }

    fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        self.form.read(ctx)
    }

    fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let target = ctx.enqueue_relative(operand.branch(ctx)?)?;
        Ok(Node::Jump(target))
    }
}

/// `brtrue`/`brfalse`: the path continues with the next instruction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BranchIf {
    pub name: &'static str,
    pub when: bool,
    pub form: BranchForm,
}

impl IlConverter for BranchIf {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        self.form.read(ctx)
    }

    fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let delta = operand.branch(ctx)?;
        let condition = ctx.pop()?;
        let target = ctx.enqueue_relative(delta)?;
        Ok(Node::BranchIf {
            condition,
            when: self.when,
            target,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BranchCompare {
    pub name: &'static str,
    pub op: CompareOp,
    pub unsigned: bool,
    pub form: BranchForm,
}

impl IlConverter for BranchCompare {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        self.form.read(ctx)
    }

    fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let delta = operand.branch(ctx)?;
        let right = ctx.pop()?;
        let left = ctx.pop()?;
        let target = ctx.enqueue_relative(delta)?;
        Ok(Node::BranchCompare {
            op: self.op,
            unsigned: self.unsigned,
            left,
            right,
            target,
        })
    }
}

/// Jump table; falls through when the value is out of range.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Switch;

impl IlConverter for Switch {
    fn name(&self) -> &'static str {
        "switch"
    }

    fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        let count = ctx.fetch_u32()?;
        let targets = (0..count)
            .map(|_| ctx.fetch_i32())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Operand::Switch(targets))
    }

    fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let Operand::Switch(deltas) = operand else {
            return Err(ctx.invalid_operand("expected switch table"));
        };
        let value = ctx.pop()?;
        let targets = deltas
            .into_iter()
            .map(|delta| ctx.enqueue_relative(delta))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Node::Switch { value, targets })
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Return;

impl IlConverter for Return {
    fn name(&self) -> &'static str {
        "ret"
    }

    fn is_end_of_path(&self) -> bool {
        true
    }

    fn decode_operand(&self, _ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        Ok(Operand::None)
    }

    fn apply(&self, _operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        if ctx.method().method().return_type == TypeSig::Void {
            return Ok(Node::Return(None));
        }
        Ok(Node::Return(Some(ctx.pop()?)))
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Throw;

impl IlConverter for Throw {
    fn name(&self) -> &'static str {
        "throw"
    }

    fn is_end_of_path(&self) -> bool {
        true
    }

    fn decode_operand(&self, _ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        Ok(Operand::None)
    }

    fn apply(&self, _operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        Ok(Node::Throw(ctx.pop()?))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        emit::node::Node,
        error::DecodeError,
        instructions::testing::{decode_static, nodes},
        types::TypeSig,
    };

    #[test]
    fn switch_targets_are_relative_to_the_end_of_the_table() {
        // 0: ldarg.0
        // 1: switch (2) +1 +2      -> targets 15, 16
        // 14: ret (fallthrough)
        // 15: ret
        // 16: ret
        let mut il = vec![0x02, 0x45, 0x02, 0, 0, 0];
        il.extend_from_slice(&1_i32.to_le_bytes());
        il.extend_from_slice(&2_i32.to_le_bytes());
        il.extend_from_slice(&[0x2A, 0x2A, 0x2A]);
        let body = decode_static(vec![TypeSig::Int32], TypeSig::Void, vec![], il).unwrap();

        let Node::Switch { targets, .. } = &nodes(&body)[1] else {
            panic!("expected switch");
        };
        let offsets: Vec<_> = targets.iter().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![15, 16]);
        assert_eq!(body.labels.len(), 2);
        assert_eq!(body.stats.paths, 3);
    }

    #[test]
    fn return_on_empty_stack_underflows() {
        let err = decode_static(vec![], TypeSig::Int32, vec![], vec![0x00, 0x2A]).unwrap_err();
        assert_eq!(err, DecodeError::StackUnderflow { offset: 1 });
    }

    #[test]
    fn throw_ends_the_path() {
        // ldnull; throw; <garbage never decoded>
        let body = decode_static(vec![], TypeSig::Void, vec![], vec![0x14, 0x7A, 0xFF]).unwrap();
        assert_eq!(body.instructions.len(), 2);
    }
}
