//! Control-flow and stack-height analysis of one function
//!
//! ### Purpose
//!
//! A translator that wants to turn virtual-stack traffic into fixed storage
//! needs a guarantee first: every path into a program point must arrive with
//! the same virtual-stack depth, so that each stack access can be assigned a
//! fixed slot. This module builds a control-flow graph over a function's
//! instruction sequence and propagates stack heights breadth-first from the
//! entry; any inconsistency (or any instruction whose stack effect cannot be
//! modelled locally) makes the function "not analyzable", which is a
//! per-function degradation, never a fatal error - the caller simply keeps
//! runtime push/pop handling for that one function.
//!
//! ### Modelled stack effects
//!
//! Stack-mode loads pop one value; stack-mode stores push one; `call` and
//! `tailcall` additionally pop their argument count, and `stkcopy` pushes
//! its copy count - both only when the count is an immediate. The other
//! direct stack manipulators (`stkcount`, `stkpeek`, `stkswap`, `stkroll`)
//! and the `glk` intrinsic (which may pop callback arguments the analysis
//! cannot see) decline the whole function.
//!
//! Decoded instructions stay immutable: computed slot positions live in a
//! side table keyed by (instruction index, operand index).

use crate::glulx::{Instruction, Opcode, Param};
use std::collections::{HashMap, VecDeque};
use std::ops::Range;

/// Why a function could not be analyzed
///
/// All of these are declines, not errors: the function still runs fine with
/// unoptimized stack handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotAnalyzable {
    /// `glk` can invoke callbacks whose stack effect is invisible here
    GlkCall { index: usize },

    /// A non-terminator instruction with nothing after it
    FallsOffEnd { index: usize },

    /// A branch through a non-immediate operand
    UnknownBranchTarget { index: usize },

    /// A branch to an address that is not an instruction of this function
    InvalidBranchTarget { index: usize, target: u32 },

    /// A direct stack manipulator outside the modelled set
    StackInstruction { index: usize, mnemonic: &'static str },

    /// `call`/`tailcall` with a non-immediate argument count
    IndeterminateCallArity { index: usize },

    /// `stkcopy` with a non-immediate copy count
    IndeterminateCopyCount { index: usize },

    /// Two paths arrive at the same instruction with different heights
    InconsistentHeight { index: usize, assigned: i32, arriving: i32 },
}

/// Result of a successful stack-height pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackAnalysis {
    /// Height on entry to each instruction; `None` marks unreachable
    /// instructions, which the caller should drop
    pub heights: Vec<Option<i32>>,

    /// `(instruction index, operand index)` to the fixed stack slot that
    /// operand touches
    pub slots: HashMap<(usize, usize), i32>,

    /// Half-open range of slot positions that may be promoted to fixed
    /// storage
    pub range: Range<i32>,
}

/// Build the control-flow graph: for each instruction, the indices it can
/// transfer to
///
/// An edge to the next instruction exists unless the opcode is a block
/// terminator; an edge to the branch target exists for every branch that
/// resolves to an instruction of this function. Branches carrying the
/// return-false/return-true sentinels leave the function and contribute no
/// edge.
pub fn control_flow(function: &[(u32, Instruction)]) -> Result<Vec<Vec<usize>>, NotAnalyzable> {
    let index_of: HashMap<u32, usize> = function
        .iter()
        .enumerate()
        .map(|(index, (offset, _))| (*offset, index))
        .collect();

    let mut edges = vec![vec![]; function.len()];
    for (index, (offset, instr)) in function.iter().enumerate() {
        if instr.opcode == Opcode::Glk {
            return Err(NotAnalyzable::GlkCall { index });
        }
        if instr.opcode.manipulates_stack() && instr.opcode != Opcode::Stkcopy {
            return Err(NotAnalyzable::StackInstruction {
                index,
                mnemonic: instr.opcode.mnemonic(),
            });
        }

        if !instr.opcode.ends_block() {
            if index + 1 >= function.len() {
                return Err(NotAnalyzable::FallsOffEnd { index });
            }
            edges[index].push(index + 1);
        }

        if instr.is_branch() && instr.return_sentinel().is_none() {
            let target = instr
                .branch_target(*offset)
                .ok_or(NotAnalyzable::UnknownBranchTarget { index })?;
            let to = *index_of
                .get(&target)
                .ok_or(NotAnalyzable::InvalidBranchTarget { index, target })?;
            edges[index].push(to);
        }
    }
    Ok(edges)
}

/// Propagate stack heights breadth-first from the entry instruction
pub fn stack_heights(
    function: &[(u32, Instruction)],
    edges: &[Vec<usize>],
) -> Result<StackAnalysis, NotAnalyzable> {
    let mut heights: Vec<Option<i32>> = vec![None; function.len()];
    let mut slots = HashMap::new();
    let mut queue = VecDeque::new();
    if !function.is_empty() {
        heights[0] = Some(0);
        queue.push_back(0usize);
    }

    while let Some(index) = queue.pop_front() {
        let Some(mut height) = heights[index] else { continue };
        let instr = &function[index].1;
        let params = instr.opcode.params();

        // loads pop, in parameter order
        for (oi, (param, operand)) in params.iter().zip(&instr.operands).enumerate() {
            if operand.is_stack_ref()
                && matches!(param, Param::Load | Param::MemAddr | Param::FuncRef)
            {
                height -= 1;
                slots.insert((index, oi), height);
            }
        }

        // calls additionally pop their arguments, copies push duplicates
        match instr.opcode {
            Opcode::Call | Opcode::Tailcall => match instr.operands[1].imm_value() {
                Some(count) => height -= count,
                None => return Err(NotAnalyzable::IndeterminateCallArity { index }),
            },
            Opcode::Stkcopy => match instr.operands[0].imm_value() {
                Some(count) => height += count,
                None => return Err(NotAnalyzable::IndeterminateCopyCount { index }),
            },
            _ => {}
        }

        // stores push
        for (oi, (param, operand)) in params.iter().zip(&instr.operands).enumerate() {
            if operand.is_stack_ref() && *param == Param::Store {
                slots.insert((index, oi), height);
                height += 1;
            }
        }

        for &next in &edges[index] {
            match heights[next] {
                None => {
                    heights[next] = Some(height);
                    queue.push_back(next);
                }
                Some(assigned) if assigned != height => {
                    return Err(NotAnalyzable::InconsistentHeight {
                        index: next,
                        assigned,
                        arriving: height,
                    })
                }
                Some(_) => {}
            }
        }
    }

    let unreachable = heights.iter().filter(|height| height.is_none()).count();
    if unreachable > 0 {
        log::warn!("pruning {} unreachable instructions", unreachable);
    }

    let assigned: Vec<i32> = heights.iter().filter_map(|height| *height).collect();
    let range = match (assigned.iter().min(), assigned.iter().max()) {
        (Some(&low), Some(&high)) => low..high,
        _ => 0..0,
    };

    Ok(StackAnalysis { heights, slots, range })
}

/// Full analysis of one function's instruction sequence (offset, instruction
/// pairs in address order)
pub fn analyze(function: &[(u32, Instruction)]) -> Result<StackAnalysis, NotAnalyzable> {
    let edges = control_flow(function)?;
    stack_heights(function, &edges)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::glulx::Operand;

    /// Lay instructions out from offset 0, computing each one's address
    fn seq(instrs: Vec<Instruction>) -> Vec<(u32, Instruction)> {
        let mut offset = 0u32;
        instrs
            .into_iter()
            .map(|instr| {
                let at = offset;
                offset += instr.encoded_len() as u32;
                (at, instr)
            })
            .collect()
    }

    fn instr(opcode: Opcode, operands: Vec<Operand>) -> Instruction {
        Instruction::new(opcode, operands)
    }

    #[test]
    fn straight_line_heights() {
        let function = seq(vec![
            instr(Opcode::Copy, vec![Operand::imm(1), Operand::Stack]),
            instr(Opcode::Copy, vec![Operand::Stack, Operand::Stack]),
            instr(Opcode::Ret, vec![Operand::Stack]),
        ]);
        let analysis = analyze(&function).unwrap();
        assert_eq!(analysis.heights, vec![Some(0), Some(1), Some(1)]);
        assert_eq!(analysis.slots[&(0, 1)], 0);
        assert_eq!(analysis.slots[&(1, 0)], 0);
        assert_eq!(analysis.slots[&(1, 1)], 0);
        assert_eq!(analysis.slots[&(2, 0)], 0);
        assert_eq!(analysis.range, 0..1);
    }

    #[test]
    fn call_arity_pops() {
        let function = seq(vec![
            instr(Opcode::Copy, vec![Operand::imm(7), Operand::Stack]),
            instr(Opcode::Copy, vec![Operand::imm(8), Operand::Stack]),
            instr(
                Opcode::Call,
                vec![Operand::imm(0x100), Operand::imm(2), Operand::Stack],
            ),
            instr(Opcode::Ret, vec![Operand::Stack]),
        ]);
        let analysis = analyze(&function).unwrap();
        assert_eq!(analysis.heights, vec![Some(0), Some(1), Some(2), Some(1)]);
        // the call's result lands where its two arguments used to live
        assert_eq!(analysis.slots[&(2, 2)], 0);
        assert_eq!(analysis.range, 0..2);
    }

    #[test]
    fn indeterminate_call_arity_declines() {
        let function = seq(vec![
            instr(Opcode::Copy, vec![Operand::imm(2), Operand::Stack]),
            instr(
                Opcode::Call,
                vec![Operand::imm(0x100), Operand::Stack, Operand::Stack],
            ),
            instr(Opcode::Ret, vec![Operand::imm(0)]),
        ]);
        assert_eq!(
            analyze(&function),
            Err(NotAnalyzable::IndeterminateCallArity { index: 1 })
        );
    }

    #[test]
    fn stkcopy_pushes_when_immediate() {
        let function = seq(vec![
            instr(Opcode::Copy, vec![Operand::imm(7), Operand::Stack]),
            instr(Opcode::Stkcopy, vec![Operand::imm(2)]),
            instr(Opcode::Ret, vec![Operand::Stack]),
        ]);
        let analysis = analyze(&function).unwrap();
        assert_eq!(analysis.heights, vec![Some(0), Some(1), Some(3)]);
    }

    #[test]
    fn other_stack_manipulators_decline() {
        let function = seq(vec![
            instr(Opcode::Stkswap, vec![]),
            instr(Opcode::Ret, vec![Operand::imm(0)]),
        ]);
        assert_eq!(
            analyze(&function),
            Err(NotAnalyzable::StackInstruction { index: 0, mnemonic: "stkswap" })
        );
    }

    #[test]
    fn glk_declines() {
        let function = seq(vec![
            instr(
                Opcode::Glk,
                vec![Operand::imm(0x20), Operand::imm(0), Operand::Stack],
            ),
            instr(Opcode::Ret, vec![Operand::imm(0)]),
        ]);
        assert_eq!(analyze(&function), Err(NotAnalyzable::GlkCall { index: 0 }));
    }

    #[test]
    fn inconsistent_heights_decline() {
        // jz falls through into a push, then both paths meet at ret
        let function = seq(vec![
            instr(Opcode::Jz, vec![Operand::imm(1), Operand::imm(5)]),
            instr(Opcode::Copy, vec![Operand::imm(1), Operand::Stack]),
            instr(Opcode::Ret, vec![Operand::imm(0)]),
        ]);
        // check the branch really lands on the ret
        assert_eq!(function[0].1.branch_target(0), Some(function[2].0));
        assert_eq!(
            analyze(&function),
            Err(NotAnalyzable::InconsistentHeight { index: 2, assigned: 0, arriving: 1 })
        );
    }

    #[test]
    fn falls_off_end_declines() {
        let function = seq(vec![instr(
            Opcode::Copy,
            vec![Operand::imm(1), Operand::Stack],
        )]);
        assert_eq!(
            analyze(&function),
            Err(NotAnalyzable::FallsOffEnd { index: 0 })
        );
    }

    #[test]
    fn branch_outside_function_declines() {
        let function = seq(vec![
            instr(Opcode::Jump, vec![Operand::imm(100)]),
            instr(Opcode::Ret, vec![Operand::imm(0)]),
        ]);
        assert!(matches!(
            analyze(&function),
            Err(NotAnalyzable::InvalidBranchTarget { index: 0, .. })
        ));
    }

    #[test]
    fn dynamic_branch_declines() {
        let function = seq(vec![
            instr(Opcode::Copy, vec![Operand::imm(9), Operand::Stack]),
            instr(Opcode::Jump, vec![Operand::Stack]),
        ]);
        assert_eq!(
            analyze(&function),
            Err(NotAnalyzable::UnknownBranchTarget { index: 1 })
        );
    }

    #[test]
    fn sentinel_branches_are_returns_not_edges() {
        let function = seq(vec![
            instr(Opcode::Jz, vec![Operand::imm(3), Operand::imm(1)]),
            instr(Opcode::Ret, vec![Operand::imm(0)]),
        ]);
        let analysis = analyze(&function).unwrap();
        assert_eq!(analysis.heights, vec![Some(0), Some(0)]);
    }

    #[test]
    fn unreachable_code_is_pruned() {
        let function = seq(vec![
            instr(Opcode::Jump, vec![Operand::imm(5)]),
            instr(Opcode::Ret, vec![Operand::imm(7)]),
            instr(Opcode::Ret, vec![Operand::imm(0)]),
        ]);
        // jump is 3 bytes; displacement 5 lands at 3 + 5 - 2 = 6, the
        // second ret - the first is unreachable
        assert_eq!(function[0].1.branch_target(0), Some(function[2].0));
        let analysis = analyze(&function).unwrap();
        assert_eq!(analysis.heights, vec![Some(0), None, Some(0)]);
        assert_eq!(analysis.range, 0..0);
    }
}
