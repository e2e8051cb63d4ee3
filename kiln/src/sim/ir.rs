use crate::graph::{mask, BinOp};

pub(crate) type NodeIndex = usize;

/// One combinational operation in a compiled schedule.
///
/// Operands always refer to nodes earlier in the schedule.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Op {
    Lit(u128),
    Input(usize),
    Reg(usize),
    MemRead {
        mem: usize,
        port: usize,
    },
    AsyncMemRead {
        mem: usize,
        address: NodeIndex,
    },
    Not(NodeIndex),
    BinOp {
        lhs: NodeIndex,
        rhs: NodeIndex,
        op: BinOp,
    },
    Bits {
        source: NodeIndex,
        range_low: u32,
    },
    Repeat {
        source: NodeIndex,
        source_bit_width: u32,
        count: u32,
    },
    Concat {
        lhs: NodeIndex,
        rhs: NodeIndex,
        rhs_bit_width: u32,
    },
    Mux {
        cond: NodeIndex,
        when_true: NodeIndex,
        when_false: NodeIndex,
    },
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Node {
    pub op: Op,
    pub bit_width: u32,
}

/// State a node may read besides other nodes.
pub(crate) struct Sources<'s> {
    pub inputs: &'s [u128],
    pub registers: &'s [u128],
    pub mem_read_data: &'s [Vec<u128>],
    pub mem_contents: &'s [Vec<u128>],
}

impl Node {
    pub fn eval(&self, values: &[u128], sources: &Sources<'_>) -> u128 {
        let value = match self.op {
            Op::Lit(value) => value,
            Op::Input(slot) => sources.inputs[slot],
            Op::Reg(slot) => sources.registers[slot],
            Op::MemRead { mem, port } => sources.mem_read_data[mem][port],
            Op::AsyncMemRead { mem, address } => read_element(&sources.mem_contents[mem], values[address]),
            Op::Not(source) => !values[source],
            Op::BinOp { lhs, rhs, op } => {
                let lhs = values[lhs];
                let rhs = values[rhs];
                match op {
                    BinOp::Add => lhs.wrapping_add(rhs),
                    BinOp::Sub => lhs.wrapping_sub(rhs),
                    BinOp::BitAnd => lhs & rhs,
                    BinOp::BitOr => lhs | rhs,
                    BinOp::BitXor => lhs ^ rhs,
                    BinOp::Equal => (lhs == rhs) as u128,
                    BinOp::NotEqual => (lhs != rhs) as u128,
                    BinOp::LessThan => (lhs < rhs) as u128,
                    BinOp::LessThanEqual => (lhs <= rhs) as u128,
                    BinOp::GreaterThan => (lhs > rhs) as u128,
                    BinOp::GreaterThanEqual => (lhs >= rhs) as u128,
                }
            }
            Op::Bits { source, range_low } => values[source] >> range_low,
            Op::Repeat {
                source,
                source_bit_width,
                count,
            } => {
                let source = values[source];
                (0..count).fold(0, |acc: u128, _| {
                    acc.checked_shl(source_bit_width).unwrap_or(0) | source
                })
            }
            Op::Concat {
                lhs,
                rhs,
                rhs_bit_width,
            } => (values[lhs] << rhs_bit_width) | values[rhs],
            Op::Mux {
                cond,
                when_true,
                when_false,
            } => {
                if values[cond] != 0 {
                    values[when_true]
                } else {
                    values[when_false]
                }
            }
        };
        value & mask(self.bit_width)
    }
}

/// Reads `address` from `contents`; addresses past the end read as `0`.
pub(crate) fn read_element(contents: &[u128], address: u128) -> u128 {
    usize::try_from(address)
        .ok()
        .and_then(|address| contents.get(address))
        .copied()
        .unwrap_or(0)
}
