use super::ir::*;
use super::module_context::*;
use super::state_elements::*;

use crate::error::{Error, Location, Result};
use crate::graph;

use std::collections::HashMap;

type Key = (ContextIndex, graph::SignalId);

enum Mark {
    Visiting,
    Done(NodeIndex),
}

enum Frame<'a> {
    Enter(ContextIndex, &'a graph::Signal<'a>),
    Leave(ContextIndex, &'a graph::Signal<'a>),
}

pub(crate) struct CompiledPort {
    pub name: String,
    pub bit_width: u32,
    pub node: NodeIndex,
}

/// The result of flattening and scheduling a circuit hierarchy.
pub(crate) struct Program {
    pub nodes: Vec<Node>,
    pub inputs: Vec<(String, u32)>,
    pub outputs: Vec<CompiledPort>,
    pub internals: Vec<CompiledPort>,
    pub registers: Vec<RegisterState>,
    pub mems: Vec<MemState>,
    pub context_count: usize,
}

#[derive(Clone, Copy)]
struct PendingRegister<'a> {
    context: ContextIndex,
    data: &'a graph::RegisterData<'a>,
}

#[derive(Clone, Copy)]
struct PendingMem<'a> {
    context: ContextIndex,
    mem: &'a graph::Mem<'a>,
}

pub(crate) struct Compiler<'a> {
    circuit: &'a graph::Circuit<'a>,
    input_slots: HashMap<graph::SignalId, usize>,

    tree: ContextTree<'a>,
    marks: HashMap<Key, Mark>,
    nodes: Vec<Node>,

    registers: Vec<PendingRegister<'a>>,
    mem_slots: HashMap<(ContextIndex, *const graph::Mem<'a>), usize>,
    mems: Vec<PendingMem<'a>>,

    internals: Vec<CompiledPort>,
}

impl<'a> Compiler<'a> {
    pub fn new(circuit: &'a graph::Circuit<'a>) -> Compiler<'a> {
        let input_slots = circuit
            .inputs
            .iter()
            .enumerate()
            .map(|(slot, input)| (input.id(), slot))
            .collect();
        Compiler {
            circuit,
            input_slots,

            tree: ContextTree::new(),
            marks: HashMap::new(),
            nodes: Vec::new(),

            registers: Vec::new(),
            mem_slots: HashMap::new(),
            mems: Vec::new(),

            internals: Vec::new(),
        }
    }

    pub fn compile(mut self) -> Result<Program> {
        let mut outputs = Vec::new();
        for output in self.circuit.outputs.iter() {
            let node = self.compile_signal(ROOT, output)?;
            outputs.push(CompiledPort {
                name: output.name().unwrap_or_default().to_string(),
                bit_width: output.bit_width(),
                node,
            });
        }

        // Compiling state element inputs can discover more state elements
        let mut registers = Vec::new();
        let mut mems = Vec::new();
        loop {
            if registers.len() < self.registers.len() {
                let PendingRegister { context, data } = self.registers[registers.len()];
                let next = match *data.next.borrow() {
                    Some(next) => self.compile_signal(context, next)?,
                    None => return Err(self.undriven(context, "register", &data.name)),
                };
                let clear = data
                    .clear
                    .map(|clear| self.compile_signal(context, clear))
                    .transpose()?;
                registers.push(RegisterState {
                    name: self.tree.qualified_name(context, &data.name),
                    default_value: data.default_value.get(),
                    next,
                    clear,
                });
                continue;
            }

            if mems.len() < self.mems.len() {
                let PendingMem { context, mem } = self.mems[mems.len()];
                let ports = mem.read_ports.borrow().clone();
                let mut read_ports = Vec::new();
                for port in ports {
                    read_ports.push(ReadPortState {
                        kind: port.kind,
                        address: self.compile_signal(context, port.address)?,
                        enable: port
                            .enable
                            .map(|enable| self.compile_signal(context, enable))
                            .transpose()?,
                    });
                }
                let write_port = *mem.write_port.borrow();
                let write_port = match write_port {
                    Some(port) => Some(WritePortState {
                        address: self.compile_signal(context, port.address)?,
                        value: self.compile_signal(context, port.value)?,
                        enable: self.compile_signal(context, port.enable)?,
                    }),
                    None => None,
                };
                let clear = *mem.clear.borrow();
                let clear = clear
                    .map(|clear| self.compile_signal(context, clear))
                    .transpose()?;
                let initial_contents = mem
                    .initial_contents
                    .borrow()
                    .clone()
                    .unwrap_or_else(|| vec![0; mem.depth as usize]);
                mems.push(MemState {
                    name: self.tree.qualified_name(context, &mem.name),
                    initial_contents,
                    read_ports,
                    write_port,
                    clear,
                });
                continue;
            }

            break;
        }

        Ok(Program {
            nodes: self.nodes,
            inputs: self
                .circuit
                .inputs
                .iter()
                .map(|input| (input.name().unwrap_or_default().to_string(), input.bit_width()))
                .collect(),
            outputs,
            internals: self.internals,
            registers,
            mems,
            context_count: self.tree.len(),
        })
    }

    /// Schedules `signal` and everything it combinationally depends on, returning its node.
    fn compile_signal(
        &mut self,
        context: ContextIndex,
        signal: &'a graph::Signal<'a>,
    ) -> Result<NodeIndex> {
        let mut path: Vec<(ContextIndex, &'a graph::Signal<'a>)> = Vec::new();
        let mut frames = vec![Frame::Enter(context, signal)];

        while let Some(frame) = frames.pop() {
            match frame {
                Frame::Enter(context, signal) => {
                    match self.marks.get(&(context, signal.id())) {
                        Some(Mark::Done(_)) => continue,
                        Some(Mark::Visiting) => return Err(self.cycle(&path, context, signal)),
                        None => (),
                    }
                    self.marks.insert((context, signal.id()), Mark::Visiting);
                    path.push((context, signal));
                    frames.push(Frame::Leave(context, signal));
                    for (dep_context, dep) in self.dependencies(context, signal)?.into_iter().rev() {
                        frames.push(Frame::Enter(dep_context, dep));
                    }
                }
                Frame::Leave(context, signal) => {
                    path.pop();
                    let node = self.emit(context, signal)?;
                    self.marks.insert((context, signal.id()), Mark::Done(node));
                }
            }
        }

        self.node_of(context, signal)
    }

    fn node_of(&self, context: ContextIndex, signal: &'a graph::Signal<'a>) -> Result<NodeIndex> {
        match self.marks.get(&(context, signal.id())) {
            Some(Mark::Done(node)) => Ok(*node),
            _ => Err(Error::CombinationalCycle {
                location: self.location(context),
                signals: vec![signal.describe()],
            }),
        }
    }

    /// Signals whose values `signal` needs within the same clock cycle.
    fn dependencies(
        &mut self,
        context: ContextIndex,
        signal: &'a graph::Signal<'a>,
    ) -> Result<Vec<(ContextIndex, &'a graph::Signal<'a>)>> {
        Ok(match signal.data {
            graph::SignalData::Empty
            | graph::SignalData::Lit { .. }
            | graph::SignalData::Reg { .. } => Vec::new(),

            graph::SignalData::Input { ref name, .. } => {
                match self.tree.get(context).instance_and_parent {
                    Some((instance, parent)) => {
                        let driver = instance.driven_inputs.borrow().get(name).copied();
                        match driver {
                            Some(driver) => vec![(parent, driver)],
                            None => {
                                return Err(Error::UnconnectedInstantiationPort {
                                    location: self.location(parent),
                                    instance: instance.name().to_string(),
                                    port: name.clone(),
                                })
                            }
                        }
                    }
                    None => Vec::new(),
                }
            }
            graph::SignalData::Output { source, .. } => vec![(context, source)],

            graph::SignalData::Wire { data } => match *data.driver.borrow() {
                Some(driver) => vec![(context, driver)],
                None => return Err(self.undriven(context, "wire", &signal.describe())),
            },

            graph::SignalData::UnOp { source, .. } => vec![(context, source)],
            graph::SignalData::BinOp { lhs, rhs, .. } => vec![(context, lhs), (context, rhs)],

            graph::SignalData::Bits { source, .. } => vec![(context, source)],

            graph::SignalData::Repeat { source, .. } => vec![(context, source)],
            graph::SignalData::Concat { lhs, rhs } => vec![(context, lhs), (context, rhs)],

            graph::SignalData::Mux {
                cond,
                when_true,
                when_false,
            } => vec![(context, cond), (context, when_true), (context, when_false)],

            graph::SignalData::MemReadPort { mem, index } => {
                let port = mem.read_ports.borrow()[index];
                match port.kind {
                    graph::ReadPortKind::Combinational => vec![(context, port.address)],
                    _ => Vec::new(),
                }
            }

            graph::SignalData::InstanceOutput {
                instance, ref name, ..
            } => {
                let child = self.tree.get_child(context, instance);
                match instance.circuit().output(name) {
                    Some(output) => vec![(child, output)],
                    None => {
                        return Err(Error::UnknownPort {
                            location: Location::new(instance.circuit().name()),
                            name: name.clone(),
                        })
                    }
                }
            }
        })
    }

    /// Creates the node for `signal` once its dependencies are scheduled. Aliases reuse their target's node.
    fn emit(&mut self, context: ContextIndex, signal: &'a graph::Signal<'a>) -> Result<NodeIndex> {
        let bit_width = signal.bit_width();
        let op = match signal.data {
            graph::SignalData::Empty => Op::Lit(0),
            graph::SignalData::Lit { value, .. } => Op::Lit(value),

            graph::SignalData::Input { ref name, .. } => {
                match self.tree.get(context).instance_and_parent {
                    Some((instance, parent)) => {
                        let driver = instance.driven_inputs.borrow().get(name).copied();
                        return match driver {
                            Some(driver) => self.node_of(parent, driver),
                            None => Err(Error::UnconnectedInstantiationPort {
                                location: self.location(parent),
                                instance: instance.name().to_string(),
                                port: name.clone(),
                            }),
                        };
                    }
                    None => match self.input_slots.get(&signal.id()) {
                        Some(&slot) => Op::Input(slot),
                        None => {
                            return Err(Error::UnknownPort {
                                location: self.location(context),
                                name: name.clone(),
                            })
                        }
                    },
                }
            }
            graph::SignalData::Output { source, .. } => return self.node_of(context, source),

            graph::SignalData::Wire { data } => {
                let node = match *data.driver.borrow() {
                    Some(driver) => self.node_of(context, driver)?,
                    None => return Err(self.undriven(context, "wire", &signal.describe())),
                };
                if let Some(ref name) = data.name {
                    self.internals.push(CompiledPort {
                        name: self.tree.qualified_name(context, name),
                        bit_width,
                        node,
                    });
                }
                return Ok(node);
            }
            graph::SignalData::Reg { data } => {
                let slot = self.registers.len();
                self.registers.push(PendingRegister { context, data });
                let node = self.push(Op::Reg(slot), bit_width);
                self.internals.push(CompiledPort {
                    name: self.tree.qualified_name(context, &data.name),
                    bit_width,
                    node,
                });
                return Ok(node);
            }

            graph::SignalData::UnOp { source, op } => match op {
                graph::UnOp::Not => Op::Not(self.node_of(context, source)?),
            },
            graph::SignalData::BinOp { lhs, rhs, op, .. } => Op::BinOp {
                lhs: self.node_of(context, lhs)?,
                rhs: self.node_of(context, rhs)?,
                op,
            },

            graph::SignalData::Bits {
                source, range_low, ..
            } => Op::Bits {
                source: self.node_of(context, source)?,
                range_low,
            },

            graph::SignalData::Repeat { source, count } => Op::Repeat {
                source: self.node_of(context, source)?,
                source_bit_width: source.bit_width(),
                count,
            },
            graph::SignalData::Concat { lhs, rhs } => Op::Concat {
                lhs: self.node_of(context, lhs)?,
                rhs: self.node_of(context, rhs)?,
                rhs_bit_width: rhs.bit_width(),
            },

            graph::SignalData::Mux {
                cond,
                when_true,
                when_false,
            } => Op::Mux {
                cond: self.node_of(context, cond)?,
                when_true: self.node_of(context, when_true)?,
                when_false: self.node_of(context, when_false)?,
            },

            graph::SignalData::MemReadPort { mem, index } => {
                let mem_slot = self.mem_slot(context, mem);
                let port = mem.read_ports.borrow()[index];
                match port.kind {
                    graph::ReadPortKind::Combinational => Op::AsyncMemRead {
                        mem: mem_slot,
                        address: self.node_of(context, port.address)?,
                    },
                    _ => Op::MemRead {
                        mem: mem_slot,
                        port: index,
                    },
                }
            }

            graph::SignalData::InstanceOutput {
                instance, ref name, ..
            } => {
                let child = self.tree.get_child(context, instance);
                return match instance.circuit().output(name) {
                    Some(output) => self.node_of(child, output),
                    None => Err(Error::UnknownPort {
                        location: Location::new(instance.circuit().name()),
                        name: name.clone(),
                    }),
                };
            }
        };
        Ok(self.push(op, bit_width))
    }

    fn push(&mut self, op: Op, bit_width: u32) -> NodeIndex {
        let node = self.nodes.len();
        self.nodes.push(Node { op, bit_width });
        node
    }

    fn mem_slot(&mut self, context: ContextIndex, mem: &'a graph::Mem<'a>) -> usize {
        let key = (context, mem as *const _);
        if let Some(&slot) = self.mem_slots.get(&key) {
            return slot;
        }
        let slot = self.mems.len();
        self.mem_slots.insert(key, slot);
        self.mems.push(PendingMem { context, mem });
        slot
    }

    fn location(&self, context: ContextIndex) -> Location {
        Location::with_path(self.circuit.name(), self.tree.get(context).path.clone())
    }

    fn undriven(&self, context: ContextIndex, kind: &'static str, name: &str) -> Error {
        Error::Undriven {
            location: self.location(context),
            kind,
            name: name.to_string(),
        }
    }

    fn cycle(
        &self,
        path: &[(ContextIndex, &'a graph::Signal<'a>)],
        context: ContextIndex,
        signal: &'a graph::Signal<'a>,
    ) -> Error {
        let start = path
            .iter()
            .position(|&(c, s)| c == context && s.id() == signal.id())
            .unwrap_or(0);
        Error::CombinationalCycle {
            location: self.location(context),
            signals: path[start..]
                .iter()
                .map(|(_, s)| s.describe())
                .collect(),
        }
    }
}
