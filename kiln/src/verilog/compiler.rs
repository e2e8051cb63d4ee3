use super::ir::*;

use crate::error::{Error, Location, Result};
use crate::graph;
use crate::validation::legal_identifier;

use std::collections::HashMap;

struct MemDecls {
    name: String,
    read_port_names: Vec<String>,
}

struct InstanceDecls {
    name: String,
    output_names: HashMap<String, String>,
}

/// Lowers one circuit, without descending into the circuits it instantiates.
pub(super) struct Compiler<'a> {
    circuit: &'a graph::Circuit<'a>,

    names: Names,
    regs: HashMap<graph::SignalId, String>,
    wires: HashMap<graph::SignalId, String>,
    mems: HashMap<&'a graph::Mem<'a>, MemDecls>,
    instances: HashMap<&'a graph::Instance<'a>, InstanceDecls>,

    signal_exprs: HashMap<graph::SignalId, Expr>,
    assignments: AssignmentContext,
}

impl<'a> Compiler<'a> {
    pub fn new(circuit: &'a graph::Circuit<'a>) -> Compiler<'a> {
        let mut names = Names::new();
        for port in circuit.inputs().iter().chain(circuit.outputs().iter()) {
            names.reserve(port.name().unwrap_or_default());
        }

        let regs = circuit
            .registers
            .iter()
            .map(|reg| (reg.id(), names.claim(&local_name(reg))))
            .collect();
        let wires = circuit
            .wires
            .iter()
            .map(|wire| (wire.id(), names.claim(&local_name(wire))))
            .collect();
        let mems = circuit
            .mems()
            .iter()
            .map(|&mem| {
                let name = names.claim(&legal_identifier(mem.name()));
                let read_port_names = (0..mem.read_ports.borrow().len())
                    .map(|index| names.claim(&format!("{}_read_{}", name, index)))
                    .collect();
                (
                    mem,
                    MemDecls {
                        name,
                        read_port_names,
                    },
                )
            })
            .collect();
        let instances = circuit
            .instances()
            .iter()
            .map(|&instance| {
                let name = names.claim(&legal_identifier(instance.name()));
                let output_names = instance
                    .circuit()
                    .outputs()
                    .iter()
                    .filter_map(|output| output.name())
                    .map(|port| {
                        (
                            port.to_string(),
                            names.claim(&format!("{}_{}", name, port)),
                        )
                    })
                    .collect();
                (instance, InstanceDecls { name, output_names })
            })
            .collect();

        Compiler {
            circuit,

            names,
            regs,
            wires,
            mems,
            instances,

            signal_exprs: HashMap::new(),
            assignments: AssignmentContext::new(),
        }
    }

    pub fn compile(mut self) -> Result<Module> {
        let circuit = self.circuit;

        let mut ports = Vec::new();
        for input in circuit.inputs().iter() {
            ports.push(PortDecl {
                direction: "input",
                name: input.name().unwrap_or_default().to_string(),
                bit_width: input.bit_width(),
            });
        }
        for output in circuit.outputs().iter() {
            let name = output.name().unwrap_or_default().to_string();
            let expr = self.compile_signal(output)?;
            self.assignments.push(Assignment {
                target_name: name.clone(),
                expr,
            });
            ports.push(PortDecl {
                direction: "output",
                name,
                bit_width: output.bit_width(),
            });
        }

        let mut decls = Vec::new();
        let mut initial = Vec::new();
        let mut always = Vec::new();

        for &reg in circuit.registers.iter() {
            let data = match reg.data {
                graph::SignalData::Reg { data } => data,
                _ => continue,
            };
            let name = self.regs[&reg.id()].clone();
            decls.push(NodeDecl {
                kind: "reg",
                name: name.clone(),
                bit_width: data.bit_width,
            });
            let default_value = Expr::Constant {
                bit_width: data.bit_width,
                value: data.default_value.get(),
            };
            initial.push(Statement::Blocking {
                target: Expr::Ref { name: name.clone() },
                expr: default_value.clone(),
            });

            let next = match *data.next.borrow() {
                Some(next) => next,
                None => {
                    return Err(Error::Undriven {
                        location: self.location(),
                        kind: "register",
                        name: data.name.clone(),
                    })
                }
            };
            let next = Statement::NonBlocking {
                target: Expr::Ref { name: name.clone() },
                expr: self.compile_signal(next)?,
            };
            let statement = match data.clear {
                Some(clear) => Statement::If {
                    cond: self.compile_signal(clear)?,
                    then: vec![Statement::NonBlocking {
                        target: Expr::Ref { name },
                        expr: default_value,
                    }],
                    otherwise: vec![next],
                },
                None => next,
            };
            always.push(AlwaysBlock {
                clock: self.compile_signal(data.clock)?,
                statements: vec![statement],
            });
        }

        for &wire in circuit.wires.iter() {
            let data = match wire.data {
                graph::SignalData::Wire { data } => data,
                _ => continue,
            };
            let name = self.wires[&wire.id()].clone();
            decls.push(NodeDecl {
                kind: "wire",
                name: name.clone(),
                bit_width: data.bit_width,
            });
            let driver = match *data.driver.borrow() {
                Some(driver) => driver,
                None => {
                    return Err(Error::Undriven {
                        location: self.location(),
                        kind: "wire",
                        name: wire.describe(),
                    })
                }
            };
            let expr = self.compile_signal(driver)?;
            self.assignments.push(Assignment {
                target_name: name,
                expr,
            });
        }

        for &mem in circuit.mems().iter() {
            self.compile_mem(mem, &mut decls, &mut initial, &mut always)?;
        }

        let mut instances = Vec::new();
        for &instance in circuit.instances().iter() {
            let child = instance.circuit();
            let mut connections = Vec::new();
            for input in child.inputs().iter() {
                let port = input.name().unwrap_or_default().to_string();
                let driver = instance.driven_inputs.borrow().get(&port).copied();
                let driver = match driver {
                    Some(driver) => driver,
                    None => {
                        return Err(Error::UnconnectedInstantiationPort {
                            location: self.location(),
                            instance: instance.name().to_string(),
                            port,
                        })
                    }
                };
                connections.push((port, self.compile_signal(driver)?));
            }
            let decls_for_instance = &self.instances[&instance];
            for output in child.outputs().iter() {
                let port = output.name().unwrap_or_default().to_string();
                let name = decls_for_instance.output_names[&port].clone();
                decls.push(NodeDecl {
                    kind: "wire",
                    name: name.clone(),
                    bit_width: output.bit_width(),
                });
                connections.push((port, Expr::Ref { name }));
            }
            instances.push(InstanceDecl {
                module_name: legal_identifier(child.name()),
                name: decls_for_instance.name.clone(),
                connections,
            });
        }

        Ok(Module {
            name: legal_identifier(circuit.name()),
            ports,
            decls,
            assignments: self.assignments,
            instances,
            initial,
            always,
        })
    }

    fn compile_mem(
        &mut self,
        mem: &'a graph::Mem<'a>,
        decls: &mut Vec<NodeDecl>,
        initial: &mut Vec<Statement>,
        always: &mut Vec<AlwaysBlock>,
    ) -> Result<()> {
        let name = self.mems[&mem].name.clone();
        let read_port_names = self.mems[&mem].read_port_names.clone();
        let clock = self.compile_signal(mem.clock)?;

        decls.push(NodeDecl {
            kind: "reg",
            name: format!("{}[0:{}]", name, mem.depth - 1),
            bit_width: mem.element_bit_width,
        });
        if let Some(contents) = mem.initial_contents.borrow().as_ref() {
            for (address, &value) in contents.iter().enumerate() {
                initial.push(Statement::Blocking {
                    target: Expr::Index {
                        name: name.clone(),
                        index: Box::new(Expr::Constant {
                            bit_width: mem.address_bit_width,
                            value: address as u128,
                        }),
                    },
                    expr: Expr::Constant {
                        bit_width: mem.element_bit_width,
                        value,
                    },
                });
            }
        }

        let write_port = *mem.write_port.borrow();
        let write_port = match write_port {
            Some(port) => Some((
                self.compile_signal(port.address)?,
                self.compile_signal(port.value)?,
                self.compile_signal(port.enable)?,
            )),
            None => None,
        };

        let mut statements = Vec::new();
        let mut registered_read_port_names = Vec::new();
        let read_ports = mem.read_ports.borrow().clone();
        for (port, read_port_name) in read_ports.into_iter().zip(read_port_names) {
            let address = self.compile_signal(port.address)?;
            let read = Expr::Index {
                name: name.clone(),
                index: Box::new(address.clone()),
            };
            let target = Expr::Ref {
                name: read_port_name.clone(),
            };
            match port.kind {
                graph::ReadPortKind::Combinational => {
                    decls.push(NodeDecl {
                        kind: "wire",
                        name: read_port_name.clone(),
                        bit_width: mem.element_bit_width,
                    });
                    self.assignments.push(Assignment {
                        target_name: read_port_name,
                        expr: read,
                    });
                }
                graph::ReadPortKind::Registered | graph::ReadPortKind::WriteThrough => {
                    registered_read_port_names.push(read_port_name.clone());
                    decls.push(NodeDecl {
                        kind: "reg",
                        name: read_port_name,
                        bit_width: mem.element_bit_width,
                    });
                    initial.push(Statement::Blocking {
                        target: target.clone(),
                        expr: Expr::Constant {
                            bit_width: mem.element_bit_width,
                            value: 0,
                        },
                    });
                    let expr = match (port.kind, &write_port) {
                        (graph::ReadPortKind::WriteThrough, Some((write_address, value, enable))) => {
                            let same_address = self.assignments.gen_temp(
                                Expr::BinOp {
                                    lhs: Box::new(write_address.clone()),
                                    rhs: Box::new(address),
                                    op: BinOp::Equal,
                                },
                                1,
                                &mut self.names,
                            );
                            let pass_through = self.assignments.gen_temp(
                                Expr::BinOp {
                                    lhs: Box::new(enable.clone()),
                                    rhs: Box::new(same_address),
                                    op: BinOp::BitAnd,
                                },
                                1,
                                &mut self.names,
                            );
                            Expr::Ternary {
                                cond: Box::new(pass_through),
                                when_true: Box::new(value.clone()),
                                when_false: Box::new(read),
                            }
                        }
                        _ => read,
                    };
                    let load = Statement::NonBlocking { target, expr };
                    statements.push(match port.enable {
                        Some(enable) => Statement::If {
                            cond: self.compile_signal(enable)?,
                            then: vec![load],
                            otherwise: Vec::new(),
                        },
                        None => load,
                    });
                }
            }
        }

        if let Some((address, value, enable)) = write_port {
            statements.push(Statement::If {
                cond: enable,
                then: vec![Statement::NonBlocking {
                    target: Expr::Index {
                        name: name.clone(),
                        index: Box::new(address),
                    },
                    expr: value,
                }],
                otherwise: Vec::new(),
            });
        }

        let clear = *mem.clear.borrow();
        if let Some(clear) = clear {
            let contents = mem
                .initial_contents
                .borrow()
                .clone()
                .unwrap_or_else(|| vec![0; mem.depth as usize]);
            let mut restore = contents
                .into_iter()
                .enumerate()
                .map(|(address, value)| Statement::NonBlocking {
                    target: Expr::Index {
                        name: name.clone(),
                        index: Box::new(Expr::Constant {
                            bit_width: mem.address_bit_width,
                            value: address as u128,
                        }),
                    },
                    expr: Expr::Constant {
                        bit_width: mem.element_bit_width,
                        value,
                    },
                })
                .collect::<Vec<_>>();
            restore.extend(registered_read_port_names.into_iter().map(|read_port_name| {
                Statement::NonBlocking {
                    target: Expr::Ref {
                        name: read_port_name,
                    },
                    expr: Expr::Constant {
                        bit_width: mem.element_bit_width,
                        value: 0,
                    },
                }
            }));
            statements = vec![Statement::If {
                cond: self.compile_signal(clear)?,
                then: restore,
                otherwise: statements,
            }];
        }

        if !statements.is_empty() {
            always.push(AlwaysBlock { clock, statements });
        }

        Ok(())
    }

    /// Returns an expression for `signal`, generating temporaries for every operator it depends on.
    fn compile_signal(&mut self, signal: &'a graph::Signal<'a>) -> Result<Expr> {
        enum Frame<'a> {
            Enter(&'a graph::Signal<'a>),
            Leave(&'a graph::Signal<'a>),
        }

        let mut frames = vec![Frame::Enter(signal)];

        while let Some(frame) = frames.pop() {
            match frame {
                Frame::Enter(signal) => {
                    if self.signal_exprs.contains_key(&signal.id()) {
                        continue;
                    }

                    let operands = operands(signal);
                    if operands.is_empty() {
                        let expr = self.leaf_expr(signal)?;
                        self.signal_exprs.insert(signal.id(), expr);
                    } else {
                        frames.push(Frame::Leave(signal));
                        for operand in operands {
                            frames.push(Frame::Enter(operand));
                        }
                    }
                }
                Frame::Leave(signal) => {
                    let expr = self.operator_expr(signal);
                    self.signal_exprs.insert(signal.id(), expr);
                }
            }
        }

        Ok(self.signal_exprs[&signal.id()].clone())
    }

    fn leaf_expr(&self, signal: &'a graph::Signal<'a>) -> Result<Expr> {
        Ok(match signal.data {
            graph::SignalData::Lit { value, bit_width } => Expr::Constant { bit_width, value },

            graph::SignalData::Input { ref name, .. } => Expr::Ref { name: name.clone() },

            graph::SignalData::Reg { .. } => Expr::Ref {
                name: self.regs[&signal.id()].clone(),
            },
            graph::SignalData::Wire { .. } => Expr::Ref {
                name: self.wires[&signal.id()].clone(),
            },

            graph::SignalData::MemReadPort { mem, index } => Expr::Ref {
                name: self.mems[&mem].read_port_names[index].clone(),
            },

            graph::SignalData::InstanceOutput {
                instance, ref name, ..
            } => Expr::Ref {
                name: self.instances[&instance].output_names[name].clone(),
            },

            _ => {
                return Err(Error::InvalidWidth {
                    reason: format!(
                        "{} in circuit \"{}\" has no Verilog representation",
                        signal.describe(),
                        self.circuit.name()
                    ),
                })
            }
        })
    }

    /// Builds the expression for an operator whose operands are all compiled.
    fn operator_expr(&mut self, signal: &'a graph::Signal<'a>) -> Expr {
        let bit_width = signal.bit_width();
        let expr = match signal.data {
            graph::SignalData::Output { source, .. } => return self.expr_of(source),

            graph::SignalData::UnOp { source, op } => Expr::UnOp {
                source: Box::new(self.expr_of(source)),
                op: match op {
                    graph::UnOp::Not => UnOp::Not,
                },
            },
            graph::SignalData::BinOp { lhs, rhs, op, .. } => Expr::BinOp {
                lhs: Box::new(self.expr_of(lhs)),
                rhs: Box::new(self.expr_of(rhs)),
                op: match op {
                    graph::BinOp::Add => BinOp::Add,
                    graph::BinOp::BitAnd => BinOp::BitAnd,
                    graph::BinOp::BitOr => BinOp::BitOr,
                    graph::BinOp::BitXor => BinOp::BitXor,
                    graph::BinOp::Equal => BinOp::Equal,
                    graph::BinOp::NotEqual => BinOp::NotEqual,
                    graph::BinOp::LessThan => BinOp::LessThan,
                    graph::BinOp::LessThanEqual => BinOp::LessThanEqual,
                    graph::BinOp::GreaterThan => BinOp::GreaterThan,
                    graph::BinOp::GreaterThanEqual => BinOp::GreaterThanEqual,
                    graph::BinOp::Sub => BinOp::Sub,
                },
            },

            graph::SignalData::Bits {
                source,
                range_high,
                range_low,
            } => {
                let source_expr = self.expr_of(source);
                // Verilog doesn't allow indexing scalars or constants
                if source.bit_width() == 1 {
                    return source_expr;
                }
                match source_expr {
                    Expr::Constant { value, .. } => {
                        return Expr::Constant {
                            bit_width,
                            value: (value >> range_low) & graph::mask(bit_width),
                        }
                    }
                    source_expr => Expr::Bits {
                        source: Box::new(source_expr),
                        range_high,
                        range_low,
                    },
                }
            }

            graph::SignalData::Repeat { source, count } => Expr::Repeat {
                source: Box::new(self.expr_of(source)),
                count,
            },
            graph::SignalData::Concat { lhs, rhs } => Expr::Concat {
                lhs: Box::new(self.expr_of(lhs)),
                rhs: Box::new(self.expr_of(rhs)),
            },

            graph::SignalData::Mux {
                cond,
                when_true,
                when_false,
            } => Expr::Ternary {
                cond: Box::new(self.expr_of(cond)),
                when_true: Box::new(self.expr_of(when_true)),
                when_false: Box::new(self.expr_of(when_false)),
            },

            _ => unreachable!(),
        };
        self.assignments.gen_temp(expr, bit_width, &mut self.names)
    }

    fn expr_of(&self, signal: &'a graph::Signal<'a>) -> Expr {
        self.signal_exprs[&signal.id()].clone()
    }

    fn location(&self) -> Location {
        Location::new(self.circuit.name())
    }
}

fn operands<'a>(signal: &'a graph::Signal<'a>) -> Vec<&'a graph::Signal<'a>> {
    match signal.data {
        graph::SignalData::Output { source, .. }
        | graph::SignalData::UnOp { source, .. }
        | graph::SignalData::Bits { source, .. }
        | graph::SignalData::Repeat { source, .. } => vec![source],
        graph::SignalData::BinOp { lhs, rhs, .. } | graph::SignalData::Concat { lhs, rhs } => {
            vec![lhs, rhs]
        }
        graph::SignalData::Mux {
            cond,
            when_true,
            when_false,
        } => vec![cond, when_true, when_false],
        _ => Vec::new(),
    }
}

/// Legal base name for a register or wire, unique within its context by id.
fn local_name(signal: &graph::Signal) -> String {
    match signal.name() {
        Some(name) => legal_identifier(name),
        None => format!("__{}_{}", signal.data.kind_name(), signal.id().index()),
    }
}
