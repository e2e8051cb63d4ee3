//! Verilog code generation.

mod compiler;
mod ir;

use compiler::*;

use crate::code_writer::CodeWriter;
use crate::error::{Error, Result};
use crate::graph;
use crate::validation::legal_identifier;

use std::collections::HashSet;
use std::io::Write;

/// Writes `circuit` and every circuit it instantiates as Verilog modules.
///
/// Each distinct circuit is written once, after the circuits it instantiates.
/// Ports keep their validated names; registers, memories, wires and instances are named after their graph names where those are free.
///
/// # Examples
///
/// ```
/// use kiln::*;
///
/// # fn main() -> kiln::Result<()> {
/// let c = Context::new();
///
/// let i = c.input("i", 1)?;
/// let o = c.output("o", i.not()?)?;
/// let inverter = c.circuit("inverter", &[o])?;
///
/// let mut buffer = Vec::new();
/// verilog::generate(inverter, &mut buffer)?;
/// assert!(String::from_utf8(buffer).unwrap().starts_with("module inverter("));
/// # Ok(())
/// # }
/// ```
pub fn generate<'a, W: Write>(circuit: &'a graph::Circuit<'a>, w: W) -> Result<()> {
    let mut w = CodeWriter::new(w);

    for circuit in hierarchy(circuit)? {
        let module = Compiler::new(circuit).compile()?;
        log::debug!(
            "emitting module \"{}\": {} port(s), {} instance(s)",
            module.name,
            module.ports.len(),
            module.instances.len()
        );
        module.write(&mut w)?;
    }

    Ok(())
}

/// Distinct circuits reachable from `root` through instances, children before parents.
fn hierarchy<'a>(root: &'a graph::Circuit<'a>) -> Result<Vec<&'a graph::Circuit<'a>>> {
    enum Frame<'a> {
        Enter(&'a graph::Circuit<'a>),
        Leave(&'a graph::Circuit<'a>),
    }

    let mut visited = HashSet::new();
    let mut module_names = HashSet::new();
    let mut order = Vec::new();

    let mut frames = vec![Frame::Enter(root)];
    while let Some(frame) = frames.pop() {
        match frame {
            Frame::Enter(circuit) => {
                if !visited.insert(circuit as *const graph::Circuit<'a>) {
                    continue;
                }
                frames.push(Frame::Leave(circuit));
                for instance in circuit.instances().iter().rev() {
                    frames.push(Frame::Enter(instance.circuit()));
                }
            }
            Frame::Leave(circuit) => {
                if !module_names.insert(legal_identifier(circuit.name())) {
                    return Err(Error::InvalidConfig {
                        reason: format!(
                            "more than one circuit would be emitted as module \"{}\"",
                            legal_identifier(circuit.name())
                        ),
                    });
                }
                order.push(circuit);
            }
        }
    }

    Ok(order)
}
