//! Cycle-accurate simulation of elaborated circuits.

mod compiler;
mod ir;
mod module_context;
mod state_elements;

use compiler::*;
use ir::*;
use state_elements::*;

use crate::error::{Error, Location, Result};
use crate::graph::{self, Interface, Value};

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SIMULATION_ID: AtomicU64 = AtomicU64::new(0);

/// A handle to one of a [`Simulation`]'s input ports, obtained with [`Simulation::input_cell`] or [`Simulation::inputs`].
///
/// A cell is only valid for the simulation that created it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InputCell {
    simulation: u64,
    index: usize,
    bit_width: u32,
}

impl InputCell {
    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }
}

/// A read-only handle to a value in a [`Simulation`]: an output port, or a named internal signal.
///
/// Like [`InputCell`], an output cell is only meaningful for the simulation that created it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OutputCell {
    node: NodeIndex,
    bit_width: u32,
}

impl OutputCell {
    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }
}

struct InputPort {
    name: String,
    bit_width: u32,
}

/// A compiled, running instance of a [`Circuit`](graph::Circuit).
///
/// A `Simulation` owns all of its state and doesn't borrow the graph it was compiled from.
/// Inputs are changed with [`set`](Self::set), combinational logic is settled with [`prop`](Self::prop), and registers and memories advance with [`posedge_clk`](Self::posedge_clk).
/// All registers share one clock domain and advance on every edge; the clock signal given to a register only matters for RTL output.
///
/// # Examples
///
/// ```
/// use kiln::*;
///
/// # fn main() -> kiln::Result<()> {
/// let c = Context::new();
///
/// let clock = c.input("clock", 1)?;
/// let enable = c.input("enable", 1)?;
/// let count = c.reg("count", 4, RegSpec::new(clock))?;
/// count.drive_next(c.mux(enable, count.value.add(c.lit(1u32, 4)?)?, count.value)?)?;
/// let o = c.output("o", count.value)?;
/// let counter = c.circuit("counter", &[o])?;
///
/// let mut sim = Simulation::new(counter)?;
/// sim.set_input("enable", true)?;
/// for _ in 0..3 {
///     sim.step();
/// }
/// assert_eq!(sim.output("o")?, 3);
/// # Ok(())
/// # }
/// ```
pub struct Simulation {
    id: u64,
    name: String,

    nodes: Vec<Node>,
    values: Vec<u128>,

    inputs: Vec<InputPort>,
    input_values: Vec<u128>,
    outputs: Vec<CompiledPort>,
    internals: Vec<CompiledPort>,

    registers: Vec<RegisterState>,
    mems: Vec<MemState>,
    state: StateValues,

    cycle: u64,
}

impl Simulation {
    /// Flattens `circuit`'s instance hierarchy and schedules it for simulation.
    ///
    /// Every register starts at its default value and every memory at its initial contents, and combinational logic is settled before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CombinationalCycle`] if any signal depends on itself without passing through a register or a registered memory read.
    pub fn new<'a>(circuit: &'a graph::Circuit<'a>) -> Result<Simulation> {
        let program = Compiler::new(circuit).compile()?;

        log::debug!(
            "compiled circuit \"{}\": {} node(s), {} register(s), {} memory(s), {} instance context(s)",
            circuit.name(),
            program.nodes.len(),
            program.registers.len(),
            program.mems.len(),
            program.context_count
        );

        let state = StateValues::new(&program.registers, &program.mems);
        let mut sim = Simulation {
            id: NEXT_SIMULATION_ID.fetch_add(1, Ordering::Relaxed),
            name: circuit.name().to_string(),

            values: vec![0; program.nodes.len()],
            nodes: program.nodes,

            input_values: vec![0; program.inputs.len()],
            inputs: program
                .inputs
                .into_iter()
                .map(|(name, bit_width)| InputPort { name, bit_width })
                .collect(),
            outputs: program.outputs,
            internals: program.internals,

            registers: program.registers,
            mems: program.mems,
            state,

            cycle: 0,
        };
        sim.prop();
        Ok(sim)
    }

    /// Name of the simulated circuit.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_cell(&self, name: &str) -> Result<InputCell> {
        self.inputs
            .iter()
            .position(|input| input.name == name)
            .map(|index| InputCell {
                simulation: self.id,
                index,
                bit_width: self.inputs[index].bit_width,
            })
            .ok_or_else(|| self.unknown_port(name))
    }

    pub fn output_cell(&self, name: &str) -> Result<OutputCell> {
        find_cell(&self.outputs, name).ok_or_else(|| self.unknown_port(name))
    }

    /// Looks up a register or named wire by name.
    ///
    /// Signals inside instances are qualified with their instance path, eg. `"inner_inst.count"`.
    pub fn internal_cell(&self, name: &str) -> Result<OutputCell> {
        find_cell(&self.internals, name).ok_or_else(|| self.unknown_port(name))
    }

    /// Binds every input port to a field of the interface record `I`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldMismatch`] unless the circuit's inputs are exactly `I`'s fields.
    pub fn inputs<I: Interface<InputCell>>(&self) -> Result<I> {
        I::of_port_list(
            self.inputs
                .iter()
                .enumerate()
                .map(|(index, input)| {
                    (
                        input.name.clone(),
                        InputCell {
                            simulation: self.id,
                            index,
                            bit_width: input.bit_width,
                        },
                    )
                })
                .collect(),
        )
    }

    /// Binds every output port to a field of the interface record `I`.
    pub fn outputs<I: Interface<OutputCell>>(&self) -> Result<I> {
        I::of_port_list(
            self.outputs
                .iter()
                .map(|output| (output.name.clone(), cell(output)))
                .collect(),
        )
    }

    /// Sets the value of an input port. The new value is visible after the next [`prop`](Self::prop).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignCell`] if `cell` was created by another simulation, and [`Error::WidthMismatch`] if `value` doesn't fit in the port.
    pub fn set(&mut self, cell: InputCell, value: impl Into<Value>) -> Result<()> {
        if cell.simulation != self.id {
            return Err(Error::ForeignCell {
                name: format!("input #{}", cell.index),
            });
        }
        let value = value.into();
        let input = self
            .inputs
            .get(cell.index)
            .ok_or_else(|| self.unknown_port(&format!("#{}", cell.index)))?;
        if value.required_bits() > input.bit_width {
            return Err(Error::WidthMismatch {
                name: input.name.clone(),
                bit_width: input.bit_width,
                value: value.numeric_value(),
            });
        }
        self.input_values[cell.index] = value.numeric_value();
        Ok(())
    }

    /// Returns the value of `cell` as of the last [`prop`](Self::prop).
    ///
    /// `cell` must come from this simulation; a cell from another simulation reads an unrelated node, or `0`.
    pub fn get(&self, cell: OutputCell) -> u128 {
        self.values.get(cell.node).copied().unwrap_or(0)
    }

    /// Convenience wrapper for [`input_cell`](Self::input_cell) followed by [`set`](Self::set).
    pub fn set_input(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let cell = self.input_cell(name)?;
        self.set(cell, value)
    }

    /// Convenience wrapper for [`output_cell`](Self::output_cell) followed by [`get`](Self::get).
    pub fn output(&self, name: &str) -> Result<u128> {
        Ok(self.get(self.output_cell(name)?))
    }

    /// Settles all combinational logic from the current inputs and state.
    pub fn prop(&mut self) {
        let sources = Sources {
            inputs: &self.input_values,
            registers: &self.state.registers,
            mem_read_data: &self.state.mem_read_data,
            mem_contents: &self.state.mem_contents,
        };
        for (index, node) in self.nodes.iter().enumerate() {
            let value = node.eval(&self.values, &sources);
            self.values[index] = value;
        }
    }

    /// Performs one rising clock edge using the values from the last [`prop`](Self::prop).
    pub fn posedge_clk(&mut self) {
        self.state
            .posedge_clk(&self.registers, &self.mems, &self.values);
        self.cycle += 1;

        if log::log_enabled!(log::Level::Trace) {
            for (register, value) in self.registers.iter().zip(self.state.registers.iter()) {
                log::trace!(
                    "{} cycle {}: {} = {:#x}",
                    self.name,
                    self.cycle,
                    register.name,
                    value
                );
            }
        }
    }

    /// One full clock cycle: [`prop`](Self::prop), [`posedge_clk`](Self::posedge_clk), then [`prop`](Self::prop) again.
    pub fn step(&mut self) {
        self.prop();
        self.posedge_clk();
        self.prop();
    }

    /// Restores every register to its default value and every memory to its initial contents, then settles combinational logic.
    ///
    /// Input values and the cycle count are kept.
    pub fn reset(&mut self) {
        log::debug!("resetting \"{}\" at cycle {}", self.name, self.cycle);
        self.state.reset(&self.registers, &self.mems);
        self.prop();
    }

    /// Number of clock edges performed so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Name, bit width and current value of every input, output and named internal signal, in that order.
    pub fn tracked(&self) -> Vec<(&str, u32, u128)> {
        let inputs = self
            .inputs
            .iter()
            .zip(self.input_values.iter())
            .map(|(input, &value)| (input.name.as_str(), input.bit_width, value));
        let others = self
            .outputs
            .iter()
            .chain(self.internals.iter())
            .map(|port| (port.name.as_str(), port.bit_width, self.get(cell(port))));
        inputs.chain(others).collect()
    }

    /// Current contents of the memory called `name`, if it exists.
    ///
    /// Memories inside instances are qualified with their instance path.
    pub fn mem_contents(&self, name: &str) -> Option<&[u128]> {
        self.mems
            .iter()
            .position(|mem| mem.name == name)
            .map(|index| self.state.mem_contents[index].as_slice())
    }

    fn unknown_port(&self, name: &str) -> Error {
        Error::UnknownPort {
            location: Location::new(self.name.as_str()),
            name: name.to_string(),
        }
    }
}

fn cell(port: &CompiledPort) -> OutputCell {
    OutputCell {
        node: port.node,
        bit_width: port.bit_width,
    }
}

fn find_cell(ports: &[CompiledPort], name: &str) -> Option<OutputCell> {
    ports.iter().find(|port| port.name == name).map(cell)
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn inverter() {
        let c = Context::new();

        let i = c.input("i", 1).unwrap();
        let o = c.output("o", i.not().unwrap()).unwrap();
        let circuit = c.circuit("inverter", &[o]).unwrap();

        let mut sim = Simulation::new(circuit).unwrap();
        assert_eq!(sim.output("o").unwrap(), 1);

        sim.set_input("i", true).unwrap();
        sim.prop();
        assert_eq!(sim.output("o").unwrap(), 0);
    }

    #[test]
    fn width_mismatch_error() {
        let c = Context::new();

        let i = c.input("i", 4).unwrap();
        let o = c.output("o", i).unwrap();
        let circuit = c.circuit("top", &[o]).unwrap();

        let mut sim = Simulation::new(circuit).unwrap();
        let cell = sim.input_cell("i").unwrap();

        assert!(sim.set(cell, 0xfu32).is_ok());
        let err = sim.set(cell, 0x1fu32).err().unwrap();
        assert_eq!(
            err.to_string(),
            "value 0x1f does not fit into \"i\", which has 4 bit(s)"
        );
    }

    #[test]
    fn unknown_port_errors() {
        let c = Context::new();

        let o = c.output("o", c.high()).unwrap();
        let circuit = c.circuit("top", &[o]).unwrap();

        let sim = Simulation::new(circuit).unwrap();

        assert!(matches!(
            sim.input_cell("nope"),
            Err(Error::UnknownPort { .. })
        ));
        assert!(matches!(sim.output("nope"), Err(Error::UnknownPort { .. })));
        assert!(matches!(
            sim.internal_cell("nope"),
            Err(Error::UnknownPort { .. })
        ));
    }

    #[test]
    fn foreign_input_cell_error() {
        let c = Context::new();

        let i = c.input("i", 4).unwrap();
        let o = c.output("o", i).unwrap();
        let circuit = c.circuit("top", &[o]).unwrap();

        let mut a = Simulation::new(circuit).unwrap();
        let mut b = Simulation::new(circuit).unwrap();
        let cell = a.input_cell("i").unwrap();

        let err = b.set(cell, 3u32).err().unwrap();
        assert_eq!(
            err.to_string(),
            "cell \"input #0\" belongs to a different simulation"
        );
        b.prop();
        assert_eq!(b.output("o").unwrap(), 0);

        a.set(cell, 3u32).unwrap();
        a.prop();
        assert_eq!(a.output("o").unwrap(), 3);
    }

    #[test]
    fn simulations_of_one_circuit_agree() {
        let c = Context::new();

        let clock = c.input("clock", 1).unwrap();
        let address = c.input("address", 1).unwrap();
        let r = c.reg("r", 4, RegSpec::new(clock)).unwrap();
        r.default_value(9u32).unwrap();
        r.drive_next(r.value).unwrap();
        let mem = c.mem("mem", 2, 4, clock).unwrap();
        mem.initial_contents(&[1u32, 2]).unwrap();
        let read_data = mem.async_read_port(address).unwrap();
        let circuit = c
            .circuit(
                "top",
                &[
                    c.output("r_o", r.value).unwrap(),
                    c.output("mem_o", read_data).unwrap(),
                ],
            )
            .unwrap();
        let mut first = Simulation::new(circuit).unwrap();

        assert!(r.default_value(3u32).is_err());
        assert!(mem.read_port(address, c.high()).is_err());
        assert!(mem.write_port(address, r.value, c.high()).is_err());

        let mut second = Simulation::new(circuit).unwrap();
        for sim in [&mut first, &mut second] {
            sim.set_input("address", true).unwrap();
            sim.step();
            assert_eq!(sim.output("r_o").unwrap(), 9);
            assert_eq!(sim.output("mem_o").unwrap(), 2);
        }
        assert_eq!(first.tracked(), second.tracked());
    }

    #[test]
    fn combinational_cycle_error() {
        let c = Context::new();

        let w = c.named_wire("loop", 1).unwrap();
        w.drive(w.value.not().unwrap()).unwrap();
        let o = c.output("o", w.value).unwrap();
        let circuit = c.circuit("top", &[o]).unwrap();

        match Simulation::new(circuit) {
            Err(Error::CombinationalCycle { location, signals }) => {
                assert_eq!(location.circuit, "top");
                assert!(location.path.is_empty());
                assert_eq!(signals.len(), 2);
                assert_eq!(signals[0], "loop");
            }
            _ => panic!("expected a combinational cycle error"),
        }
    }

    #[test]
    fn feedback_through_register_is_not_a_cycle() {
        let c = Context::new();

        let clock = c.input("clock", 1).unwrap();
        let w = c.wire(1).unwrap();
        let r = c.reg("r", 1, RegSpec::new(clock)).unwrap();
        r.drive_next(w.value).unwrap();
        w.drive(r.value.not().unwrap()).unwrap();
        let o = c.output("o", r.value).unwrap();
        let circuit = c.circuit("top", &[o]).unwrap();

        let mut sim = Simulation::new(circuit).unwrap();
        assert_eq!(sim.output("o").unwrap(), 0);
        sim.step();
        assert_eq!(sim.output("o").unwrap(), 1);
        sim.step();
        assert_eq!(sim.output("o").unwrap(), 0);
        assert_eq!(sim.cycle(), 2);
    }

    #[test]
    fn tracked_lists_ports_and_internals() {
        let c = Context::new();

        let clock = c.input("clock", 1).unwrap();
        let r = c.reg("r", 3, RegSpec::new(clock)).unwrap();
        r.default_value(5u32).unwrap();
        r.drive_next(r.value).unwrap();
        let o = c.output("o", r.value).unwrap();
        let circuit = c.circuit("top", &[o]).unwrap();

        let sim = Simulation::new(circuit).unwrap();

        assert_eq!(
            sim.tracked(),
            vec![("clock", 1, 0), ("o", 3, 5), ("r", 3, 5)]
        );
    }
}
