//! A circuit graph, validator and cycle-accurate simulator for synchronous digital hardware.
//!
//! kiln provides an API to describe [`Circuit`]s composed of [`Signal`]s, which can then be [simulated](sim::Simulation) cycle by cycle or written out as [Verilog modules](verilog::generate).
//!
//! Graphs are built in a [`Context`], which owns every signal, register, memory and instance.
//! Builders check widths as they go, and [`Context::circuit`] elaborates a list of outputs into an immutable circuit, rejecting port names that wouldn't survive RTL emission and instances with unconnected inputs.
//! Errors are returned as [`Error`] values rather than panics, so a design can be fixed and rebuilt.
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! kiln = "0.1"
//! ```
//!
//! # Examples
//!
//! ```rust
//! # fn main() -> kiln::Result<()> {
//! use kiln::*;
//!
//! // Create a context, which will contain our circuit(s)
//! let c = Context::new();
//!
//! // Describe an inverter
//! let i = c.input("i", 1)?; // 1-bit input
//! let o = c.output("o", i.not()?)?; // Output inverted input
//! let inverter = c.circuit("inverter", &[o])?;
//!
//! // Simulate it
//! let mut sim = Simulation::new(inverter)?;
//! sim.set_input("i", true)?;
//! sim.prop();
//! assert_eq!(sim.output("o")?, 0);
//!
//! // Generate verilog code
//! verilog::generate(inverter, std::io::stdout())?;
//! # Ok(())
//! # }
//! ```
//!
//! Reusable parts are described with [`interface!`] records, and [`fifo`] shows a complete parameterized component built this way.

// Must be kept up-to-date with version in Cargo.toml
#![doc(html_root_url = "https://docs.rs/kiln/0.1.0")]

mod code_writer;
mod error;
mod graph;
mod validation;

pub mod fifo;
pub mod runtime;
pub mod sim;
pub mod verilog;

pub use error::*;
pub use graph::*;
pub use sim::{InputCell, OutputCell, Simulation};
pub use validation::legal_identifier;
