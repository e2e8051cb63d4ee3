//! Error types shared by graph construction, elaboration, simulation and code generation.

use std::fmt;
use std::io;

/// Identifies where in a design hierarchy an error was found.
///
/// `circuit` is the name of the circuit being elaborated or compiled, and `path` is the sequence of instance names leading from that circuit to the one that failed.
/// An empty `path` means the error was found in `circuit` itself.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Location {
    pub circuit: String,
    pub path: Vec<String>,
}

impl Location {
    pub(crate) fn new(circuit: impl Into<String>) -> Location {
        Location {
            circuit: circuit.into(),
            path: Vec::new(),
        }
    }

    pub(crate) fn with_path(circuit: impl Into<String>, path: Vec<String>) -> Location {
        Location {
            circuit: circuit.into(),
            path,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "circuit \"{}\"", self.circuit)?;
        if !self.path.is_empty() {
            write!(f, " (at {})", self.path.join("/"))?;
        }
        Ok(())
    }
}

/// Errors that can occur while building, elaborating, simulating or emitting a design.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A signal would have an illegal bit width, or operand widths disagree.
    #[error("invalid width: {reason}")]
    InvalidWidth { reason: String },

    /// An interface record was bound to a port list with a different set of names.
    #[error(
        "interface fields do not match: expected ({}), found ({})",
        expected.join(", "),
        found.join(", ")
    )]
    FieldMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// Two or more ports of one circuit share a name.
    #[error("{location}: port names are not unique: ({})", names.join(", "))]
    DuplicatePortName { location: Location, names: Vec<String> },

    /// A port name is not a legal identifier in the emitted RTL.
    #[error("{location}: port name \"{name}\" is not a legal identifier (legal form: \"{legal}\")")]
    IllegalPortName {
        location: Location,
        name: String,
        legal: String,
    },

    /// A port name is a reserved keyword or is already used by an internal signal.
    #[error("{location}: port name \"{name}\" is reserved ({reason})")]
    ReservedPortName {
        location: Location,
        name: String,
        reason: String,
    },

    /// An instance input was never connected.
    #[error("{location}: input \"{port}\" of instance \"{instance}\" is not connected")]
    UnconnectedInstantiationPort {
        location: Location,
        instance: String,
        port: String,
    },

    /// A port resolves to a zero-width signal.
    #[error("{location}: port \"{name}\" resolves to a zero-width signal")]
    ZeroWidthPort { location: Location, name: String },

    /// Combinational logic depends on itself without passing through a register or memory.
    #[error("{location}: combinational cycle through ({})", signals.join(" -> "))]
    CombinationalCycle {
        location: Location,
        signals: Vec<String>,
    },

    /// A value written to a simulation cell doesn't fit the cell's width.
    #[error("value {value:#x} does not fit into \"{name}\", which has {bit_width} bit(s)")]
    WidthMismatch {
        name: String,
        bit_width: u32,
        value: u128,
    },

    /// A port was looked up by a name that doesn't exist.
    #[error("{location}: no port called \"{name}\"")]
    UnknownPort { location: Location, name: String },

    /// An element of a circuit's output list isn't an output port.
    #[error("{location}: output list element {index} is not an output port")]
    NotAnOutput { location: Location, index: usize },

    /// A register or wire reachable from the outputs has no driver.
    #[error("{location}: {kind} \"{name}\" is not driven")]
    Undriven {
        location: Location,
        kind: &'static str,
        name: String,
    },

    /// Two or more internal signals, memories or instances of one circuit share a name.
    #[error("{location}: internal names are not unique: ({})", names.join(", "))]
    DuplicateInternalName { location: Location, names: Vec<String> },

    /// A register or memory was changed after a circuit containing it was elaborated.
    #[error("{what} belongs to an elaborated circuit and can't be changed")]
    Elaborated { what: String },

    /// A simulation cell was used with a simulation other than the one that created it.
    #[error("cell \"{name}\" belongs to a different simulation")]
    ForeignCell { name: String },

    /// A one-shot driver slot was assigned twice.
    #[error("{what} is already driven")]
    AlreadyDriven { what: String },

    /// Signals from different contexts were combined.
    #[error("attempted to combine signals from different contexts")]
    ForeignSignal,

    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// An I/O error occurred while emitting code or writing a trace.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A specialized `Result` type for kiln operations.
pub type Result<T> = std::result::Result<T, Error>;
