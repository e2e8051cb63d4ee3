use super::circuit::*;
use super::context::*;
use super::signal::*;

use crate::error::{Error, Location, Result};

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::ptr;

/// A named instantiation of an elaborated [`Circuit`] inside another graph, created by [`Context::instance`](crate::Context::instance).
///
/// Inputs are connected by name with [`drive_input`](Self::drive_input), and outputs are read by name with [`output`](Self::output).
///
/// # Examples
///
/// ```
/// use kiln::*;
///
/// # fn main() -> kiln::Result<()> {
/// let c = Context::new();
///
/// let i = c.input("i", 8)?;
/// let o = c.output("o", i.not()?)?;
/// let inverter = c.circuit("inverter", &[o])?;
///
/// let inst = c.instance("inverter_inst", inverter)?;
/// inst.drive_input("i", c.input("outer_i", 8)?)?;
/// let outer_o = c.output("outer_o", inst.output("o")?)?;
/// let outer = c.circuit("outer", &[outer_o])?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct Instance<'a> {
    pub(super) context: &'a Context<'a>,

    pub(crate) circuit: &'a Circuit<'a>,
    pub(crate) name: String,
    pub(crate) driven_inputs: RefCell<BTreeMap<String, &'a Signal<'a>>>,
    pub(super) outputs: RefCell<BTreeMap<String, &'a Signal<'a>>>,
}

impl<'a> Instance<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The circuit this is an instance of.
    pub fn circuit(&self) -> &'a Circuit<'a> {
        self.circuit
    }

    /// Connects the instantiated circuit's input called `name` to `source`.
    ///
    /// The zero-width sentinel is accepted here and reported as [`Error::ZeroWidthPort`] when the enclosing circuit is elaborated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPort`] if the circuit has no such input, [`Error::AlreadyDriven`] if the input is already connected, and [`Error::InvalidWidth`] on a width mismatch.
    pub fn drive_input(&self, name: impl Into<String>, source: &'a Signal<'a>) -> Result<()> {
        let name = name.into();
        self.context.check_owns(source)?;
        let input = self.circuit.input(&name).ok_or_else(|| Error::UnknownPort {
            location: Location::new(self.circuit.name()),
            name: name.clone(),
        })?;
        let mut driven_inputs = self.driven_inputs.borrow_mut();
        if driven_inputs.contains_key(&name) {
            return Err(Error::AlreadyDriven {
                what: format!("input \"{}\" of instance \"{}\"", name, self.name),
            });
        }
        if !source.is_empty() && input.bit_width() != source.bit_width() {
            return Err(Error::InvalidWidth {
                reason: format!("Attempted to drive an input called \"{}\" on an instance of \"{}\", but this input and the provided signal have different bit widths ({} and {}, respectively).", name, self.circuit.name(), input.bit_width(), source.bit_width()),
            });
        }
        driven_inputs.insert(name, source);
        Ok(())
    }

    /// Returns the signal carrying the instantiated circuit's output called `name`.
    ///
    /// Asking for the same output twice returns the same signal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPort`] if the circuit has no such output.
    pub fn output(&'a self, name: impl Into<String>) -> Result<&'a Signal<'a>> {
        let name = name.into();
        if let Some(signal) = self.outputs.borrow().get(&name) {
            return Ok(*signal);
        }
        let output = self
            .circuit
            .output(&name)
            .ok_or_else(|| Error::UnknownPort {
                location: Location::new(self.circuit.name()),
                name: name.clone(),
            })?;
        let signal = self.context.alloc_signal(SignalData::InstanceOutput {
            instance: self,
            name: name.clone(),
            bit_width: output.bit_width(),
        });
        self.outputs.borrow_mut().insert(name, signal);
        Ok(signal)
    }
}

impl<'a> Eq for &'a Instance<'a> {}

impl<'a> Hash for &'a Instance<'a> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(*self as *const _ as usize)
    }
}

impl<'a> PartialEq for &'a Instance<'a> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(*self, *other)
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    fn inner<'a>(c: &'a Context<'a>) -> &'a Circuit<'a> {
        let a = c.input("a", 1).unwrap();
        let o = c.output("o", a).unwrap();
        c.circuit("Inner", &[o]).unwrap()
    }

    #[test]
    fn drive_input_nonexistent_input_error() {
        let c = Context::new();

        let inner_inst = c.instance("inner_inst", inner(&c)).unwrap();

        let err = inner_inst
            .drive_input("nope", c.input("i", 1).unwrap())
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "circuit \"Inner\": no port called \"nope\"");
    }

    #[test]
    fn drive_input_already_driven_error() {
        let c = Context::new();

        let inner_inst = c.instance("inner_inst", inner(&c)).unwrap();

        inner_inst.drive_input("a", c.input("i1", 1).unwrap()).unwrap();

        let err = inner_inst
            .drive_input("a", c.input("i2", 1).unwrap())
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "input \"a\" of instance \"inner_inst\" is already driven"
        );
    }

    #[test]
    fn drive_input_incompatible_bit_widths_error() {
        let c = Context::new();

        let inner_inst = c.instance("inner_inst", inner(&c)).unwrap();

        let err = inner_inst
            .drive_input("a", c.input("i1", 32).unwrap())
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "invalid width: Attempted to drive an input called \"a\" on an instance of \"Inner\", but this input and the provided signal have different bit widths (1 and 32, respectively).");
    }

    #[test]
    fn drive_input_empty_is_deferred() {
        let c = Context::new();

        let inner_inst = c.instance("inner_inst", inner(&c)).unwrap();

        assert!(inner_inst.drive_input("a", c.empty()).is_ok());
    }

    #[test]
    fn output_nonexistent_output_error() {
        let c = Context::new();

        let inner_inst = c.instance("inner_inst", inner(&c)).unwrap();

        assert!(matches!(
            inner_inst.output("nope"),
            Err(Error::UnknownPort { .. })
        ));
    }

    #[test]
    fn output_is_memoized() {
        let c = Context::new();

        let inner_inst = c.instance("inner_inst", inner(&c)).unwrap();

        let a = inner_inst.output("o").unwrap();
        let b = inner_inst.output("o").unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.bit_width(), 1);
    }
}
