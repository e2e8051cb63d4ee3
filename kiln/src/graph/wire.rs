use super::signal::*;

use crate::error::{Error, Result};

use std::cell::RefCell;

/// A forward-declared signal, created by [`Context::wire`](crate::Context::wire) or [`Context::named_wire`](crate::Context::named_wire).
///
/// `value` can be used before the wire is driven, which makes wires the only way to build feedback in a graph.
/// Feedback that doesn't pass through a [`Register`](crate::Register) or a registered memory read is a combinational cycle, and is rejected when the circuit is simulated.
///
/// # Examples
///
/// ```
/// use kiln::*;
///
/// # fn main() -> kiln::Result<()> {
/// let c = Context::new();
///
/// let w = c.named_wire("sum", 8)?;
/// let o = c.output("o", w.value)?;
/// w.drive(c.input("a", 8)?.add(c.input("b", 8)?)?)?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct Wire<'a> {
    pub(crate) data: &'a WireData<'a>,
    pub value: &'a Signal<'a>,
}

impl<'a> Wire<'a> {
    /// Connects `source` to this wire.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyDriven`] if the wire already has a driver, and [`Error::InvalidWidth`] on a width mismatch.
    pub fn drive(&self, source: &'a Signal<'a>) -> Result<()> {
        self.value.check_same_context(source)?;
        if source.bit_width() != self.data.bit_width {
            return Err(Error::InvalidWidth {
                reason: format!(
                    "Attempted to drive wire \"{}\" with a signal that has {} bit(s), but the wire has {} bit(s).",
                    self.value.describe(),
                    source.bit_width(),
                    self.data.bit_width
                ),
            });
        }
        let mut driver = self.data.driver.borrow_mut();
        if driver.is_some() {
            return Err(Error::AlreadyDriven {
                what: format!("wire \"{}\"", self.value.describe()),
            });
        }
        *driver = Some(source);
        Ok(())
    }
}

pub(crate) struct WireData<'a> {
    pub name: Option<String>,
    pub bit_width: u32,
    pub driver: RefCell<Option<&'a Signal<'a>>>,
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn drive_twice_error() {
        let c = Context::new();

        let w = c.named_wire("w", 1).unwrap();
        w.drive(c.high()).unwrap();

        let err = w.drive(c.low()).err().unwrap();
        assert_eq!(err.to_string(), "wire \"w\" is already driven");
    }

    #[test]
    fn drive_width_error() {
        let c = Context::new();

        let w = c.wire(2).unwrap();

        assert!(matches!(w.drive(c.high()), Err(Error::InvalidWidth { .. })));
    }
}
