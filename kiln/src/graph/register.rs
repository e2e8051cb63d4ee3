use super::signal::*;
use super::value::*;

use crate::error::{Error, Result};

use std::cell::{Cell, RefCell};

/// Clock and clear connections for a [`Register`].
///
/// Both signals must be 1 bit wide. A register without a clear is only reset by [`Simulation::reset`](crate::Simulation::reset).
#[derive(Clone, Copy)]
pub struct RegSpec<'a> {
    pub clock: &'a Signal<'a>,
    pub clear: Option<&'a Signal<'a>>,
}

impl<'a> RegSpec<'a> {
    pub fn new(clock: &'a Signal<'a>) -> RegSpec<'a> {
        RegSpec { clock, clear: None }
    }

    /// Adds a synchronous, active-high clear that loads the register's default value on the next clock edge.
    pub fn with_clear(self, clear: &'a Signal<'a>) -> RegSpec<'a> {
        RegSpec {
            clear: Some(clear),
            ..self
        }
    }
}

/// A hardware register, created by [`Context::reg`](crate::Context::reg).
///
/// `value` is the register's current value, which can be used like any other [`Signal`]. The value on the next clock edge is set with [`drive_next`](Self::drive_next).
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
/// let toggle = c.reg("toggle", 1, RegSpec::new(clock))?;
/// toggle.default_value(true)?;
/// toggle.drive_next(toggle.value.not()?)?;
///
/// let o = c.output("o", toggle.value)?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct Register<'a> {
    pub(crate) data: &'a RegisterData<'a>,
    /// This register's current value.
    pub value: &'a Signal<'a>,
}

impl<'a> Register<'a> {
    /// Sets the value this register holds after a reset or a clear.
    ///
    /// Defaults to `0`. Calling this again replaces the previous default, until a circuit containing this register is elaborated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if `value` doesn't fit in the register, and [`Error::Elaborated`] if the register is part of an elaborated circuit.
    pub fn default_value(&self, value: impl Into<Value>) -> Result<()> {
        self.data.check_not_elaborated()?;
        let value = value.into();
        if value.required_bits() > self.data.bit_width {
            return Err(Error::InvalidWidth {
                reason: format!("Cannot use {} as the default value of register \"{}\", which has {} bit(s). The value requires at least {} bit(s).", value.numeric_value(), self.data.name, self.data.bit_width, value.required_bits()),
            });
        }
        self.data.default_value.set(value.numeric_value());
        Ok(())
    }

    /// Sets the signal this register loads on every clock edge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyDriven`] if called more than once, [`Error::InvalidWidth`] if `next` doesn't have the register's bit width, and [`Error::ForeignSignal`] if `next` belongs to another context.
    pub fn drive_next(&self, next: &'a Signal<'a>) -> Result<()> {
        self.data.check_not_elaborated()?;
        self.value.check_same_context(next)?;
        if next.bit_width() != self.data.bit_width {
            return Err(Error::InvalidWidth {
                reason: format!("Attempted to drive register \"{}\" with a signal that has {} bit(s), but the register has {} bit(s).", self.data.name, next.bit_width(), self.data.bit_width),
            });
        }
        let mut driver = self.data.next.borrow_mut();
        if driver.is_some() {
            return Err(Error::AlreadyDriven {
                what: format!("register \"{}\"", self.data.name),
            });
        }
        *driver = Some(next);
        Ok(())
    }
}

pub(crate) struct RegisterData<'a> {
    pub name: String,
    pub bit_width: u32,
    pub clock: &'a Signal<'a>,
    pub clear: Option<&'a Signal<'a>>,
    pub default_value: Cell<u128>,
    pub next: RefCell<Option<&'a Signal<'a>>>,
    /// Set once a circuit containing this register has been elaborated.
    pub elaborated: Cell<bool>,
}

impl<'a> RegisterData<'a> {
    fn check_not_elaborated(&self) -> Result<()> {
        if self.elaborated.get() {
            return Err(Error::Elaborated {
                what: format!("register \"{}\"", self.name),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn drive_next_twice_error() {
        let c = Context::new();

        let r = c.reg("r", 1, RegSpec::new(c.high())).unwrap();
        r.drive_next(c.low()).unwrap();

        let err = r.drive_next(c.high()).err().unwrap();
        assert_eq!(err.to_string(), "register \"r\" is already driven");
    }

    #[test]
    fn drive_next_width_error() {
        let c = Context::new();

        let r = c.reg("r", 4, RegSpec::new(c.high())).unwrap();

        assert!(matches!(
            r.drive_next(c.low()),
            Err(Error::InvalidWidth { .. })
        ));
    }

    #[test]
    fn default_value_too_wide_error() {
        let c = Context::new();

        let r = c.reg("r", 3, RegSpec::new(c.high())).unwrap();

        assert!(r.default_value(7u32).is_ok());
        assert!(matches!(
            r.default_value(8u32),
            Err(Error::InvalidWidth { .. })
        ));
    }

    #[test]
    fn elaborated_register_is_frozen() {
        let c = Context::new();

        let r = c.reg("r", 4, RegSpec::new(c.input("clock", 1).unwrap())).unwrap();
        r.default_value(3u32).unwrap();
        r.drive_next(r.value).unwrap();
        let _ = c.circuit("top", &[c.output("o", r.value).unwrap()]).unwrap();

        let err = r.default_value(5u32).err().unwrap();
        assert_eq!(
            err.to_string(),
            "register \"r\" belongs to an elaborated circuit and can't be changed"
        );
        assert!(matches!(
            r.drive_next(r.value),
            Err(Error::Elaborated { .. })
        ));
        assert_eq!(r.data.default_value.get(), 3);
    }
}
