use super::context::*;
use super::signal::*;
use super::value::*;

use crate::error::{Error, Result};

use std::cell::{Cell, RefCell};
use std::hash::{Hash, Hasher};
use std::ptr;

/// How a memory read port presents its data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadPortKind {
    /// Data appears after the next clock edge. A write to the same address on that edge is not visible; the old contents are read.
    Registered,
    /// Like `Registered`, but a write to the same address on the same edge is passed through to the read data.
    WriteThrough,
    /// Data reflects the current contents of the memory combinationally.
    Combinational,
}

/// A synchronous memory, created by [`Context::mem`](crate::Context::mem).
///
/// A `Mem` has at most one write port and any number of read ports. Reads from addresses at or past the memory's depth return `0`, and writes to them are ignored.
///
/// An optional synchronous clear, set with [`clear_port`](Self::clear_port), restores the initial contents and zeroes registered read data. Clear dominates a write on the same edge.
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
/// let mem = c.mem("mem", 4, 32, clock)?;
/// mem.initial_contents(&[0xfadebabeu32, 0xdeadbeefu32, 0xabadcafeu32, 0xabad1deau32])?;
///
/// let read_data = mem.read_port(c.input("read_addr", 2)?, c.input("read_enable", 1)?)?;
/// mem.write_port(c.input("write_addr", 2)?, c.input("write_value", 32)?, c.input("write_enable", 1)?)?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct Mem<'a> {
    pub(super) context: &'a Context<'a>,

    pub(crate) name: String,
    pub(crate) depth: u32,
    pub(crate) address_bit_width: u32,
    pub(crate) element_bit_width: u32,
    pub(crate) clock: &'a Signal<'a>,

    pub(crate) initial_contents: RefCell<Option<Vec<u128>>>,

    pub(crate) read_ports: RefCell<Vec<ReadPort<'a>>>,
    pub(crate) write_port: RefCell<Option<WritePort<'a>>>,
    pub(crate) clear: RefCell<Option<&'a Signal<'a>>>,

    /// Set once a circuit containing this memory has been elaborated.
    pub(crate) elaborated: Cell<bool>,
}

#[derive(Clone, Copy)]
pub(crate) struct ReadPort<'a> {
    pub kind: ReadPortKind,
    pub address: &'a Signal<'a>,
    /// `None` for combinational ports, which have no enable.
    pub enable: Option<&'a Signal<'a>>,
}

#[derive(Clone, Copy)]
pub(crate) struct WritePort<'a> {
    pub address: &'a Signal<'a>,
    pub value: &'a Signal<'a>,
    pub enable: &'a Signal<'a>,
}

impl<'a> Mem<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn address_bit_width(&self) -> u32 {
        self.address_bit_width
    }

    pub fn element_bit_width(&self) -> u32 {
        self.element_bit_width
    }

    /// Specifies the contents of this memory after a reset.
    ///
    /// `contents` must have exactly `depth` elements. Without initial contents, every element starts as `0`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyDriven`] if initial contents were already given, [`Error::InvalidConfig`] if `contents` has the wrong length, and [`Error::InvalidWidth`] if an element doesn't fit.
    pub fn initial_contents<V: Clone + Into<Value>>(&self, contents: &[V]) -> Result<()> {
        self.check_not_elaborated()?;
        if self.initial_contents.borrow().is_some() {
            return Err(Error::AlreadyDriven {
                what: format!("initial contents of memory \"{}\"", self.name),
            });
        }
        if contents.len() != self.depth as usize {
            return Err(Error::InvalidConfig {
                reason: format!("Attempted to specify initial contents for memory \"{}\" that contains {} element(s), but this memory has a depth of {} element(s).", self.name, contents.len(), self.depth),
            });
        }
        let contents = contents
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, x)| {
                let value = x.into();
                if value.required_bits() > self.element_bit_width {
                    return Err(Error::InvalidWidth {
                        reason: format!("Attempted to specify initial contents for memory \"{}\", but this memory has an element width of {} bit(s), and these initial contents specify element {} with value {} which requires {} bit(s).", self.name, self.element_bit_width, i, value.numeric_value(), value.required_bits()),
                    });
                }
                Ok(value.numeric_value())
            })
            .collect::<Result<Vec<_>>>()?;
        *self.initial_contents.borrow_mut() = Some(contents);
        Ok(())
    }

    /// Adds a registered read port, whose data appears after the next clock edge where `enable` is high.
    ///
    /// The port holds its previous data while `enable` is low.
    pub fn read_port(
        &'a self,
        address: &'a Signal<'a>,
        enable: &'a Signal<'a>,
    ) -> Result<&'a Signal<'a>> {
        self.add_read_port(ReadPortKind::Registered, address, Some(enable))
    }

    /// Adds a registered read port that passes a same-edge write to the same address straight through.
    pub fn write_through_read_port(
        &'a self,
        address: &'a Signal<'a>,
        enable: &'a Signal<'a>,
    ) -> Result<&'a Signal<'a>> {
        self.add_read_port(ReadPortKind::WriteThrough, address, Some(enable))
    }

    /// Adds a combinational read port that always reflects the element at `address`.
    pub fn async_read_port(&'a self, address: &'a Signal<'a>) -> Result<&'a Signal<'a>> {
        self.add_read_port(ReadPortKind::Combinational, address, None)
    }

    fn add_read_port(
        &'a self,
        kind: ReadPortKind,
        address: &'a Signal<'a>,
        enable: Option<&'a Signal<'a>>,
    ) -> Result<&'a Signal<'a>> {
        self.check_not_elaborated()?;
        self.context.check_owns(address)?;
        self.check_address("read", address)?;
        if let Some(enable) = enable {
            self.context.check_owns(enable)?;
            self.check_enable("read", enable)?;
        }
        let mut read_ports = self.read_ports.borrow_mut();
        let index = read_ports.len();
        read_ports.push(ReadPort {
            kind,
            address,
            enable,
        });
        Ok(self
            .context
            .alloc_signal(SignalData::MemReadPort { mem: self, index }))
    }

    /// Sets this memory's write port. `value` is stored at `address` on every clock edge where `enable` is high.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyDriven`] if the memory already has a write port, and [`Error::InvalidWidth`] if any of the signals has the wrong width.
    pub fn write_port(
        &self,
        address: &'a Signal<'a>,
        value: &'a Signal<'a>,
        enable: &'a Signal<'a>,
    ) -> Result<()> {
        self.check_not_elaborated()?;
        for signal in [address, value, enable] {
            self.context.check_owns(signal)?;
        }
        if self.write_port.borrow().is_some() {
            return Err(Error::AlreadyDriven {
                what: format!("write port of memory \"{}\"", self.name),
            });
        }
        self.check_address("write", address)?;
        if value.bit_width() != self.element_bit_width {
            return Err(Error::InvalidWidth {
                reason: format!("Attempted to specify a write port for memory \"{}\" with a value signal with {} bit(s), but this memory has {} element bit(s).", self.name, value.bit_width(), self.element_bit_width),
            });
        }
        self.check_enable("write", enable)?;
        *self.write_port.borrow_mut() = Some(WritePort {
            address,
            value,
            enable,
        });
        Ok(())
    }

    /// Sets this memory's synchronous, active-high clear.
    ///
    /// On a clock edge where `clear` is high, every element returns to its initial contents (or `0`), registered read ports output `0`, and the write port is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyDriven`] if the memory already has a clear, and [`Error::InvalidWidth`] if `clear` isn't 1 bit wide.
    pub fn clear_port(&self, clear: &'a Signal<'a>) -> Result<()> {
        self.check_not_elaborated()?;
        self.context.check_owns(clear)?;
        if self.clear.borrow().is_some() {
            return Err(Error::AlreadyDriven {
                what: format!("clear of memory \"{}\"", self.name),
            });
        }
        if clear.bit_width() != 1 {
            return Err(Error::InvalidWidth {
                reason: format!("Attempted to specify a clear for memory \"{}\" with a signal with {} bit(s), but a memory clear is required to be 1 bit wide.", self.name, clear.bit_width()),
            });
        }
        *self.clear.borrow_mut() = Some(clear);
        Ok(())
    }

    fn check_not_elaborated(&self) -> Result<()> {
        if self.elaborated.get() {
            return Err(Error::Elaborated {
                what: format!("memory \"{}\"", self.name),
            });
        }
        Ok(())
    }

    fn check_address(&self, port: &str, address: &Signal<'a>) -> Result<()> {
        if address.bit_width() != self.address_bit_width {
            return Err(Error::InvalidWidth {
                reason: format!("Attempted to specify a {} port for memory \"{}\" with an address signal with {} bit(s), but this memory has {} address bit(s).", port, self.name, address.bit_width(), self.address_bit_width),
            });
        }
        Ok(())
    }

    fn check_enable(&self, port: &str, enable: &Signal<'a>) -> Result<()> {
        if enable.bit_width() != 1 {
            return Err(Error::InvalidWidth {
                reason: format!("Attempted to specify a {} port for memory \"{}\" with an enable signal with {} bit(s), but memory read/write ports are required to be 1 bit wide.", port, self.name, enable.bit_width()),
            });
        }
        Ok(())
    }
}

impl<'a> Eq for &'a Mem<'a> {}

impl<'a> Hash for &'a Mem<'a> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(*self as *const _ as usize)
    }
}

impl<'a> PartialEq for &'a Mem<'a> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(*self, *other)
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn initial_contents_already_specified_error() {
        let c = Context::new();

        let mem = c.mem("mem", 2, 1, c.high()).unwrap();

        mem.initial_contents(&[true, false]).unwrap();

        assert!(matches!(
            mem.initial_contents(&[true, false]),
            Err(Error::AlreadyDriven { .. })
        ));
    }

    #[test]
    fn initial_contents_length_error() {
        let c = Context::new();

        let mem = c.mem("mem", 2, 1, c.high()).unwrap();

        let err = mem.initial_contents(&[true, false, true]).err().unwrap();
        assert_eq!(err.to_string(), "invalid configuration: Attempted to specify initial contents for memory \"mem\" that contains 3 element(s), but this memory has a depth of 2 element(s).");
    }

    #[test]
    fn initial_contents_element_bit_width_error() {
        let c = Context::new();

        let mem = c.mem("mem", 2, 1, c.high()).unwrap();

        let err = mem.initial_contents(&[2u32, 0u32]).err().unwrap();
        assert_eq!(err.to_string(), "invalid width: Attempted to specify initial contents for memory \"mem\", but this memory has an element width of 1 bit(s), and these initial contents specify element 0 with value 2 which requires 2 bit(s).");
    }

    #[test]
    fn read_port_bit_width_errors() {
        let c = Context::new();

        let mem = c.mem("mem", 2, 1, c.high()).unwrap();

        assert!(matches!(
            mem.read_port(c.lit(0u32, 2).unwrap(), c.low()),
            Err(Error::InvalidWidth { .. })
        ));
        assert!(matches!(
            mem.read_port(c.low(), c.lit(0u32, 2).unwrap()),
            Err(Error::InvalidWidth { .. })
        ));
        assert!(matches!(
            mem.async_read_port(c.lit(0u32, 2).unwrap()),
            Err(Error::InvalidWidth { .. })
        ));
    }

    #[test]
    fn write_port_errors() {
        let c = Context::new();

        let mem = c.mem("mem", 2, 1, c.high()).unwrap();

        assert!(matches!(
            mem.write_port(c.lit(0u32, 2).unwrap(), c.low(), c.low()),
            Err(Error::InvalidWidth { .. })
        ));
        assert!(matches!(
            mem.write_port(c.low(), c.lit(0u32, 2).unwrap(), c.low()),
            Err(Error::InvalidWidth { .. })
        ));
        assert!(matches!(
            mem.write_port(c.low(), c.low(), c.lit(0u32, 2).unwrap()),
            Err(Error::InvalidWidth { .. })
        ));

        mem.write_port(c.low(), c.low(), c.low()).unwrap();
        let err = mem.write_port(c.low(), c.low(), c.low()).err().unwrap();
        assert_eq!(
            err.to_string(),
            "write port of memory \"mem\" is already driven"
        );
    }

    #[test]
    fn clear_port_errors() {
        let c = Context::new();

        let mem = c.mem("mem", 2, 8, c.high()).unwrap();

        assert!(matches!(
            mem.clear_port(c.lit(0u32, 2).unwrap()),
            Err(Error::InvalidWidth { .. })
        ));

        mem.clear_port(c.low()).unwrap();
        let err = mem.clear_port(c.high()).err().unwrap();
        assert_eq!(err.to_string(), "clear of memory \"mem\" is already driven");
    }

    #[test]
    fn elaborated_mem_is_frozen() {
        let c = Context::new();

        let clock = c.input("clock", 1).unwrap();
        let mem = c.mem("mem", 2, 8, clock).unwrap();
        mem.initial_contents(&[1u32, 2u32]).unwrap();
        let read_data = mem.async_read_port(c.input("addr", 1).unwrap()).unwrap();
        let _ = c.circuit("top", &[c.output("o", read_data).unwrap()]).unwrap();

        let err = mem.read_port(c.low(), c.high()).err().unwrap();
        assert_eq!(
            err.to_string(),
            "memory \"mem\" belongs to an elaborated circuit and can't be changed"
        );
        assert!(matches!(
            mem.write_port(c.low(), c.lit(0u32, 8).unwrap(), c.high()),
            Err(Error::Elaborated { .. })
        ));
        assert!(matches!(mem.clear_port(c.high()), Err(Error::Elaborated { .. })));
        assert!(matches!(
            mem.initial_contents(&[0u32, 0u32]),
            Err(Error::Elaborated { .. })
        ));
        assert_eq!(mem.read_ports.borrow().len(), 1);
        assert!(mem.write_port.borrow().is_none());
    }

    #[test]
    fn read_ports_are_numbered() {
        let c = Context::new();

        let mem = c.mem("mem", 2, 8, c.high()).unwrap();

        let _ = mem.read_port(c.low(), c.high()).unwrap();
        let _ = mem.async_read_port(c.high()).unwrap();

        let ports = mem.read_ports.borrow();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].kind, ReadPortKind::Registered);
        assert_eq!(ports[1].kind, ReadPortKind::Combinational);
        assert!(ports[1].enable.is_none());
    }
}
