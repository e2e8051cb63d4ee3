use super::circuit::*;
use super::instance::*;
use super::interface::*;
use super::mem::*;
use super::register::*;
use super::signal::*;
use super::value::*;
use super::wire::*;

use crate::error::{Error, Result};
use crate::validation;

use typed_arena::Arena;

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::BTreeMap;
use std::ptr;

/// A top-level container/owner object for a signal graph.
///
/// A `Context` owns every node of a graph (signals, registers, wires, memories, instances and elaborated [`Circuit`]s), and provides the API for creating them.
/// Everything allocated in a `Context` lives exactly as long as the `Context` itself.
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
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct Context<'a> {
    signal_arena: Arena<Signal<'a>>,
    register_data_arena: Arena<RegisterData<'a>>,
    register_arena: Arena<Register<'a>>,
    wire_data_arena: Arena<WireData<'a>>,
    wire_arena: Arena<Wire<'a>>,
    mem_arena: Arena<Mem<'a>>,
    instance_arena: Arena<Instance<'a>>,
    circuit_arena: Arena<Circuit<'a>>,

    next_signal_id: Cell<u32>,
    empty: OnceCell<&'a Signal<'a>>,
}

impl<'a> Context<'a> {
    /// Creates a new, empty `Context`.
    pub fn new() -> Context<'a> {
        Context {
            signal_arena: Arena::new(),
            register_data_arena: Arena::new(),
            register_arena: Arena::new(),
            wire_data_arena: Arena::new(),
            wire_arena: Arena::new(),
            mem_arena: Arena::new(),
            instance_arena: Arena::new(),
            circuit_arena: Arena::new(),

            next_signal_id: Cell::new(0),
            empty: OnceCell::new(),
        }
    }

    pub(crate) fn alloc_signal(&'a self, data: SignalData<'a>) -> &'a Signal<'a> {
        let id = SignalId(self.next_signal_id.get());
        self.next_signal_id.set(id.0 + 1);
        self.signal_arena.alloc(Signal {
            context: self,
            id,
            data,
        })
    }

    pub(crate) fn check_owns(&'a self, signal: &Signal<'a>) -> Result<()> {
        if !ptr::eq(self, signal.context) {
            return Err(Error::ForeignSignal);
        }
        Ok(())
    }

    /// Returns this `Context`'s zero-width sentinel signal.
    ///
    /// The sentinel is the only signal with a bit width of 0. It can be used as a placeholder, but every operator and port rejects it.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::*;
    ///
    /// let c = Context::new();
    ///
    /// assert_eq!(c.empty().bit_width(), 0);
    /// assert!(c.output("o", c.empty()).is_err());
    /// ```
    pub fn empty(&'a self) -> &'a Signal<'a> {
        *self
            .empty
            .get_or_init(|| self.alloc_signal(SignalData::Empty))
    }

    /// Creates a constant [`Signal`] with `bit_width` bits holding `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if `bit_width` is outside `[1, 128]`, or if `value` requires more than `bit_width` bits.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::*;
    ///
    /// # fn main() -> kiln::Result<()> {
    /// let c = Context::new();
    ///
    /// let eight_bit_const = c.lit(0xffu32, 8)?;
    /// let one_bit_const = c.lit(0u32, 1)?;
    /// let twenty_seven_bit_const = c.lit(true, 27)?;
    ///
    /// assert!(c.lit(0x100u32, 8).is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub fn lit(&'a self, value: impl Into<Value>, bit_width: u32) -> Result<&'a Signal<'a>> {
        check_bit_width("a literal", bit_width)?;
        let value = value.into();
        let required_bits = value.required_bits();
        if required_bits > bit_width {
            let numeric_value = value.numeric_value();
            return Err(Error::InvalidWidth {
                reason: format!("Cannot fit the specified value '{}' into the specified bit width '{}'. The value '{}' requires a bit width of at least {} bit(s).", numeric_value, bit_width, numeric_value, required_bits),
            });
        }
        Ok(self.alloc_signal(SignalData::Lit {
            value: value.numeric_value(),
            bit_width,
        }))
    }

    /// Convenience method to create a 1-bit constant `0` [`Signal`].
    pub fn low(&'a self) -> &'a Signal<'a> {
        self.alloc_signal(SignalData::Lit {
            value: 0,
            bit_width: 1,
        })
    }

    /// Convenience method to create a 1-bit constant `1` [`Signal`].
    pub fn high(&'a self) -> &'a Signal<'a> {
        self.alloc_signal(SignalData::Lit {
            value: 1,
            bit_width: 1,
        })
    }

    /// Creates an input port called `name` with `bit_width` bits.
    ///
    /// Port names are checked when the enclosing [`Circuit`] is elaborated, not here.
    pub fn input(&'a self, name: impl Into<String>, bit_width: u32) -> Result<&'a Signal<'a>> {
        check_bit_width("an input", bit_width)?;
        Ok(self.alloc_signal(SignalData::Input {
            name: name.into(),
            bit_width,
        }))
    }

    /// Creates an output port called `name`, driven by `source`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if `source` is the zero-width sentinel, and [`Error::ForeignSignal`] if it belongs to another `Context`.
    pub fn output(
        &'a self,
        name: impl Into<String>,
        source: &'a Signal<'a>,
    ) -> Result<&'a Signal<'a>> {
        self.check_owns(source)?;
        let name = name.into();
        if source.is_empty() {
            return Err(Error::InvalidWidth {
                reason: format!(
                    "Cannot create an output called \"{}\" driven by a zero-width signal.",
                    name
                ),
            });
        }
        Ok(self.alloc_signal(SignalData::Output { name, source }))
    }

    /// Creates an input port for every `(name, bit_width)` pair in `layout`, and binds them to the interface record `I`.
    ///
    /// `layout` is typically the port list of a width record of the same interface.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::*;
    ///
    /// interface! {
    ///     struct Pair {
    ///         a,
    ///         b,
    ///     }
    /// }
    ///
    /// # fn main() -> kiln::Result<()> {
    /// let c = Context::new();
    ///
    /// let widths = Pair { a: 3, b: 5 };
    /// let ports: Pair<&Signal> = c.inputs(widths.to_port_list())?;
    /// assert_eq!(ports.a.bit_width(), 3);
    /// assert_eq!(ports.b.bit_width(), 5);
    /// # Ok(())
    /// # }
    /// ```
    pub fn inputs<I: Interface<&'a Signal<'a>>>(
        &'a self,
        layout: impl IntoIterator<Item = (String, u32)>,
    ) -> Result<I> {
        let ports = layout
            .into_iter()
            .map(|(name, bit_width)| -> Result<_> {
                Ok((name.clone(), self.input(name, bit_width)?))
            })
            .collect::<Result<Vec<_>>>()?;
        I::of_port_list(ports)
    }

    /// Creates an output port for every field of `record`, named after the field.
    ///
    /// The returned list is in field declaration order, ready to be passed to [`circuit`](Self::circuit).
    pub fn outputs<I: Interface<&'a Signal<'a>>>(
        &'a self,
        record: I,
    ) -> Result<Vec<&'a Signal<'a>>> {
        record
            .to_port_list()
            .into_iter()
            .map(|(name, source)| self.output(name, source))
            .collect()
    }

    /// Creates an anonymous [`Wire`] with `bit_width` bits, to be driven later.
    pub fn wire(&'a self, bit_width: u32) -> Result<&'a Wire<'a>> {
        self.alloc_wire(None, bit_width)
    }

    /// Creates a [`Wire`] called `name` with `bit_width` bits, to be driven later.
    ///
    /// Named wires are visible as internal signals in simulations and RTL.
    pub fn named_wire(&'a self, name: impl Into<String>, bit_width: u32) -> Result<&'a Wire<'a>> {
        self.alloc_wire(Some(name.into()), bit_width)
    }

    fn alloc_wire(&'a self, name: Option<String>, bit_width: u32) -> Result<&'a Wire<'a>> {
        check_bit_width("a wire", bit_width)?;
        let data = self.wire_data_arena.alloc(WireData {
            name,
            bit_width,
            driver: RefCell::new(None),
        });
        let value = self.alloc_signal(SignalData::Wire { data });
        Ok(self.wire_arena.alloc(Wire { data, value }))
    }

    /// Creates a [`Register`] called `name` with `bit_width` bits, clocked and cleared as described by `spec`.
    ///
    /// The register's default value is `0` until [`Register::default_value`] says otherwise.
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
    /// let clear = c.input("clear", 1)?;
    /// let counter = c.reg("counter", 8, RegSpec::new(clock).with_clear(clear))?;
    /// counter.drive_next(counter.value.add(c.lit(1u32, 8)?)?)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn reg(
        &'a self,
        name: impl Into<String>,
        bit_width: u32,
        spec: RegSpec<'a>,
    ) -> Result<&'a Register<'a>> {
        check_bit_width("a register", bit_width)?;
        check_control(self, spec.clock, "clock")?;
        if let Some(clear) = spec.clear {
            check_control(self, clear, "clear")?;
        }
        let data = self.register_data_arena.alloc(RegisterData {
            name: name.into(),
            bit_width,
            clock: spec.clock,
            clear: spec.clear,
            default_value: Cell::new(0),
            next: RefCell::new(None),
            elaborated: Cell::new(false),
        });
        let value = self.alloc_signal(SignalData::Reg { data });
        Ok(self.register_arena.alloc(Register { data, value }))
    }

    /// Creates a [`Mem`] called `name` with `depth` elements of `element_bit_width` bits each, clocked by `clock`.
    ///
    /// Addresses are `max(1, ceil(log2(depth)))` bits wide.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `depth` is 0, and [`Error::InvalidWidth`] if `element_bit_width` is out of range or `clock` isn't 1 bit wide.
    pub fn mem(
        &'a self,
        name: impl Into<String>,
        depth: u32,
        element_bit_width: u32,
        clock: &'a Signal<'a>,
    ) -> Result<&'a Mem<'a>> {
        let name = name.into();
        if depth == 0 {
            return Err(Error::InvalidConfig {
                reason: format!("memory \"{}\" must have at least one element", name),
            });
        }
        check_bit_width("a memory element", element_bit_width)?;
        check_control(self, clock, "clock")?;
        let address_bit_width = (32 - (depth - 1).leading_zeros()).max(1);
        Ok(self.mem_arena.alloc(Mem {
            context: self,
            name,
            depth,
            address_bit_width,
            element_bit_width,
            clock,
            initial_contents: RefCell::new(None),
            read_ports: RefCell::new(Vec::new()),
            write_port: RefCell::new(None),
            clear: RefCell::new(None),
            elaborated: Cell::new(false),
        }))
    }

    /// Creates a 2:1 [multiplexer](https://en.wikipedia.org/wiki/Multiplexer) that represents `when_true`'s value when `cond` is high, and `when_false`'s value when `cond` is low.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if `cond` isn't 1 bit wide, or if `when_true` and `when_false` have different bit widths.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::*;
    ///
    /// # fn main() -> kiln::Result<()> {
    /// let c = Context::new();
    ///
    /// let cond = c.input("cond", 1)?;
    /// let a = c.input("a", 8)?;
    /// let b = c.input("b", 8)?;
    /// let o = c.output("o", c.mux(cond, a, b)?)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn mux(
        &'a self,
        cond: &'a Signal<'a>,
        when_true: &'a Signal<'a>,
        when_false: &'a Signal<'a>,
    ) -> Result<&'a Signal<'a>> {
        self.check_owns(cond)?;
        self.check_owns(when_true)?;
        self.check_owns(when_false)?;
        if cond.bit_width() != 1 {
            return Err(Error::InvalidWidth {
                reason: format!("Attempted to create a mux with a condition signal that is {} bits wide. Mux conditions must be 1 bit wide.", cond.bit_width()),
            });
        }
        require_value(when_true, "a mux input")?;
        require_value(when_false, "a mux input")?;
        if when_true.bit_width() != when_false.bit_width() {
            return Err(Error::InvalidWidth {
                reason: format!("Attempted to create a mux with inputs that have different bit widths ({} and {}, respectively).", when_true.bit_width(), when_false.bit_width()),
            });
        }
        Ok(self.alloc_signal(SignalData::Mux {
            cond,
            when_true,
            when_false,
        }))
    }

    /// Creates an [`Instance`] of `circuit` called `name`.
    ///
    /// All of the instance's inputs start unconnected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignSignal`] if `circuit` was elaborated in another `Context`.
    pub fn instance(
        &'a self,
        name: impl Into<String>,
        circuit: &'a Circuit<'a>,
    ) -> Result<&'a Instance<'a>> {
        if !ptr::eq(self, circuit.context) {
            return Err(Error::ForeignSignal);
        }
        Ok(self.instance_arena.alloc(Instance {
            context: self,
            circuit,
            name: name.into(),
            driven_inputs: RefCell::new(BTreeMap::new()),
            outputs: RefCell::new(BTreeMap::new()),
        }))
    }

    /// Elaborates the graph reachable from `outputs` into an immutable [`Circuit`] called `name`.
    ///
    /// Every element of `outputs` must be an output port created with [`output`](Self::output). The circuit's inputs are every input port reachable from those outputs, in creation order.
    ///
    /// # Errors
    ///
    /// Returns the first elaboration error found; see the crate's [`Error`] type for the categories and the order in which they are checked.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::*;
    ///
    /// # fn main() -> kiln::Result<()> {
    /// let c = Context::new();
    ///
    /// let a = c.output("a", c.high())?;
    /// let b = c.output("a", c.low())?;
    ///
    /// let err = c.circuit("top", &[a, b]).err().unwrap();
    /// assert!(matches!(err, Error::DuplicatePortName { .. }));
    /// # Ok(())
    /// # }
    /// ```
    pub fn circuit(
        &'a self,
        name: impl Into<String>,
        outputs: &[&'a Signal<'a>],
    ) -> Result<&'a Circuit<'a>> {
        let circuit = validation::elaborate(self, name.into(), outputs)?;
        Ok(self.circuit_arena.alloc(circuit))
    }
}

impl<'a> Default for Context<'a> {
    fn default() -> Self {
        Self::new()
    }
}

fn check_bit_width(what: &str, bit_width: u32) -> Result<()> {
    if bit_width < MIN_SIGNAL_BIT_WIDTH {
        return Err(Error::InvalidWidth {
            reason: format!(
                "Cannot create {} with {} bit(s). Signals must not be narrower than {} bit(s).",
                what, bit_width, MIN_SIGNAL_BIT_WIDTH
            ),
        });
    }
    if bit_width > MAX_SIGNAL_BIT_WIDTH {
        return Err(Error::InvalidWidth {
            reason: format!(
                "Cannot create {} with {} bit(s). Signals must not be wider than {} bit(s).",
                what, bit_width, MAX_SIGNAL_BIT_WIDTH
            ),
        });
    }
    Ok(())
}

fn check_control<'a>(context: &'a Context<'a>, signal: &Signal<'a>, what: &str) -> Result<()> {
    context.check_owns(signal)?;
    if signal.bit_width() != 1 {
        return Err(Error::InvalidWidth {
            reason: format!(
                "A {} signal must be 1 bit wide, but the provided signal has {} bit(s).",
                what,
                signal.bit_width()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn lit_bit_width_lt_min_error() {
        let c = Context::new();

        let err = c.lit(false, 0).err().unwrap();
        assert_eq!(
            err.to_string(),
            "invalid width: Cannot create a literal with 0 bit(s). Signals must not be narrower than 1 bit(s)."
        );
    }

    #[test]
    fn lit_bit_width_gt_max_error() {
        let c = Context::new();

        let err = c.lit(false, 129).err().unwrap();
        assert_eq!(
            err.to_string(),
            "invalid width: Cannot create a literal with 129 bit(s). Signals must not be wider than 128 bit(s)."
        );
    }

    #[test]
    fn lit_value_cannot_fit_into_bit_width_error() {
        let c = Context::new();

        let err = c.lit(1023u128, 4).err().unwrap();
        assert_eq!(
            err.to_string(),
            "invalid width: Cannot fit the specified value '1023' into the specified bit width '4'. The value '1023' requires a bit width of at least 10 bit(s)."
        );
        assert!(c.lit(65536u32, 1).is_err());
        assert!(c.lit(128u64, 7).is_err());
        assert!(c.lit(127u64, 7).is_ok());
    }

    #[test]
    fn input_width_errors() {
        let c = Context::new();

        assert!(matches!(c.input("i", 0), Err(Error::InvalidWidth { .. })));
        assert!(matches!(c.input("i", 129), Err(Error::InvalidWidth { .. })));
    }

    #[test]
    fn empty_output_error() {
        let c = Context::new();

        assert!(matches!(
            c.output("o", c.empty()),
            Err(Error::InvalidWidth { .. })
        ));
    }

    #[test]
    fn empty_is_canonical() {
        let c = Context::new();

        assert_eq!(c.empty().id(), c.empty().id());
    }

    #[test]
    fn output_foreign_signal_error() {
        let c1 = Context::new();
        let c2 = Context::new();

        assert!(matches!(
            c1.output("o", c2.high()),
            Err(Error::ForeignSignal)
        ));
    }

    #[test]
    fn mux_errors() {
        let c = Context::new();

        let cond = c.lit(0u32, 2).unwrap();
        assert!(matches!(
            c.mux(cond, c.high(), c.low()),
            Err(Error::InvalidWidth { .. })
        ));

        let a = c.lit(0u32, 3).unwrap();
        assert!(matches!(
            c.mux(c.high(), a, c.low()),
            Err(Error::InvalidWidth { .. })
        ));
    }

    #[test]
    fn reg_control_width_errors() {
        let c = Context::new();

        let wide = c.lit(0u32, 2).unwrap();
        assert!(matches!(
            c.reg("r", 4, RegSpec::new(wide)),
            Err(Error::InvalidWidth { .. })
        ));
        assert!(matches!(
            c.reg("r", 4, RegSpec::new(c.high()).with_clear(wide)),
            Err(Error::InvalidWidth { .. })
        ));
        assert!(matches!(
            c.reg("r", 0, RegSpec::new(c.high())),
            Err(Error::InvalidWidth { .. })
        ));
    }

    #[test]
    fn mem_address_bit_widths() {
        let c = Context::new();

        let clock = c.input("clock", 1).unwrap();
        let widths = [1, 2, 3, 4, 5, 16, 17]
            .iter()
            .map(|&depth| c.mem("m", depth, 8, clock).unwrap().address_bit_width())
            .collect::<Vec<_>>();
        assert_eq!(widths, vec![1, 1, 2, 2, 3, 4, 5]);
        assert!(matches!(
            c.mem("m", 0, 8, clock),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn instance_foreign_circuit_error() {
        let c1 = Context::new();
        let c2 = Context::new();

        let o = c1.output("o", c1.high()).unwrap();
        let inner = c1.circuit("inner", &[o]).unwrap();

        assert!(matches!(
            c2.instance("inner_inst", inner),
            Err(Error::ForeignSignal)
        ));
    }
}
