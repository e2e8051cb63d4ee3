use super::context::*;
use super::instance::*;
use super::mem::*;
use super::register::*;
use super::wire::*;

use crate::error::{Error, Result};

use std::fmt;
use std::ptr;

/// The minimum allowed bit width for any [`Signal`] that carries a value.
///
/// Only the sentinel returned by [`Context::empty`] is narrower than this.
pub const MIN_SIGNAL_BIT_WIDTH: u32 = 1;
/// The maximum allowed bit width for any given [`Signal`].
///
/// This is currently set to `128` so that the simulator can hold every value in a native `u128`.
pub const MAX_SIGNAL_BIT_WIDTH: u32 = 128;

/// Stable identity of a [`Signal`] within its [`Context`].
///
/// Ids are handed out in creation order, so sorting by id sorts by creation time.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SignalId(pub(crate) u32);

impl SignalId {
    /// Returns the raw index of this id.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Represents a collection of 1 or more bits driven by some source.
///
/// A `Signal` can be created by several [`Context`] methods (eg. [`lit`]) or as a result of combining existing `Signal`s (eg. [`concat`]).
/// `Signal`s are never modified after creation, so one `Signal` can feed any number of consumers.
///
/// # Examples
///
/// ```
/// use kiln::*;
///
/// # fn main() -> kiln::Result<()> {
/// let c = Context::new();
///
/// let a = c.lit(0xffu8, 8)?; // 8-bit signal
/// let b = c.input("my_input", 27)?; // 27-bit signal
/// let d = b.bits(7, 0)?; // 8-bit signal
/// let e = a.add(d)?; // 8-bit signal
/// let o = c.output("my_output", e)?; // 8-bit output driven by e
/// # Ok(())
/// # }
/// ```
///
/// [`concat`]: #method.concat
/// [`lit`]: ./struct.Context.html#method.lit
#[must_use]
pub struct Signal<'a> {
    pub(super) context: &'a Context<'a>,
    pub(crate) id: SignalId,

    pub(crate) data: SignalData<'a>,
}

impl<'a> Signal<'a> {
    /// Returns the identity of this `Signal`.
    pub fn id(&self) -> SignalId {
        self.id
    }

    /// Returns the bit width of the given `Signal`.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::*;
    ///
    /// # fn main() -> kiln::Result<()> {
    /// let c = Context::new();
    ///
    /// assert_eq!(c.lit(42u32, 7)?.bit_width(), 7);
    /// assert_eq!(c.input("i", 27)?.bit_width(), 27);
    /// assert_eq!(c.high().not()?.bit_width(), 1);
    /// assert_eq!(c.lit(12u32, 100)?.bit(30)?.bit_width(), 1);
    /// assert_eq!(c.lit(1u32, 99)?.bits(37, 29)?.bit_width(), 9);
    /// assert_eq!(c.high().repeat(35)?.bit_width(), 35);
    /// assert_eq!(c.lit(1u32, 20)?.concat(c.high())?.bit_width(), 21);
    /// assert_eq!(c.lit(0xaau32, 8)?.eq(c.lit(0xaau32, 8)?)?.bit_width(), 1);
    /// assert_eq!(c.empty().bit_width(), 0);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn bit_width(&self) -> u32 {
        match &self.data {
            SignalData::Empty => 0,
            SignalData::Lit { bit_width, .. } => *bit_width,
            SignalData::Input { bit_width, .. } => *bit_width,
            SignalData::Output { source, .. } => source.bit_width(),
            SignalData::Wire { data } => data.bit_width,
            SignalData::Reg { data } => data.bit_width,
            SignalData::UnOp { source, .. } => source.bit_width(),
            SignalData::BinOp { bit_width, .. } => *bit_width,
            SignalData::Bits {
                range_high,
                range_low,
                ..
            } => range_high - range_low + 1,
            SignalData::Repeat { source, count } => source.bit_width() * count,
            SignalData::Concat { lhs, rhs } => lhs.bit_width() + rhs.bit_width(),
            SignalData::Mux { when_true, .. } => when_true.bit_width(),
            SignalData::MemReadPort { mem, .. } => mem.element_bit_width,
            SignalData::InstanceOutput { bit_width, .. } => *bit_width,
        }
    }

    /// Returns `true` if this is the zero-width sentinel created by [`Context::empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self.data, SignalData::Empty)
    }

    /// Returns the user-visible name of this `Signal`, if it has one.
    ///
    /// Ports, named wires and registers have names; every other kind of signal is anonymous.
    pub fn name(&self) -> Option<&str> {
        match &self.data {
            SignalData::Input { name, .. } | SignalData::Output { name, .. } => Some(name),
            SignalData::Wire { data } => data.name.as_deref(),
            SignalData::Reg { data } => Some(&data.name),
            _ => None,
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self.name() {
            Some(name) => name.to_string(),
            None => format!("{}{}", self.data.kind_name(), self.id),
        }
    }

    /// Creates a `Signal` that represents the bitwise inverse of this `Signal`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if this `Signal` is zero-width.
    pub fn not(&'a self) -> Result<&'a Signal<'a>> {
        require_value(self, "the operand of a bitwise not")?;
        Ok(self.context.alloc_signal(SignalData::UnOp {
            source: self,
            op: UnOp::Not,
        }))
    }

    /// Creates a `Signal` that represents the bitwise AND of `self` and `rhs`.
    pub fn and(&'a self, rhs: &'a Signal<'a>) -> Result<&'a Signal<'a>> {
        self.bin_op(rhs, BinOp::BitAnd)
    }

    /// Creates a `Signal` that represents the bitwise OR of `self` and `rhs`.
    pub fn or(&'a self, rhs: &'a Signal<'a>) -> Result<&'a Signal<'a>> {
        self.bin_op(rhs, BinOp::BitOr)
    }

    /// Creates a `Signal` that represents the bitwise XOR of `self` and `rhs`.
    pub fn xor(&'a self, rhs: &'a Signal<'a>) -> Result<&'a Signal<'a>> {
        self.bin_op(rhs, BinOp::BitXor)
    }

    /// Creates a `Signal` that represents the sum of `self` and `rhs`.
    ///
    /// The sum is truncated to the operands' bit width. If a carry bit is desired, the operands can be [`concat`]enated with a `0` bit before the operation.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::*;
    ///
    /// # fn main() -> kiln::Result<()> {
    /// let c = Context::new();
    ///
    /// let lhs = c.lit(1u32, 32)?;
    /// let rhs = c.lit(2u32, 32)?;
    /// let sum = lhs.add(rhs)?; // Equivalent to c.lit(3u32, 32)
    ///
    /// let lhs = c.low().concat(c.lit(0xffffffffu32, 32)?)?; // Concat 0 bits with operands for carry
    /// let rhs = c.low().concat(c.lit(0x00000001u32, 32)?)?;
    /// let carry_sum = lhs.add(rhs)?; // Equivalent to c.lit(0x100000000u64, 33)
    /// let carry = carry_sum.bit(32)?; // Equivalent to c.high()
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// [`concat`]: #method.concat
    #[allow(clippy::should_implement_trait)]
    pub fn add(&'a self, rhs: &'a Signal<'a>) -> Result<&'a Signal<'a>> {
        self.bin_op(rhs, BinOp::Add)
    }

    /// Creates a `Signal` that represents the difference of `self` and `rhs`, wrapping on underflow.
    #[allow(clippy::should_implement_trait)]
    pub fn sub(&'a self, rhs: &'a Signal<'a>) -> Result<&'a Signal<'a>> {
        self.bin_op(rhs, BinOp::Sub)
    }

    /// Creates a `Signal` that represents the single-bit result of an equality comparison between `self` and `rhs`.
    pub fn eq(&'a self, rhs: &'a Signal<'a>) -> Result<&'a Signal<'a>> {
        self.bin_op(rhs, BinOp::Equal)
    }

    /// Creates a `Signal` that represents the single-bit result of an inequality comparison between `self` and `rhs`.
    pub fn ne(&'a self, rhs: &'a Signal<'a>) -> Result<&'a Signal<'a>> {
        self.bin_op(rhs, BinOp::NotEqual)
    }

    /// Creates a `Signal` that represents the single-bit result of an unsigned `<` comparison between `self` and `rhs`.
    pub fn lt(&'a self, rhs: &'a Signal<'a>) -> Result<&'a Signal<'a>> {
        self.bin_op(rhs, BinOp::LessThan)
    }

    /// Creates a `Signal` that represents the single-bit result of an unsigned `<=` comparison between `self` and `rhs`.
    pub fn le(&'a self, rhs: &'a Signal<'a>) -> Result<&'a Signal<'a>> {
        self.bin_op(rhs, BinOp::LessThanEqual)
    }

    /// Creates a `Signal` that represents the single-bit result of an unsigned `>` comparison between `self` and `rhs`.
    pub fn gt(&'a self, rhs: &'a Signal<'a>) -> Result<&'a Signal<'a>> {
        self.bin_op(rhs, BinOp::GreaterThan)
    }

    /// Creates a `Signal` that represents the single-bit result of an unsigned `>=` comparison between `self` and `rhs`.
    pub fn ge(&'a self, rhs: &'a Signal<'a>) -> Result<&'a Signal<'a>> {
        self.bin_op(rhs, BinOp::GreaterThanEqual)
    }

    /// Creates a `Signal` that represents the value of the single bit of this `Signal` at index `index`, where `index` equal to `0` represents this `Signal`'s least significant bit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if `index` is greater than or equal to this `Signal`'s bit width.
    pub fn bit(&'a self, index: u32) -> Result<&'a Signal<'a>> {
        require_value(self, "the source of a bit selection")?;
        if index >= self.bit_width() {
            return Err(Error::InvalidWidth {
                reason: format!("Attempted to take bit index {} from a signal with a width of {} bits. Bit indices must be in the range [0, {}] for a signal with a width of {} bits.", index, self.bit_width(), self.bit_width() - 1, self.bit_width()),
            });
        }
        Ok(self.context.alloc_signal(SignalData::Bits {
            source: self,
            range_high: index,
            range_low: index,
        }))
    }

    /// Creates a `Signal` that represents a contiguous subset of the bits of this `Signal`, starting at `range_low` as the least significant bit and ending at `range_high` as the most significant bit, inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if either bound is outside of this `Signal`, or if `range_low` is greater than `range_high`.
    pub fn bits(&'a self, range_high: u32, range_low: u32) -> Result<&'a Signal<'a>> {
        require_value(self, "the source of a bit selection")?;
        if range_low >= self.bit_width() {
            return Err(Error::InvalidWidth {
                reason: format!("Cannot specify a range of bits where the lower bound is greater than or equal to the number of bits in the source signal. The bounds must be in the range [0, {}] for a signal with a width of {} bits, but a lower bound of {} was given.", self.bit_width() - 1, self.bit_width(), range_low),
            });
        }
        if range_high >= self.bit_width() {
            return Err(Error::InvalidWidth {
                reason: format!("Cannot specify a range of bits where the upper bound is greater than or equal to the number of bits in the source signal. The bounds must be in the range [0, {}] for a signal with a width of {} bits, but an upper bound of {} was given.", self.bit_width() - 1, self.bit_width(), range_high),
            });
        }
        if range_low > range_high {
            return Err(Error::InvalidWidth {
                reason: "Cannot specify a range of bits where the lower bound is greater than the upper bound.".into(),
            });
        }
        Ok(self.context.alloc_signal(SignalData::Bits {
            source: self,
            range_high,
            range_low,
        }))
    }

    /// Creates a `Signal` that represents this `Signal` repeated `count` times.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if the resulting width would be 0 or greater than [`MAX_SIGNAL_BIT_WIDTH`].
    pub fn repeat(&'a self, count: u32) -> Result<&'a Signal<'a>> {
        require_value(self, "the source of a repeat")?;
        let target_bit_width = self.bit_width() as u64 * count as u64;
        if target_bit_width < MIN_SIGNAL_BIT_WIDTH as u64 {
            return Err(Error::InvalidWidth {
                reason: format!("Attempted to repeat a {}-bit signal {} times, but this would result in a bit width of {}, which is less than the minimal signal bit width of {} bit(s).", self.bit_width(), count, target_bit_width, MIN_SIGNAL_BIT_WIDTH),
            });
        }
        if target_bit_width > MAX_SIGNAL_BIT_WIDTH as u64 {
            return Err(Error::InvalidWidth {
                reason: format!("Attempted to repeat a {}-bit signal {} times, but this would result in a bit width of {}, which is greater than the maximum signal bit width of {} bit(s).", self.bit_width(), count, target_bit_width, MAX_SIGNAL_BIT_WIDTH),
            });
        }
        Ok(self.context.alloc_signal(SignalData::Repeat {
            source: self,
            count,
        }))
    }

    /// Creates a `Signal` that represents this `Signal` concatenated with `rhs`.
    ///
    /// `self` represents the upper bits in the resulting `Signal`, and `rhs` represents the lower bits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if either operand is zero-width, or if `self.bit_width() + rhs.bit_width()` is greater than [`MAX_SIGNAL_BIT_WIDTH`].
    pub fn concat(&'a self, rhs: &'a Signal<'a>) -> Result<&'a Signal<'a>> {
        self.check_same_context(rhs)?;
        require_value(self, "an operand of a concatenation")?;
        require_value(rhs, "an operand of a concatenation")?;
        let target_bit_width = self.bit_width() + rhs.bit_width();
        if target_bit_width > MAX_SIGNAL_BIT_WIDTH {
            return Err(Error::InvalidWidth {
                reason: format!("Attempted to concatenate signals with {} bit(s) and {} bit(s) respectively, but this would result in a bit width of {}, which is greater than the maximum signal bit width of {} bit(s).", self.bit_width(), rhs.bit_width(), target_bit_width, MAX_SIGNAL_BIT_WIDTH),
            });
        }
        Ok(self
            .context
            .alloc_signal(SignalData::Concat { lhs: self, rhs }))
    }

    /// Creates a 2:1 [multiplexer](https://en.wikipedia.org/wiki/Multiplexer) that represents `when_true`'s value when `self` is high, and `when_false`'s value when `self` is low.
    ///
    /// This is a convenience wrapper for [`Context::mux`].
    pub fn mux(
        &'a self,
        when_true: &'a Signal<'a>,
        when_false: &'a Signal<'a>,
    ) -> Result<&'a Signal<'a>> {
        self.context.mux(self, when_true, when_false)
    }

    pub(crate) fn check_same_context(&self, other: &Signal<'a>) -> Result<()> {
        if !ptr::eq(self.context, other.context) {
            return Err(Error::ForeignSignal);
        }
        Ok(())
    }

    fn bin_op(&'a self, rhs: &'a Signal<'a>, op: BinOp) -> Result<&'a Signal<'a>> {
        self.check_same_context(rhs)?;
        require_value(self, "an operand of a binary operator")?;
        require_value(rhs, "an operand of a binary operator")?;
        if self.bit_width() != rhs.bit_width() {
            return Err(Error::InvalidWidth {
                reason: format!(
                    "Signals have different bit widths ({} and {}, respectively).",
                    self.bit_width(),
                    rhs.bit_width()
                ),
            });
        }
        let bit_width = if op.is_comparison() {
            1
        } else {
            self.bit_width()
        };
        Ok(self.context.alloc_signal(SignalData::BinOp {
            lhs: self,
            rhs,
            op,
            bit_width,
        }))
    }
}

/// Fails with [`Error::InvalidWidth`] if `signal` is the zero-width sentinel.
pub(crate) fn require_value(signal: &Signal<'_>, what: &str) -> Result<()> {
    if signal.bit_width() < MIN_SIGNAL_BIT_WIDTH {
        return Err(Error::InvalidWidth {
            reason: format!("Cannot use a zero-width signal as {}.", what),
        });
    }
    Ok(())
}

pub(crate) enum SignalData<'a> {
    Empty,

    Lit {
        value: u128,
        bit_width: u32,
    },

    Input {
        name: String,
        bit_width: u32,
    },
    Output {
        name: String,
        source: &'a Signal<'a>,
    },

    Wire {
        data: &'a WireData<'a>,
    },
    Reg {
        data: &'a RegisterData<'a>,
    },

    UnOp {
        source: &'a Signal<'a>,
        op: UnOp,
    },
    BinOp {
        lhs: &'a Signal<'a>,
        rhs: &'a Signal<'a>,
        op: BinOp,
        bit_width: u32,
    },

    Bits {
        source: &'a Signal<'a>,
        range_high: u32,
        range_low: u32,
    },

    Repeat {
        source: &'a Signal<'a>,
        count: u32,
    },
    Concat {
        lhs: &'a Signal<'a>,
        rhs: &'a Signal<'a>,
    },

    Mux {
        cond: &'a Signal<'a>,
        when_true: &'a Signal<'a>,
        when_false: &'a Signal<'a>,
    },

    MemReadPort {
        mem: &'a Mem<'a>,
        index: usize,
    },

    InstanceOutput {
        instance: &'a Instance<'a>,
        name: String,
        bit_width: u32,
    },
}

impl<'a> SignalData<'a> {
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            SignalData::Empty => "empty",
            SignalData::Lit { .. } => "lit",
            SignalData::Input { .. } => "input",
            SignalData::Output { .. } => "output",
            SignalData::Wire { .. } => "wire",
            SignalData::Reg { .. } => "reg",
            SignalData::UnOp { .. } => "unop",
            SignalData::BinOp { .. } => "binop",
            SignalData::Bits { .. } => "bits",
            SignalData::Repeat { .. } => "repeat",
            SignalData::Concat { .. } => "concat",
            SignalData::Mux { .. } => "mux",
            SignalData::MemReadPort { .. } => "mem_read",
            SignalData::InstanceOutput { .. } => "instance_output",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum UnOp {
    Not,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BinOp {
    Add,
    BitAnd,
    BitOr,
    BitXor,
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    Sub,
}

impl BinOp {
    pub(crate) fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Equal
                | BinOp::NotEqual
                | BinOp::LessThan
                | BinOp::LessThanEqual
                | BinOp::GreaterThan
                | BinOp::GreaterThanEqual
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn bit_index_out_of_range_error() {
        let c = Context::new();

        let lit = c.lit(0u32, 4).unwrap();

        let err = lit.bit(4).err().unwrap();
        assert_eq!(err.to_string(), "invalid width: Attempted to take bit index 4 from a signal with a width of 4 bits. Bit indices must be in the range [0, 3] for a signal with a width of 4 bits.");
    }

    #[test]
    fn bits_bounds_errors() {
        let c = Context::new();

        let lit = c.lit(0u32, 4).unwrap();

        assert!(matches!(lit.bits(3, 4), Err(Error::InvalidWidth { .. })));
        assert!(matches!(lit.bits(4, 0), Err(Error::InvalidWidth { .. })));
        assert!(matches!(lit.bits(1, 2), Err(Error::InvalidWidth { .. })));
        assert_eq!(lit.bits(2, 1).unwrap().bit_width(), 2);
    }

    #[test]
    fn repeat_bounds_errors() {
        let c = Context::new();

        let lit = c.lit(0u32, 4).unwrap();

        assert!(matches!(lit.repeat(0), Err(Error::InvalidWidth { .. })));
        assert!(matches!(lit.repeat(33), Err(Error::InvalidWidth { .. })));
        assert_eq!(lit.repeat(32).unwrap().bit_width(), 128);
    }

    #[test]
    fn concat_too_wide_error() {
        let c = Context::new();

        let a = c.lit(0u32, 100).unwrap();
        let b = c.lit(0u32, 29).unwrap();

        assert!(matches!(a.concat(b), Err(Error::InvalidWidth { .. })));
    }

    #[test]
    fn different_bit_widths_error() {
        let c = Context::new();

        let a = c.lit(0u32, 8).unwrap();
        let b = c.lit(0u32, 4).unwrap();

        let err = a.add(b).err().unwrap();
        assert_eq!(
            err.to_string(),
            "invalid width: Signals have different bit widths (8 and 4, respectively)."
        );
    }

    #[test]
    fn zero_width_operand_errors() {
        let c = Context::new();

        let a = c.lit(0u32, 1).unwrap();
        let e = c.empty();

        assert!(matches!(e.not(), Err(Error::InvalidWidth { .. })));
        assert!(matches!(a.and(e), Err(Error::InvalidWidth { .. })));
        assert!(matches!(e.eq(e), Err(Error::InvalidWidth { .. })));
        assert!(matches!(a.concat(e), Err(Error::InvalidWidth { .. })));
        assert!(matches!(e.bit(0), Err(Error::InvalidWidth { .. })));
        assert!(matches!(e.repeat(4), Err(Error::InvalidWidth { .. })));
    }

    #[test]
    fn foreign_signal_error() {
        let c1 = Context::new();
        let c2 = Context::new();

        let a = c1.high();
        let b = c2.high();

        assert!(matches!(a.or(b), Err(Error::ForeignSignal)));
    }

    #[test]
    fn comparison_widths() {
        let c = Context::new();

        let a = c.lit(3u32, 8).unwrap();
        let b = c.lit(5u32, 8).unwrap();

        for s in [a.eq(b), a.ne(b), a.lt(b), a.le(b), a.gt(b), a.ge(b)] {
            assert_eq!(s.unwrap().bit_width(), 1);
        }
        assert_eq!(a.sub(b).unwrap().bit_width(), 8);
    }

    #[test]
    fn ids_follow_creation_order() {
        let c = Context::new();

        let a = c.high();
        let b = c.low();
        let d = a.xor(b).unwrap();

        assert!(a.id() < b.id());
        assert!(b.id() < d.id());
    }
}
