//! A parameterized synchronous FIFO, built from registers and a memory.
//!
//! The queue holds up to `capacity` elements of `width` bits.
//! A write is accepted when `write_enable` is high and the queue isn't full, or is full but a read is accepted on the same edge.
//! A read is accepted when `read_enable` is high and the queue isn't empty.
//! Requests that aren't accepted are ignored, and `clear` drops every element and overrides both.
//!
//! How `read_data` follows an accepted read depends on the [`FifoVariant`].
//!
//! # Examples
//!
//! ```
//! use kiln::*;
//! use kiln::fifo::*;
//!
//! # fn main() -> kiln::Result<()> {
//! let c = Context::new();
//!
//! let config = FifoConfig::new(
//!     4,
//!     8,
//!     FifoVariant::Showahead,
//!     Thresholds {
//!         nearly_empty: 1,
//!         nearly_full: 3,
//!     },
//! )?;
//! let fifo = fifo::circuit(&c, "queue", &config)?;
//!
//! let mut sim = Simulation::new(fifo)?;
//! let inputs = sim.inputs::<FifoInputs<InputCell>>()?;
//! let outputs = sim.outputs::<FifoOutputs<OutputCell>>()?;
//!
//! sim.set(inputs.write_enable, true)?;
//! sim.set(inputs.write_data, 0x42u32)?;
//! sim.step();
//! sim.set(inputs.write_enable, false)?;
//! sim.prop();
//!
//! assert_eq!(sim.get(outputs.empty), 0);
//! assert_eq!(sim.get(outputs.read_data), 0x42);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::graph::*;
use crate::interface;

interface! {
    /// Ports driven by the user of a FIFO.
    pub struct FifoInputs {
        clock,
        clear,
        write_enable,
        write_data,
        read_enable,
    }
}

interface! {
    /// Ports a FIFO drives.
    pub struct FifoOutputs {
        read_data,
        full,
        empty,
        nearly_full,
        nearly_empty,
        used_count,
    }
}

/// Read-side behaviour of a FIFO.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FifoVariant {
    /// `read_data` is loaded from storage on the edge that accepts a read.
    Classic,
    /// `read_data` always shows the oldest element; a read only advances past it.
    Showahead,
    /// [`Classic`](Self::Classic) with one more register on `read_data`.
    ///
    /// Data arrives two edges after the read, and the status outputs are registered one edge behind the queue's occupancy.
    ClassicWithExtraRegister,
    /// [`Showahead`](Self::Showahead) with the oldest element captured by an accepted read and delayed through this many registers.
    ///
    /// With 0 registers this is the same as `Showahead`.
    ShowaheadWithReadLatency(u32),
}

/// Occupancy thresholds for `nearly_empty` (`used_count < nearly_empty`) and `nearly_full` (`used_count >= nearly_full`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Thresholds {
    pub nearly_empty: u32,
    pub nearly_full: u32,
}

/// Validated FIFO parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FifoConfig {
    capacity: u32,
    width: u32,
    variant: FifoVariant,
    thresholds: Thresholds,
}

impl FifoConfig {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `capacity` is 0, `width` is outside `1..=128`, or a threshold is greater than `capacity`.
    pub fn new(
        capacity: u32,
        width: u32,
        variant: FifoVariant,
        thresholds: Thresholds,
    ) -> Result<FifoConfig> {
        if capacity == 0 {
            return Err(invalid_config("FIFO capacity must be at least 1".into()));
        }
        if !(MIN_SIGNAL_BIT_WIDTH..=MAX_SIGNAL_BIT_WIDTH).contains(&width) {
            return Err(invalid_config(format!(
                "FIFO width must be between {} and {} bit(s), got {}",
                MIN_SIGNAL_BIT_WIDTH, MAX_SIGNAL_BIT_WIDTH, width
            )));
        }
        for (name, threshold) in [
            ("nearly_empty", thresholds.nearly_empty),
            ("nearly_full", thresholds.nearly_full),
        ] {
            if threshold > capacity {
                return Err(invalid_config(format!(
                    "{} threshold {} is greater than the FIFO capacity {}",
                    name, threshold, capacity
                )));
            }
        }

        Ok(FifoConfig {
            capacity,
            width,
            variant,
            thresholds,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn variant(&self) -> FifoVariant {
        self.variant
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Enough bits to count from 0 to `capacity` inclusive.
    pub fn used_count_bit_width(&self) -> u32 {
        32 - self.capacity.leading_zeros()
    }

    /// Width of the storage address and of the read and write pointers.
    pub fn address_bit_width(&self) -> u32 {
        (32 - (self.capacity - 1).leading_zeros()).max(1)
    }

    pub fn input_widths(&self) -> FifoInputs<u32> {
        FifoInputs {
            clock: 1,
            clear: 1,
            write_enable: 1,
            write_data: self.width,
            read_enable: 1,
        }
    }

    pub fn output_widths(&self) -> FifoOutputs<u32> {
        FifoOutputs {
            read_data: self.width,
            full: 1,
            empty: 1,
            nearly_full: 1,
            nearly_empty: 1,
            used_count: self.used_count_bit_width(),
        }
    }
}

fn invalid_config(reason: String) -> Error {
    Error::InvalidConfig { reason }
}

/// Builds a FIFO into the graph of `c`, driven by `inputs`.
///
/// State elements are named after `name`, e.g. `{name}_used` and `{name}_storage`, so `name` must be unique among the FIFOs of one circuit.
/// Elaborating a circuit with two FIFOs of the same name fails with [`Error::DuplicateInternalName`].
///
/// # Errors
///
/// Returns [`Error::InvalidWidth`] if the widths of `inputs` don't match [`FifoConfig::input_widths`].
pub fn create<'a>(
    c: &'a Context<'a>,
    name: &str,
    config: &FifoConfig,
    inputs: &FifoInputs<&'a Signal<'a>>,
) -> Result<FifoOutputs<&'a Signal<'a>>> {
    let expected = config.input_widths();
    let found = inputs.map(|input| input.bit_width());
    if found != expected {
        return Err(Error::InvalidWidth {
            reason: format!(
                "FIFO \"{}\" expects input widths {:?}, found {:?}",
                name, expected, found
            ),
        });
    }

    let core = Core::new(c, name, config, inputs)?;
    let outputs = match config.variant {
        FifoVariant::Classic => {
            let read_data = core.storage.read_port(core.read_ptr, core.do_read)?;
            core.status(read_data, core.used)?
        }
        FifoVariant::Showahead => {
            let read_data = core.storage.async_read_port(core.read_ptr)?;
            core.status(read_data, core.used)?
        }
        FifoVariant::ClassicWithExtraRegister => {
            let spec = core.spec(inputs);
            let storage_data = core.storage.read_port(core.read_ptr, core.do_read)?;
            let read_data = c.reg(format!("{}_read_data", name), config.width, spec)?;
            read_data.drive_next(storage_data)?;
            let used_q = c.reg(
                format!("{}_used_q", name),
                config.used_count_bit_width(),
                spec,
            )?;
            used_q.drive_next(core.used)?;
            core.status(read_data.value, used_q.value)?
        }
        FifoVariant::ShowaheadWithReadLatency(latency) => {
            let spec = core.spec(inputs);
            let mut read_data = core.storage.async_read_port(core.read_ptr)?;
            for stage in 0..latency {
                let reg = c.reg(
                    format!("{}_read_stage_{}", name, stage),
                    config.width,
                    spec,
                )?;
                // The first stage captures the head only when a read is accepted
                let next = if stage == 0 {
                    core.do_read.mux(read_data, reg.value)?
                } else {
                    read_data
                };
                reg.drive_next(next)?;
                read_data = reg.value;
            }
            core.status(read_data, core.used)?
        }
    };

    log::debug!(
        "created FIFO \"{}\": {:?}, {} x {} bit(s)",
        name,
        config.variant,
        config.capacity,
        config.width
    );

    Ok(outputs)
}

/// Builds a standalone FIFO circuit called `name`, with ports named after the fields of [`FifoInputs`] and [`FifoOutputs`].
pub fn circuit<'a>(
    c: &'a Context<'a>,
    name: &str,
    config: &FifoConfig,
) -> Result<&'a Circuit<'a>> {
    let inputs: FifoInputs<&Signal> = c.inputs(config.input_widths().to_port_list())?;
    let outputs = create(c, name, config, &inputs)?;
    let outputs = c.outputs(outputs)?;
    c.circuit(name, &outputs)
}

/// Occupancy, pointers and storage shared by every variant.
struct Core<'a> {
    c: &'a Context<'a>,
    config: FifoConfig,

    used: &'a Signal<'a>,
    read_ptr: &'a Signal<'a>,
    do_read: &'a Signal<'a>,
    storage: &'a Mem<'a>,
}

impl<'a> Core<'a> {
    fn new(
        c: &'a Context<'a>,
        name: &str,
        config: &FifoConfig,
        inputs: &FifoInputs<&'a Signal<'a>>,
    ) -> Result<Core<'a>> {
        let spec = RegSpec::new(inputs.clock).with_clear(inputs.clear);
        let used_bit_width = config.used_count_bit_width();
        let address_bit_width = config.address_bit_width();

        let used = c.reg(format!("{}_used", name), used_bit_width, spec)?;
        let read_ptr = c.reg(format!("{}_read_ptr", name), address_bit_width, spec)?;
        let write_ptr = c.reg(format!("{}_write_ptr", name), address_bit_width, spec)?;

        let empty = used.value.eq(c.lit(0u32, used_bit_width)?)?;
        let full = used.value.eq(c.lit(config.capacity, used_bit_width)?)?;

        // Clear overrides both requests
        let not_clear = inputs.clear.not()?;
        let do_read = inputs.read_enable.and(empty.not()?)?.and(not_clear)?;
        let do_write = inputs
            .write_enable
            .and(full.not()?.or(do_read)?)?
            .and(not_clear)?;

        let one = c.lit(1u32, used_bit_width)?;
        let grow = do_write.and(do_read.not()?)?;
        let shrink = do_read.and(do_write.not()?)?;
        used.drive_next(grow.mux(
            used.value.add(one)?,
            shrink.mux(used.value.sub(one)?, used.value)?,
        )?)?;

        read_ptr.drive_next(do_read.mux(advance(c, config, read_ptr.value)?, read_ptr.value)?)?;
        write_ptr.drive_next(do_write.mux(advance(c, config, write_ptr.value)?, write_ptr.value)?)?;

        let storage = c.mem(
            format!("{}_storage", name),
            config.capacity,
            config.width,
            inputs.clock,
        )?;
        storage.write_port(write_ptr.value, inputs.write_data, do_write)?;

        Ok(Core {
            c,
            config: config.clone(),

            used: used.value,
            read_ptr: read_ptr.value,
            do_read,
            storage,
        })
    }

    fn spec(&self, inputs: &FifoInputs<&'a Signal<'a>>) -> RegSpec<'a> {
        RegSpec::new(inputs.clock).with_clear(inputs.clear)
    }

    /// Output record with status flags derived from `used`.
    fn status(
        &self,
        read_data: &'a Signal<'a>,
        used: &'a Signal<'a>,
    ) -> Result<FifoOutputs<&'a Signal<'a>>> {
        let c = self.c;
        let bit_width = self.config.used_count_bit_width();
        Ok(FifoOutputs {
            read_data,
            full: used.eq(c.lit(self.config.capacity, bit_width)?)?,
            empty: used.eq(c.lit(0u32, bit_width)?)?,
            nearly_full: used.ge(c.lit(self.config.thresholds.nearly_full, bit_width)?)?,
            nearly_empty: used.lt(c.lit(self.config.thresholds.nearly_empty, bit_width)?)?,
            used_count: used,
        })
    }
}

/// `ptr + 1`, wrapping to 0 after the last element.
fn advance<'a>(
    c: &'a Context<'a>,
    config: &FifoConfig,
    ptr: &'a Signal<'a>,
) -> Result<&'a Signal<'a>> {
    let bit_width = config.address_bit_width();
    let last = ptr.eq(c.lit(config.capacity - 1, bit_width)?)?;
    last.mux(c.lit(0u32, bit_width)?, ptr.add(c.lit(1u32, bit_width)?)?)
}
