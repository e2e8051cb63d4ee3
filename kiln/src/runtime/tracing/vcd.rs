//! [VCD](https://en.wikipedia.org/wiki/Value_change_dump) output for [`Tracer`](super::Tracer).

use super::Trace;

use std::io;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimeScaleUnit {
    S,
    Ms,
    Us,
    Ns,
    Ps,
    Fs,
}

impl From<TimeScaleUnit> for vcd::TimescaleUnit {
    fn from(time_scale_unit: TimeScaleUnit) -> Self {
        match time_scale_unit {
            TimeScaleUnit::S => vcd::TimescaleUnit::S,
            TimeScaleUnit::Ms => vcd::TimescaleUnit::MS,
            TimeScaleUnit::Us => vcd::TimescaleUnit::US,
            TimeScaleUnit::Ns => vcd::TimescaleUnit::NS,
            TimeScaleUnit::Ps => vcd::TimescaleUnit::PS,
            TimeScaleUnit::Fs => vcd::TimescaleUnit::FS,
        }
    }
}

/// Writes a VCD file with one time step per simulated cycle.
///
/// The header is closed when the outermost module is popped.
pub struct VcdTrace<W: io::Write> {
    module_hierarchy_depth: u32,

    signals: Vec<VcdTraceSignal>,

    w: vcd::Writer<W>,
}

impl<W: io::Write> VcdTrace<W> {
    pub fn new(w: W, time_scale: u32, time_scale_unit: TimeScaleUnit) -> io::Result<VcdTrace<W>> {
        let mut w = vcd::Writer::new(w);

        w.timescale(time_scale, time_scale_unit.into())?;

        Ok(VcdTrace {
            module_hierarchy_depth: 0,

            signals: Vec::new(),

            w,
        })
    }
}

impl<W: io::Write> Trace for VcdTrace<W> {
    type SignalId = usize;

    fn push_module(&mut self, name: &str) -> io::Result<()> {
        self.w.add_module(name)?;

        self.module_hierarchy_depth += 1;

        Ok(())
    }

    fn pop_module(&mut self) -> io::Result<()> {
        self.w.upscope()?;

        self.module_hierarchy_depth -= 1;

        if self.module_hierarchy_depth == 0 {
            self.w.enddefinitions()?;
        }

        Ok(())
    }

    fn add_signal(&mut self, name: &str, bit_width: u32) -> io::Result<usize> {
        let ret = self.signals.len();

        self.signals.push(VcdTraceSignal {
            bit_width,
            id: self.w.add_wire(bit_width, name)?,
        });

        Ok(ret)
    }

    fn update_time_stamp(&mut self, time_stamp: u64) -> io::Result<()> {
        self.w.timestamp(time_stamp)
    }

    fn update_signal(&mut self, signal_id: &usize, value: u128) -> io::Result<()> {
        let signal = &self.signals[*signal_id];

        if signal.bit_width == 1 {
            self.w.change_scalar(signal.id, value & 1 != 0)?;
        } else {
            // Most significant bit first
            let scalar_values = (0..signal.bit_width)
                .rev()
                .map(|i| vcd::Value::from((value >> i) & 1 != 0))
                .collect::<Vec<_>>();
            self.w.change_vector(signal.id, &scalar_values)?;
        }

        Ok(())
    }
}

struct VcdTraceSignal {
    bit_width: u32,
    id: vcd::IdCode,
}
