//! Waveform capture for simulations.
//!
//! A [`Trace`] is a sink for value changes. A [`Tracer`] connects one [`Simulation`] to one sink: it declares every tracked signal once, then pushes the values that changed each time [`Tracer::capture`] is called.

pub mod vcd;
pub mod waveform;

pub use waveform::*;

use crate::error::Result;
use crate::sim::Simulation;

use std::io;

/// A sink for signal declarations and value changes.
///
/// Declarations (`push_module`, `add_signal`, `pop_module`) all happen before the first `update_time_stamp`.
pub trait Trace {
    type SignalId;

    fn push_module(&mut self, name: &str) -> io::Result<()>;
    fn pop_module(&mut self) -> io::Result<()>;
    fn add_signal(&mut self, name: &str, bit_width: u32) -> io::Result<Self::SignalId>;

    fn update_time_stamp(&mut self, time_stamp: u64) -> io::Result<()>;
    fn update_signal(&mut self, signal_id: &Self::SignalId, value: u128) -> io::Result<()>;
}

/// Feeds the tracked signals of a [`Simulation`] into a [`Trace`].
///
/// Time stamps are the simulation's cycle count.
///
/// # Examples
///
/// ```
/// use kiln::*;
/// use kiln::runtime::tracing::*;
///
/// # fn main() -> kiln::Result<()> {
/// let c = Context::new();
///
/// let clock = c.input("clock", 1)?;
/// let toggle = c.reg("toggle", 1, RegSpec::new(clock))?;
/// toggle.drive_next(toggle.value.not()?)?;
/// let o = c.output("o", toggle.value)?;
/// let circuit = c.circuit("top", &[o])?;
///
/// let mut sim = Simulation::new(circuit)?;
/// let mut tracer = Tracer::new(&sim, Waveform::new())?;
/// for _ in 0..4 {
///     tracer.capture(&sim)?;
///     sim.step();
/// }
///
/// let waveform = tracer.into_inner();
/// assert_eq!(waveform.value_at("o", 0), Some(0));
/// assert_eq!(waveform.value_at("o", 3), Some(1));
/// # Ok(())
/// # }
/// ```
pub struct Tracer<T: Trace> {
    trace: T,
    signal_ids: Vec<T::SignalId>,
    last_values: Vec<Option<u128>>,
}

impl<T: Trace> Tracer<T> {
    /// Declares every signal `sim` tracks in `trace`.
    ///
    /// Signals inside instances are declared in nested modules named after the instances.
    pub fn new(sim: &Simulation, mut trace: T) -> Result<Tracer<T>> {
        let tracked = sim.tracked();

        let mut order = (0..tracked.len()).collect::<Vec<_>>();
        order.sort_by_key(|&index| scope_of(tracked[index].0));

        trace.push_module(sim.name())?;
        let mut scope: Vec<&str> = Vec::new();
        let mut signal_ids = (0..tracked.len()).map(|_| None).collect::<Vec<_>>();
        for index in order {
            let (name, bit_width, _) = tracked[index];
            let path = scope_of(name);
            let common = scope
                .iter()
                .zip(path.iter())
                .take_while(|(a, b)| a == b)
                .count();
            while scope.len() > common {
                trace.pop_module()?;
                scope.pop();
            }
            for module in &path[common..] {
                trace.push_module(module)?;
                scope.push(module);
            }
            let local_name = name.rsplit('.').next().unwrap_or(name);
            signal_ids[index] = Some(trace.add_signal(local_name, bit_width)?);
        }
        for _ in scope.iter() {
            trace.pop_module()?;
        }
        trace.pop_module()?;

        Ok(Tracer {
            trace,
            signal_ids: signal_ids.into_iter().flatten().collect(),
            last_values: vec![None; tracked.len()],
        })
    }

    /// Records the current value of every tracked signal that changed since the last capture.
    pub fn capture(&mut self, sim: &Simulation) -> Result<()> {
        self.trace.update_time_stamp(sim.cycle())?;
        let tracked = sim.tracked();
        for ((_, _, value), (signal_id, last_value)) in tracked
            .into_iter()
            .zip(self.signal_ids.iter().zip(self.last_values.iter_mut()))
        {
            if *last_value != Some(value) {
                self.trace.update_signal(signal_id, value)?;
                *last_value = Some(value);
            }
        }
        Ok(())
    }

    pub fn trace(&self) -> &T {
        &self.trace
    }

    pub fn into_inner(self) -> T {
        self.trace
    }
}

fn scope_of(name: &str) -> Vec<&str> {
    let mut parts = name.split('.').collect::<Vec<_>>();
    parts.pop();
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::*;

    #[derive(Default)]
    struct TestTrace {
        events: Vec<String>,
        next_id: usize,
    }

    impl Trace for TestTrace {
        type SignalId = usize;

        fn push_module(&mut self, name: &str) -> io::Result<()> {
            self.events.push(format!("push {}", name));
            Ok(())
        }

        fn pop_module(&mut self) -> io::Result<()> {
            self.events.push("pop".into());
            Ok(())
        }

        fn add_signal(&mut self, name: &str, bit_width: u32) -> io::Result<usize> {
            self.events.push(format!("signal {} {}", name, bit_width));
            self.next_id += 1;
            Ok(self.next_id - 1)
        }

        fn update_time_stamp(&mut self, time_stamp: u64) -> io::Result<()> {
            self.events.push(format!("time {}", time_stamp));
            Ok(())
        }

        fn update_signal(&mut self, signal_id: &usize, value: u128) -> io::Result<()> {
            self.events.push(format!("update {} {}", signal_id, value));
            Ok(())
        }
    }

    #[test]
    fn nested_scopes_and_changes_only() {
        let c = Context::new();

        let clock = c.input("clock", 1).unwrap();
        let r = c.reg("r", 2, RegSpec::new(clock)).unwrap();
        r.drive_next(r.value.add(c.lit(1u32, 2).unwrap()).unwrap())
            .unwrap();
        let inner_o = c.output("o", r.value).unwrap();
        let inner = c.circuit("inner", &[inner_o]).unwrap();

        let inst = c.instance("inner_inst", inner).unwrap();
        let outer_clock = c.input("outer_clock", 1).unwrap();
        inst.drive_input("clock", outer_clock).unwrap();
        let o = c.output("o", inst.output("o").unwrap()).unwrap();
        let outer = c.circuit("outer", &[o]).unwrap();

        let mut sim = Simulation::new(outer).unwrap();
        let mut tracer = Tracer::new(&sim, TestTrace::default()).unwrap();
        tracer.capture(&sim).unwrap();
        tracer.capture(&sim).unwrap();
        sim.step();
        tracer.capture(&sim).unwrap();

        assert_eq!(
            tracer.into_inner().events,
            vec![
                "push outer",
                "signal outer_clock 1",
                "signal o 2",
                "push inner_inst",
                "signal r 2",
                "pop",
                "pop",
                "time 0",
                "update 0 0",
                "update 1 0",
                "update 2 0",
                "time 0",
                "time 1",
                "update 1 1",
                "update 2 1",
            ]
        );
    }
}
