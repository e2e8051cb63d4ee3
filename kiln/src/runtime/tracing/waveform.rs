use super::Trace;

use std::io;

/// One signal recorded by a [`Waveform`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WaveformSignal {
    /// Qualified with the path of the instances containing the signal, not including the traced circuit itself.
    pub name: String,
    pub bit_width: u32,
    /// `(time stamp, value)` pairs in time order, one per change.
    pub changes: Vec<(u64, u128)>,
}

/// An in-memory [`Trace`], for inspecting signal history from tests.
#[derive(Debug, Default)]
pub struct Waveform {
    scope: Vec<String>,
    signals: Vec<WaveformSignal>,
    time_stamp: u64,
}

impl Waveform {
    pub fn new() -> Waveform {
        Waveform::default()
    }

    pub fn signals(&self) -> &[WaveformSignal] {
        &self.signals
    }

    pub fn signal(&self, name: &str) -> Option<&WaveformSignal> {
        self.signals.iter().find(|signal| signal.name == name)
    }

    /// Value of the signal called `name` at `time_stamp`, or `None` if no such signal was recorded by then.
    pub fn value_at(&self, name: &str, time_stamp: u64) -> Option<u128> {
        self.signal(name)?
            .changes
            .iter()
            .take_while(|&&(time, _)| time <= time_stamp)
            .last()
            .map(|&(_, value)| value)
    }
}

impl Trace for Waveform {
    type SignalId = usize;

    fn push_module(&mut self, name: &str) -> io::Result<()> {
        self.scope.push(name.to_string());
        Ok(())
    }

    fn pop_module(&mut self) -> io::Result<()> {
        self.scope.pop();
        Ok(())
    }

    fn add_signal(&mut self, name: &str, bit_width: u32) -> io::Result<usize> {
        let mut path = self.scope.iter().skip(1).cloned().collect::<Vec<_>>();
        path.push(name.to_string());
        self.signals.push(WaveformSignal {
            name: path.join("."),
            bit_width,
            changes: Vec::new(),
        });
        Ok(self.signals.len() - 1)
    }

    fn update_time_stamp(&mut self, time_stamp: u64) -> io::Result<()> {
        self.time_stamp = time_stamp;
        Ok(())
    }

    fn update_signal(&mut self, signal_id: &usize, value: u128) -> io::Result<()> {
        let time_stamp = self.time_stamp;
        let changes = &mut self.signals[*signal_id].changes;
        match changes.last_mut() {
            Some(last) if last.0 == time_stamp => last.1 = value,
            _ => changes.push((time_stamp, value)),
        }
        Ok(())
    }
}
