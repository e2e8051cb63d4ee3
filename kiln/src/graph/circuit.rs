use super::context::*;
use super::instance::*;
use super::mem::*;
use super::signal::*;

use std::collections::BTreeSet;

/// An immutable, elaborated circuit, created by [`Context::circuit`](crate::Context::circuit).
///
/// A `Circuit` names a closure of the signal graph: its ordered output ports, the input ports they depend on, and every signal, register, memory and instance reachable from them.
/// Signals are not copied; the circuit holds their ids and borrows the graph from its [`Context`].
#[must_use]
pub struct Circuit<'a> {
    pub(crate) context: &'a Context<'a>,

    pub(crate) name: String,
    pub(crate) inputs: Vec<&'a Signal<'a>>,
    pub(crate) outputs: Vec<&'a Signal<'a>>,
    pub(crate) signals: BTreeSet<SignalId>,
    pub(crate) registers: Vec<&'a Signal<'a>>,
    pub(crate) wires: Vec<&'a Signal<'a>>,
    pub(crate) mems: Vec<&'a Mem<'a>>,
    pub(crate) instances: Vec<&'a Instance<'a>>,
}

impl<'a> Circuit<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// This circuit's input ports, in creation order.
    pub fn inputs(&self) -> &[&'a Signal<'a>] {
        &self.inputs
    }

    /// This circuit's output ports, in the order they were given to [`Context::circuit`](crate::Context::circuit).
    pub fn outputs(&self) -> &[&'a Signal<'a>] {
        &self.outputs
    }

    /// Looks up an input port by name.
    pub fn input(&self, name: &str) -> Option<&'a Signal<'a>> {
        find_port(&self.inputs, name)
    }

    /// Looks up an output port by name.
    pub fn output(&self, name: &str) -> Option<&'a Signal<'a>> {
        find_port(&self.outputs, name)
    }

    /// Returns `true` if `id` belongs to this circuit's reachable closure.
    pub fn contains(&self, id: SignalId) -> bool {
        self.signals.contains(&id)
    }

    /// Ids of every signal in this circuit, in creation order.
    pub fn signal_ids(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.signals.iter().copied()
    }

    /// Instances of other circuits used by this circuit, in discovery order.
    pub fn instances(&self) -> &[&'a Instance<'a>] {
        &self.instances
    }

    pub fn mems(&self) -> &[&'a Mem<'a>] {
        &self.mems
    }
}

fn find_port<'a>(ports: &[&'a Signal<'a>], name: &str) -> Option<&'a Signal<'a>> {
    ports.iter().copied().find(|port| port.name() == Some(name))
}
