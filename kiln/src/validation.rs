use crate::error::{Error, Location, Result};
use crate::graph::*;

use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Identifiers that can't be used as port names because the emitted Verilog would not parse.
pub(crate) const VERILOG_KEYWORDS: &[&str] = &[
    "always", "and", "assign", "automatic", "begin", "buf", "bufif0", "bufif1", "case", "casex",
    "casez", "cell", "cmos", "config", "deassign", "default", "defparam", "design", "disable",
    "edge", "else", "end", "endcase", "endconfig", "endfunction", "endgenerate", "endmodule",
    "endprimitive", "endspecify", "endtable", "endtask", "event", "for", "force", "forever",
    "fork", "function", "generate", "genvar", "highz0", "highz1", "if", "ifnone", "incdir",
    "include", "initial", "inout", "input", "instance", "integer", "join", "large", "liblist",
    "library", "localparam", "macromodule", "medium", "module", "nand", "negedge", "nmos", "nor",
    "noshowcancelled", "not", "notif0", "notif1", "or", "output", "parameter", "pmos", "posedge",
    "primitive", "pull0", "pull1", "pulldown", "pullup", "pulsestyle_ondetect",
    "pulsestyle_onevent", "rcmos", "real", "realtime", "reg", "release", "repeat", "rnmos",
    "rpmos", "rtran", "rtranif0", "rtranif1", "scalared", "showcancelled", "signed", "small",
    "specify", "specparam", "strong0", "strong1", "supply0", "supply1", "table", "task", "time",
    "tran", "tranif0", "tranif1", "tri", "tri0", "tri1", "triand", "trior", "trireg", "unsigned",
    "use", "uwire", "vectored", "wait", "wand", "weak0", "weak1", "while", "wire", "wor", "xnor",
    "xor",
];

/// Everything reachable from a circuit's outputs.
struct Reachable<'a> {
    signals: BTreeSet<SignalId>,
    inputs: Vec<&'a Signal<'a>>,
    registers: Vec<&'a Signal<'a>>,
    wires: Vec<&'a Signal<'a>>,
    mems: Vec<&'a Mem<'a>>,
    instances: Vec<&'a Instance<'a>>,
    undriven: Vec<(&'static str, String)>,
}

impl<'a> Reachable<'a> {
    fn gather(outputs: &[&'a Signal<'a>]) -> Reachable<'a> {
        let mut reachable = Reachable {
            signals: BTreeSet::new(),
            inputs: Vec::new(),
            registers: Vec::new(),
            wires: Vec::new(),
            mems: Vec::new(),
            instances: Vec::new(),
            undriven: Vec::new(),
        };
        let mut visited_mems = HashSet::new();
        let mut visited_instances = HashSet::new();

        let mut signals = outputs.iter().rev().copied().collect::<Vec<_>>();

        while let Some(signal) = signals.pop() {
            if !reachable.signals.insert(signal.id) {
                continue;
            }

            match signal.data {
                SignalData::Empty | SignalData::Lit { .. } => (),

                SignalData::Input { .. } => {
                    reachable.inputs.push(signal);
                }
                SignalData::Output { source, .. } => {
                    signals.push(source);
                }

                SignalData::Wire { data } => {
                    reachable.wires.push(signal);
                    match *data.driver.borrow() {
                        Some(driver) => signals.push(driver),
                        None => reachable.undriven.push(("wire", signal.describe())),
                    }
                }
                SignalData::Reg { data } => {
                    reachable.registers.push(signal);
                    signals.push(data.clock);
                    if let Some(clear) = data.clear {
                        signals.push(clear);
                    }
                    match *data.next.borrow() {
                        Some(next) => signals.push(next),
                        None => reachable.undriven.push(("register", data.name.clone())),
                    }
                }

                SignalData::UnOp { source, .. } => {
                    signals.push(source);
                }
                SignalData::BinOp { lhs, rhs, .. } => {
                    signals.push(rhs);
                    signals.push(lhs);
                }

                SignalData::Bits { source, .. } => {
                    signals.push(source);
                }

                SignalData::Repeat { source, .. } => {
                    signals.push(source);
                }
                SignalData::Concat { lhs, rhs } => {
                    signals.push(rhs);
                    signals.push(lhs);
                }

                SignalData::Mux {
                    cond,
                    when_true,
                    when_false,
                } => {
                    signals.push(when_false);
                    signals.push(when_true);
                    signals.push(cond);
                }

                SignalData::MemReadPort { mem, .. } => {
                    if !visited_mems.insert(mem) {
                        continue;
                    }
                    reachable.mems.push(mem);
                    signals.push(mem.clock);
                    if let Some(clear) = *mem.clear.borrow() {
                        signals.push(clear);
                    }
                    for port in mem.read_ports.borrow().iter() {
                        signals.push(port.address);
                        if let Some(enable) = port.enable {
                            signals.push(enable);
                        }
                    }
                    match *mem.write_port.borrow() {
                        Some(write_port) => {
                            signals.push(write_port.address);
                            signals.push(write_port.value);
                            signals.push(write_port.enable);
                        }
                        None => {
                            if mem.initial_contents.borrow().is_none() {
                                reachable.undriven.push(("memory", mem.name.clone()));
                            }
                        }
                    }
                }

                SignalData::InstanceOutput { instance, .. } => {
                    if !visited_instances.insert(instance) {
                        continue;
                    }
                    reachable.instances.push(instance);
                    for driver in instance.driven_inputs.borrow().values() {
                        signals.push(*driver);
                    }
                }
            }
        }

        reachable.inputs.sort_by_key(|input| input.id);

        reachable
    }

    /// Internal names declared more than once, in order of their second declaration.
    fn duplicate_internal_names(&self) -> Vec<String> {
        let names = self
            .registers
            .iter()
            .chain(self.wires.iter())
            .filter_map(|signal| signal.name())
            .chain(self.mems.iter().map(|mem| mem.name.as_str()))
            .chain(self.instances.iter().map(|instance| instance.name.as_str()));

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for name in names {
            if !seen.insert(name) && !duplicates.iter().any(|d| d == name) {
                duplicates.push(name.to_string());
            }
        }
        duplicates
    }

    /// Names the emitted RTL declares besides ports, mapped to what declares them.
    fn internal_names(&self) -> BTreeMap<String, &'static str> {
        let mut names = BTreeMap::new();
        for signal in self.registers.iter().chain(self.wires.iter()) {
            if let Some(name) = signal.name() {
                names.insert(name.to_string(), signal.data.kind_name());
            }
        }
        for mem in self.mems.iter() {
            names.insert(mem.name.clone(), "memory");
        }
        for instance in self.instances.iter() {
            names.insert(instance.name.clone(), "instance");
        }
        names
    }
}

/// Returns the closest legal Verilog identifier to `name`.
///
/// Illegal characters become `_`, and names that don't start with a letter or `_` get a `_` prefix.
pub fn legal_identifier(name: &str) -> String {
    let mut legal = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();
    let first = legal.chars().next();
    if !matches!(first, Some(c) if c.is_ascii_alphabetic() || c == '_') {
        legal.insert(0, '_');
    }
    legal
}

pub(crate) fn elaborate<'a>(
    context: &'a Context<'a>,
    name: String,
    outputs: &[&'a Signal<'a>],
) -> Result<Circuit<'a>> {
    let location = || Location::new(name.as_str());

    for (index, output) in outputs.iter().enumerate() {
        context.check_owns(output)?;
        if !matches!(output.data, SignalData::Output { .. }) {
            return Err(Error::NotAnOutput {
                location: location(),
                index,
            });
        }
    }

    let reachable = Reachable::gather(outputs);

    if let Some(&(kind, ref undriven)) = reachable.undriven.first() {
        return Err(Error::Undriven {
            location: location(),
            kind,
            name: undriven.clone(),
        });
    }

    let duplicates = reachable.duplicate_internal_names();
    if !duplicates.is_empty() {
        return Err(Error::DuplicateInternalName {
            location: location(),
            names: duplicates,
        });
    }

    let ports = reachable
        .inputs
        .iter()
        .chain(outputs.iter())
        .copied()
        .collect::<Vec<_>>();
    let port_names = ports
        .iter()
        .filter_map(|port| port.name())
        .collect::<Vec<_>>();

    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for port_name in port_names.iter() {
        if !seen.insert(*port_name) && !duplicates.contains(port_name) {
            duplicates.push(*port_name);
        }
    }
    if !duplicates.is_empty() {
        return Err(Error::DuplicatePortName {
            location: location(),
            names: duplicates.into_iter().map(String::from).collect(),
        });
    }

    for port_name in port_names.iter() {
        let legal = legal_identifier(port_name);
        if legal != *port_name {
            return Err(Error::IllegalPortName {
                location: location(),
                name: port_name.to_string(),
                legal,
            });
        }
    }

    let internal_names = reachable.internal_names();
    for port_name in port_names.iter() {
        let reason = if VERILOG_KEYWORDS.contains(port_name) {
            Some("Verilog keyword".to_string())
        } else {
            internal_names
                .get(*port_name)
                .map(|kind| format!("already the name of a {}", kind))
        };
        if let Some(reason) = reason {
            return Err(Error::ReservedPortName {
                location: location(),
                name: port_name.to_string(),
                reason,
            });
        }
    }

    for instance in reachable.instances.iter() {
        let driven_inputs = instance.driven_inputs.borrow();
        for input in instance.circuit.inputs.iter() {
            let port = input.name().unwrap_or_default();
            if !driven_inputs.contains_key(port) {
                return Err(Error::UnconnectedInstantiationPort {
                    location: Location::with_path(name.as_str(), vec![instance.name.clone()]),
                    instance: instance.name.clone(),
                    port: port.to_string(),
                });
            }
        }
    }

    for port in ports.iter() {
        if port.bit_width() == 0 {
            return Err(Error::ZeroWidthPort {
                location: location(),
                name: port.describe(),
            });
        }
    }
    for instance in reachable.instances.iter() {
        for (port, driver) in instance.driven_inputs.borrow().iter() {
            if driver.bit_width() == 0 {
                return Err(Error::ZeroWidthPort {
                    location: Location::with_path(name.as_str(), vec![instance.name.clone()]),
                    name: port.clone(),
                });
            }
        }
    }

    for signal in reachable.registers.iter() {
        if let SignalData::Reg { data } = signal.data {
            data.elaborated.set(true);
        }
    }
    for mem in reachable.mems.iter() {
        mem.elaborated.set(true);
    }

    log::debug!(
        "elaborated circuit \"{}\": {} signal(s), {} input(s), {} output(s), {} register(s), {} memory(s), {} instance(s)",
        name,
        reachable.signals.len(),
        reachable.inputs.len(),
        outputs.len(),
        reachable.registers.len(),
        reachable.mems.len(),
        reachable.instances.len()
    );

    Ok(Circuit {
        context,
        name,
        inputs: reachable.inputs,
        outputs: outputs.to_vec(),
        signals: reachable.signals,
        registers: reachable.registers,
        wires: reachable.wires,
        mems: reachable.mems,
        instances: reachable.instances,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_identifiers() {
        assert_eq!(legal_identifier("a"), "a");
        assert_eq!(legal_identifier("_a$1"), "_a$1");
        assert_eq!(legal_identifier("1^7"), "_1_7");
        assert_eq!(legal_identifier("$x"), "_$x");
        assert_eq!(legal_identifier("a b"), "a_b");
        assert_eq!(legal_identifier(""), "_");
    }

    #[test]
    fn duplicate_port_names_error() {
        let c = Context::new();

        let a1 = c.output("a", c.high()).unwrap();
        let a2 = c.output("a", c.low()).unwrap();
        let b = c.output("b", c.low()).unwrap();
        let a3 = c.output("a", c.low()).unwrap();

        let err = c.circuit("top", &[a1, a2, b, a3]).err().unwrap();
        assert_eq!(
            err.to_string(),
            "circuit \"top\": port names are not unique: (a)"
        );
    }

    #[test]
    fn duplicate_input_and_output_names_error() {
        let c = Context::new();

        let i = c.input("x", 1).unwrap();
        let o = c.output("x", i).unwrap();

        assert!(matches!(
            c.circuit("top", &[o]),
            Err(Error::DuplicatePortName { .. })
        ));
    }

    #[test]
    fn illegal_port_name_error() {
        let c = Context::new();

        let o = c.output("1^7", c.high()).unwrap();

        match c.circuit("top", &[o]) {
            Err(Error::IllegalPortName { name, legal, .. }) => {
                assert_eq!(name, "1^7");
                assert_eq!(legal, "_1_7");
            }
            _ => panic!("expected an illegal port name error"),
        }
    }

    #[test]
    fn keyword_port_name_error() {
        let c = Context::new();

        let o = c.output("module", c.high()).unwrap();

        assert!(matches!(
            c.circuit("top", &[o]),
            Err(Error::ReservedPortName { .. })
        ));
    }

    #[test]
    fn internal_name_clash_error() {
        let c = Context::new();

        let clock = c.input("clock", 1).unwrap();
        let r = c.reg("count", 4, RegSpec::new(clock)).unwrap();
        r.drive_next(r.value).unwrap();
        let o = c.output("count", r.value).unwrap();

        let err = c.circuit("top", &[o]).err().unwrap();
        assert_eq!(
            err.to_string(),
            "circuit \"top\": port name \"count\" is reserved (already the name of a reg)"
        );
    }

    #[test]
    fn duplicate_internal_names_error() {
        let c = Context::new();

        let clock = c.input("clock", 1).unwrap();
        let a = c.reg("q", 4, RegSpec::new(clock)).unwrap();
        a.drive_next(a.value).unwrap();
        let b = c.reg("q", 4, RegSpec::new(clock)).unwrap();
        b.drive_next(b.value).unwrap();
        let mem = c.mem("q", 2, 4, clock).unwrap();
        mem.initial_contents(&[0u32, 1u32]).unwrap();
        let read_data = mem.async_read_port(c.input("addr", 1).unwrap()).unwrap();
        let o = c
            .output("o", a.value.add(b.value).unwrap().add(read_data).unwrap())
            .unwrap();

        let err = c.circuit("top", &[o]).err().unwrap();
        assert_eq!(
            err.to_string(),
            "circuit \"top\": internal names are not unique: (q)"
        );
    }

    #[test]
    fn failed_elaboration_leaves_state_elements_editable() {
        let c = Context::new();

        let r = c.reg("r", 1, RegSpec::new(c.high())).unwrap();
        let o = c.output("o", r.value).unwrap();
        assert!(c.circuit("top", &[o]).is_err());

        r.default_value(true).unwrap();
        r.drive_next(r.value).unwrap();
        assert!(c.circuit("top", &[o]).is_ok());
    }

    #[test]
    fn not_an_output_error() {
        let c = Context::new();

        let o = c.output("o", c.high()).unwrap();

        assert!(matches!(
            c.circuit("top", &[o, c.low()]),
            Err(Error::NotAnOutput { index: 1, .. })
        ));
    }

    #[test]
    fn undriven_register_error() {
        let c = Context::new();

        let r = c.reg("r", 1, RegSpec::new(c.high())).unwrap();
        let o = c.output("o", r.value).unwrap();

        let err = c.circuit("top", &[o]).err().unwrap();
        assert_eq!(
            err.to_string(),
            "circuit \"top\": register \"r\" is not driven"
        );
    }

    #[test]
    fn undriven_mem_error() {
        let c = Context::new();

        let mem = c.mem("mem", 2, 1, c.high()).unwrap();
        let o = c
            .output("o", mem.read_port(c.low(), c.high()).unwrap())
            .unwrap();

        assert!(matches!(
            c.circuit("top", &[o]),
            Err(Error::Undriven {
                kind: "memory",
                ..
            })
        ));
    }

    #[test]
    fn unconnected_instantiation_port_error() {
        let c = Context::new();

        let i = c.input("i", 1).unwrap();
        let inner_o = c.output("o", i).unwrap();
        let inner = c.circuit("inner", &[inner_o]).unwrap();

        let inst = c.instance("inner_inst", inner).unwrap();
        let o = c.output("o", inst.output("o").unwrap()).unwrap();

        match c.circuit("outer", &[o]) {
            Err(Error::UnconnectedInstantiationPort {
                location,
                instance,
                port,
            }) => {
                assert_eq!(location.path, vec!["inner_inst".to_string()]);
                assert_eq!(instance, "inner_inst");
                assert_eq!(port, "i");
            }
            _ => panic!("expected an unconnected instantiation port error"),
        }
    }

    #[test]
    fn zero_width_instance_input_error() {
        let c = Context::new();

        let i = c.input("i", 1).unwrap();
        let inner_o = c.output("o", i).unwrap();
        let inner = c.circuit("inner", &[inner_o]).unwrap();

        let inst = c.instance("inner_inst", inner).unwrap();
        inst.drive_input("i", c.empty()).unwrap();
        let o = c.output("o", inst.output("o").unwrap()).unwrap();

        assert!(matches!(
            c.circuit("outer", &[o]),
            Err(Error::ZeroWidthPort { .. })
        ));
    }

    #[test]
    fn duplicates_checked_before_legality() {
        let c = Context::new();

        let a = c.output("1^7", c.high()).unwrap();
        let b = c.output("1^7", c.low()).unwrap();

        assert!(matches!(
            c.circuit("top", &[a, b]),
            Err(Error::DuplicatePortName { .. })
        ));
    }
}
