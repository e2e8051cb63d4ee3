use super::ir::*;

use crate::graph::ReadPortKind;

pub(crate) struct RegisterState {
    pub name: String,
    pub default_value: u128,
    pub next: NodeIndex,
    pub clear: Option<NodeIndex>,
}

pub(crate) struct ReadPortState {
    pub kind: ReadPortKind,
    pub address: NodeIndex,
    /// Unused by combinational ports.
    pub enable: Option<NodeIndex>,
}

#[derive(Clone, Copy)]
pub(crate) struct WritePortState {
    pub address: NodeIndex,
    pub value: NodeIndex,
    pub enable: NodeIndex,
}

pub(crate) struct MemState {
    pub name: String,
    pub initial_contents: Vec<u128>,
    pub read_ports: Vec<ReadPortState>,
    pub write_port: Option<WritePortState>,
    pub clear: Option<NodeIndex>,
}

/// Values held across clock edges: one slot per register, plus contents and read port data per memory.
pub(crate) struct StateValues {
    pub registers: Vec<u128>,
    pub mem_contents: Vec<Vec<u128>>,
    pub mem_read_data: Vec<Vec<u128>>,
}

impl StateValues {
    pub fn new(registers: &[RegisterState], mems: &[MemState]) -> StateValues {
        let mut state = StateValues {
            registers: Vec::new(),
            mem_contents: Vec::new(),
            mem_read_data: Vec::new(),
        };
        state.reset(registers, mems);
        state
    }

    pub fn reset(&mut self, registers: &[RegisterState], mems: &[MemState]) {
        self.registers = registers.iter().map(|reg| reg.default_value).collect();
        self.mem_contents = mems
            .iter()
            .map(|mem| mem.initial_contents.clone())
            .collect();
        self.mem_read_data = mems.iter().map(|mem| vec![0; mem.read_ports.len()]).collect();
    }

    /// Performs one clock edge, reading every node value from `values`.
    ///
    /// All next values are computed from the state before the edge, then committed together.
    pub fn posedge_clk(&mut self, registers: &[RegisterState], mems: &[MemState], values: &[u128]) {
        let next_registers = registers
            .iter()
            .map(|reg| {
                let clear = reg.clear.map(|clear| values[clear] != 0).unwrap_or(false);
                if clear {
                    reg.default_value
                } else {
                    values[reg.next]
                }
            })
            .collect::<Vec<_>>();

        for (index, mem) in mems.iter().enumerate() {
            if mem.clear.map(|clear| values[clear] != 0).unwrap_or(false) {
                self.mem_contents[index].clone_from(&mem.initial_contents);
                self.mem_read_data[index].iter_mut().for_each(|data| *data = 0);
                continue;
            }

            let write = mem
                .write_port
                .filter(|port| values[port.enable] != 0)
                .map(|port| (values[port.address], values[port.value]));

            let contents = &self.mem_contents[index];
            let read_data = &mut self.mem_read_data[index];
            for (port_index, port) in mem.read_ports.iter().enumerate() {
                let enabled = match (port.kind, port.enable) {
                    (ReadPortKind::Combinational, _) | (_, None) => false,
                    (_, Some(enable)) => values[enable] != 0,
                };
                if !enabled {
                    continue;
                }
                let address = values[port.address];
                read_data[port_index] = match write {
                    Some((write_address, write_value))
                        if port.kind == ReadPortKind::WriteThrough
                            && write_address == address =>
                    {
                        write_value
                    }
                    _ => read_element(contents, address),
                };
            }

            if let Some((address, value)) = write {
                let contents = &mut self.mem_contents[index];
                if let Some(element) = usize::try_from(address)
                    .ok()
                    .and_then(|address| contents.get_mut(address))
                {
                    *element = value;
                }
            }
        }

        self.registers = next_registers;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem(kind: ReadPortKind) -> MemState {
        MemState {
            name: "mem".into(),
            initial_contents: vec![10, 20, 30, 40],
            read_ports: vec![ReadPortState {
                kind,
                address: 0,
                enable: Some(1),
            }],
            write_port: Some(WritePortState {
                address: 2,
                value: 3,
                enable: 4,
            }),
            clear: None,
        }
    }

    #[test]
    fn registered_read_sees_old_data() {
        let mems = [mem(ReadPortKind::Registered)];
        let mut state = StateValues::new(&[], &mems);

        // read addr 1, write 99 to addr 1
        state.posedge_clk(&[], &mems, &[1, 1, 1, 99, 1]);
        assert_eq!(state.mem_read_data[0][0], 20);
        assert_eq!(state.mem_contents[0][1], 99);
    }

    #[test]
    fn write_through_read_sees_new_data() {
        let mems = [mem(ReadPortKind::WriteThrough)];
        let mut state = StateValues::new(&[], &mems);

        state.posedge_clk(&[], &mems, &[1, 1, 1, 99, 1]);
        assert_eq!(state.mem_read_data[0][0], 99);
    }

    #[test]
    fn disabled_read_holds() {
        let mems = [mem(ReadPortKind::Registered)];
        let mut state = StateValues::new(&[], &mems);

        state.posedge_clk(&[], &mems, &[3, 1, 0, 0, 0]);
        assert_eq!(state.mem_read_data[0][0], 40);
        state.posedge_clk(&[], &mems, &[0, 0, 0, 0, 0]);
        assert_eq!(state.mem_read_data[0][0], 40);
    }

    #[test]
    fn out_of_range_write_is_ignored() {
        let mems = [mem(ReadPortKind::Registered)];
        let mut state = StateValues::new(&[], &mems);

        state.posedge_clk(&[], &mems, &[0, 0, 7, 99, 1]);
        assert_eq!(state.mem_contents[0], vec![10, 20, 30, 40]);
    }

    #[test]
    fn mem_clear_dominates_write() {
        let mems = [MemState {
            clear: Some(5),
            ..mem(ReadPortKind::Registered)
        }];
        let mut state = StateValues::new(&[], &mems);

        state.posedge_clk(&[], &mems, &[1, 1, 1, 99, 1, 0]);
        assert_eq!(state.mem_contents[0], vec![10, 99, 30, 40]);
        assert_eq!(state.mem_read_data[0][0], 20);

        // read addr 2, write 77 to addr 3, clear
        state.posedge_clk(&[], &mems, &[2, 1, 3, 77, 1, 1]);
        assert_eq!(state.mem_contents[0], vec![10, 20, 30, 40]);
        assert_eq!(state.mem_read_data[0][0], 0);
    }

    #[test]
    fn clear_dominates_next() {
        let registers = [RegisterState {
            name: "r".into(),
            default_value: 5,
            next: 0,
            clear: Some(1),
        }];
        let mut state = StateValues::new(&registers, &[]);

        state.posedge_clk(&registers, &[], &[42, 0]);
        assert_eq!(state.registers[0], 42);
        state.posedge_clk(&registers, &[], &[42, 1]);
        assert_eq!(state.registers[0], 5);
    }
}
