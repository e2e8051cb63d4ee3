use crate::code_writer::CodeWriter;
use crate::validation::VERILOG_KEYWORDS;

use std::collections::HashSet;
use std::fmt;
use std::io::{Result, Write};

/// `[high:low] ` for multi-bit declarations, nothing for scalars.
pub fn range(bit_width: u32) -> String {
    if bit_width > 1 {
        format!("[{}:0] ", bit_width - 1)
    } else {
        String::new()
    }
}

/// Identifiers already used in one module.
pub struct Names {
    used: HashSet<String>,
}

impl Names {
    pub fn new() -> Names {
        Names {
            used: HashSet::new(),
        }
    }

    /// Reserves `name` as-is. Port names are validated to be unique before emission.
    pub fn reserve(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }

    /// Reserves `base` if it's free, otherwise the first free `base_N`.
    pub fn claim(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut suffix = 1;
        while self.used.contains(&name) || VERILOG_KEYWORDS.contains(&name.as_str()) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        self.used.insert(name.clone());
        name
    }
}

pub struct NodeDecl {
    pub kind: &'static str,
    pub name: String,
    pub bit_width: u32,
}

impl NodeDecl {
    pub fn write<W: Write>(&self, w: &mut CodeWriter<W>) -> Result<()> {
        w.append_line(&format!(
            "{} {}{};",
            self.kind,
            range(self.bit_width),
            self.name
        ))
    }
}

/// Continuous assignments for one module, plus the temporaries they introduce.
pub struct AssignmentContext {
    assignments: Vec<Assignment>,
    local_decls: Vec<NodeDecl>,
}

impl AssignmentContext {
    pub fn new() -> AssignmentContext {
        AssignmentContext {
            assignments: Vec::new(),
            local_decls: Vec::new(),
        }
    }

    pub fn gen_temp(&mut self, expr: Expr, bit_width: u32, names: &mut Names) -> Expr {
        let name = names.claim(&format!("__temp_{}", self.local_decls.len()));

        self.local_decls.push(NodeDecl {
            kind: "wire",
            name: name.clone(),
            bit_width,
        });

        self.assignments.push(Assignment {
            target_name: name.clone(),
            expr,
        });

        Expr::Ref { name }
    }

    pub fn push(&mut self, assignment: Assignment) {
        self.assignments.push(assignment);
    }

    pub fn write<W: Write>(&self, w: &mut CodeWriter<W>) -> Result<()> {
        if !self.local_decls.is_empty() {
            for node_decl in self.local_decls.iter() {
                node_decl.write(w)?;
            }
            w.append_newline()?;
        }

        if !self.assignments.is_empty() {
            for assignment in self.assignments.iter() {
                w.append_line(&format!(
                    "assign {} = {};",
                    assignment.target_name, assignment.expr
                ))?;
            }
            w.append_newline()?;
        }

        Ok(())
    }
}

pub struct Assignment {
    pub target_name: String,
    pub expr: Expr,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expr {
    BinOp {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        op: BinOp,
    },
    Bits {
        source: Box<Expr>,
        range_high: u32,
        range_low: u32,
    },
    Concat {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Constant {
        bit_width: u32,
        value: u128,
    },
    Index {
        name: String,
        index: Box<Expr>,
    },
    Ref {
        name: String,
    },
    Repeat {
        source: Box<Expr>,
        count: u32,
    },
    Ternary {
        cond: Box<Expr>,
        when_true: Box<Expr>,
        when_false: Box<Expr>,
    },
    UnOp {
        source: Box<Expr>,
        op: UnOp,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::BinOp { lhs, rhs, op } => write!(f, "{} {} {}", lhs, op, rhs),
            Expr::Bits {
                source,
                range_high,
                range_low,
            } => {
                if range_high != range_low {
                    write!(f, "{}[{}:{}]", source, range_high, range_low)
                } else {
                    write!(f, "{}[{}]", source, range_high)
                }
            }
            Expr::Concat { lhs, rhs } => write!(f, "{{{}, {}}}", lhs, rhs),
            Expr::Constant { bit_width, value } => write!(f, "{}'h{:x}", bit_width, value),
            Expr::Index { name, index } => write!(f, "{}[{}]", name, index),
            Expr::Ref { name } => write!(f, "{}", name),
            Expr::Repeat { source, count } => write!(f, "{{{}{{{}}}}}", count, source),
            Expr::Ternary {
                cond,
                when_true,
                when_false,
            } => write!(f, "{} ? {} : {}", cond, when_true, when_false),
            Expr::UnOp { source, op } => write!(f, "{}{}", op, source),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinOp {
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

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOp::Add => "+",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Equal => "==",
            BinOp::NotEqual => "!=",
            BinOp::LessThan => "<",
            BinOp::LessThanEqual => "<=",
            BinOp::GreaterThan => ">",
            BinOp::GreaterThanEqual => ">=",
            BinOp::Sub => "-",
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnOp {
    Not,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnOp::Not => "~",
        })
    }
}

pub struct PortDecl {
    pub direction: &'static str,
    pub name: String,
    pub bit_width: u32,
}

pub enum Statement {
    /// `=`, for `initial` blocks.
    Blocking { target: Expr, expr: Expr },
    /// `<=`, for clocked blocks.
    NonBlocking { target: Expr, expr: Expr },
    If {
        cond: Expr,
        then: Vec<Statement>,
        otherwise: Vec<Statement>,
    },
}

impl Statement {
    pub fn write<W: Write>(&self, w: &mut CodeWriter<W>) -> Result<()> {
        match self {
            Statement::Blocking { target, expr } => {
                w.append_line(&format!("{} = {};", target, expr))
            }
            Statement::NonBlocking { target, expr } => {
                w.append_line(&format!("{} <= {};", target, expr))
            }
            Statement::If {
                cond,
                then,
                otherwise,
            } => {
                w.block(&format!("if ({}) begin", cond), "end", |w| {
                    write_statements(then, w)
                })?;
                if !otherwise.is_empty() {
                    w.block("else begin", "end", |w| write_statements(otherwise, w))?;
                }
                Ok(())
            }
        }
    }
}

fn write_statements<W: Write>(statements: &[Statement], w: &mut CodeWriter<W>) -> Result<()> {
    for statement in statements.iter() {
        statement.write(w)?;
    }
    Ok(())
}

pub struct AlwaysBlock {
    pub clock: Expr,
    pub statements: Vec<Statement>,
}

pub struct InstanceDecl {
    pub module_name: String,
    pub name: String,
    pub connections: Vec<(String, Expr)>,
}

impl InstanceDecl {
    pub fn write<W: Write>(&self, w: &mut CodeWriter<W>) -> Result<()> {
        w.append_line(&format!("{} {}(", self.module_name, self.name))?;
        w.indent();
        for (i, (port, expr)) in self.connections.iter().enumerate() {
            let separator = if i + 1 < self.connections.len() { "," } else { "" };
            w.append_line(&format!(".{}({}){}", port, expr, separator))?;
        }
        w.unindent()?;
        w.append_line(");")?;
        w.append_newline()
    }
}

/// Everything emitted for one circuit.
pub struct Module {
    pub name: String,
    pub ports: Vec<PortDecl>,
    pub decls: Vec<NodeDecl>,
    pub assignments: AssignmentContext,
    pub instances: Vec<InstanceDecl>,
    pub initial: Vec<Statement>,
    pub always: Vec<AlwaysBlock>,
}

impl Module {
    pub fn write<W: Write>(&self, w: &mut CodeWriter<W>) -> Result<()> {
        if self.ports.is_empty() {
            w.append_line(&format!("module {};", self.name))?;
        } else {
            w.append_line(&format!("module {}(", self.name))?;
            w.indent();
            for (i, port) in self.ports.iter().enumerate() {
                let separator = if i + 1 < self.ports.len() { "," } else { "" };
                w.append_line(&format!(
                    "{} wire {}{}{}",
                    port.direction,
                    range(port.bit_width),
                    port.name,
                    separator
                ))?;
            }
            w.unindent()?;
            w.append_line(");")?;
        }
        w.append_newline()?;
        w.indent();

        if !self.decls.is_empty() {
            for decl in self.decls.iter() {
                decl.write(w)?;
            }
            w.append_newline()?;
        }

        self.assignments.write(w)?;

        for instance in self.instances.iter() {
            instance.write(w)?;
        }

        if !self.initial.is_empty() {
            w.block("initial begin", "end", |w| write_statements(&self.initial, w))?;
            w.append_newline()?;
        }

        for always in self.always.iter() {
            w.block(
                &format!("always @(posedge {}) begin", always.clock),
                "end",
                |w| write_statements(&always.statements, w),
            )?;
            w.append_newline()?;
        }

        w.unindent()?;
        w.append_line("endmodule")?;
        w.append_newline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(name: &str) -> Box<Expr> {
        Box::new(Expr::Ref { name: name.into() })
    }

    #[test]
    fn expr_formatting() {
        assert_eq!(
            Expr::Constant {
                bit_width: 8,
                value: 0xab
            }
            .to_string(),
            "8'hab"
        );
        assert_eq!(
            Expr::Repeat {
                source: name("a"),
                count: 3
            }
            .to_string(),
            "{3{a}}"
        );
        assert_eq!(
            Expr::Concat {
                lhs: name("a"),
                rhs: name("b")
            }
            .to_string(),
            "{a, b}"
        );
        assert_eq!(
            Expr::Bits {
                source: name("a"),
                range_high: 3,
                range_low: 3
            }
            .to_string(),
            "a[3]"
        );
        assert_eq!(
            Expr::Bits {
                source: name("a"),
                range_high: 7,
                range_low: 4
            }
            .to_string(),
            "a[7:4]"
        );
        assert_eq!(
            Expr::Ternary {
                cond: name("c"),
                when_true: name("a"),
                when_false: Box::new(Expr::UnOp {
                    source: name("b"),
                    op: UnOp::Not
                }),
            }
            .to_string(),
            "c ? a : ~b"
        );
    }

    #[test]
    fn names_avoid_collisions_and_keywords() {
        let mut names = Names::new();
        names.reserve("count");

        assert_eq!(names.claim("count"), "count_1");
        assert_eq!(names.claim("count"), "count_2");
        assert_eq!(names.claim("module"), "module_1");
        assert_eq!(names.claim("r"), "r");
    }
}
