use std::io;

/// Line-oriented text output with four-space indentation.
pub(crate) struct CodeWriter<W: io::Write> {
    w: W,
    indent_level: u32,
}

impl<W: io::Write> CodeWriter<W> {
    pub fn new(w: W) -> CodeWriter<W> {
        CodeWriter { w, indent_level: 0 }
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn unindent(&mut self) -> io::Result<()> {
        if self.indent_level == 0 {
            return Err(io::Error::other("indent underflow"));
        }
        self.indent_level -= 1;
        Ok(())
    }

    pub fn append_indent(&mut self) -> io::Result<()> {
        for _ in 0..self.indent_level {
            write!(self.w, "    ")?;
        }
        Ok(())
    }

    pub fn append_newline(&mut self) -> io::Result<()> {
        writeln!(self.w)
    }

    pub fn append(&mut self, s: &str) -> io::Result<()> {
        write!(self.w, "{}", s)
    }

    pub fn append_line(&mut self, s: &str) -> io::Result<()> {
        self.append_indent()?;
        self.append(s)?;
        self.append_newline()
    }

    /// Writes `header`, then the lines `body` produces one level deeper, then `footer`.
    pub fn block(
        &mut self,
        header: &str,
        footer: &str,
        body: impl FnOnce(&mut Self) -> io::Result<()>,
    ) -> io::Result<()> {
        self.append_line(header)?;
        self.indent();
        body(self)?;
        self.unindent()?;
        self.append_line(footer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_blocks() {
        let mut buffer = Vec::new();
        let mut w = CodeWriter::new(&mut buffer);
        w.block("begin", "end", |w| {
            w.append_line("a;")?;
            w.block("begin", "end", |w| w.append_line("b;"))
        })
        .unwrap();

        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "begin\n    a;\n    begin\n        b;\n    end\nend\n"
        );
    }

    #[test]
    fn unindent_underflow_error() {
        let mut w = CodeWriter::new(Vec::new());
        assert!(w.unindent().is_err());
    }
}
