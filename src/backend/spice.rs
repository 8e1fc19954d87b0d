use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::backend::{write_library, NetlistBackend};
use crate::error::Result;
use crate::netlist::Library;

pub struct SpiceBackend<W: Write> {
    out: W,
}

impl<W: Write> SpiceBackend<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> NetlistBackend for SpiceBackend<W> {
    fn comment(&mut self, comment: &str) -> Result<()> {
        writeln!(self.out, "* {}", comment)?;
        Ok(())
    }

    fn subcircuit(&mut self, name: &str, ports: &[&str]) -> Result<()> {
        writeln!(self.out)?;
        write!(self.out, ".subckt {}", name)?;
        for port in ports {
            write!(self.out, " {}", *port)?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    fn end_subcircuit(&mut self) -> Result<()> {
        writeln!(self.out, ".ends")?;
        Ok(())
    }

    fn instance(
        &mut self,
        name: &str,
        terminals: &[&str],
        cell: &str,
        params: &[(&str, &str)],
    ) -> Result<()> {
        write!(self.out, "{}", name)?;

        for t in terminals {
            write!(self.out, " {}", *t)?;
        }

        write!(self.out, " {}", cell)?;

        for (key, value) in params {
            write!(self.out, " {}={}", key, value)?;
        }

        writeln!(self.out)?;

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, ".end")?;
        self.out.flush()?;
        Ok(())
    }
}

impl Library {
    pub fn to_spice(&self) -> Result<String> {
        let mut backend = SpiceBackend::new(Vec::new());
        write_library(self, &mut backend)?;
        Ok(String::from_utf8_lossy(&backend.into_inner()).into_owned())
    }

    pub fn save_spice(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut backend = SpiceBackend::new(BufWriter::new(File::create(path)?));
        write_library(self, &mut backend)?;
        log::info!("wrote SPICE netlist to {:?}", path);
        Ok(())
    }
}
