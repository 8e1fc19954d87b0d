use std::collections::HashSet;

use arcstr::ArcStr;
use itertools::Itertools;

use crate::error::{NetlistError, Result};
use crate::netlist::{Instance, Library, Subckt};

pub mod spice;

pub trait NetlistBackend {
    fn comment(&mut self, comment: &str) -> Result<()>;
    fn subcircuit(&mut self, name: &str, ports: &[&str]) -> Result<()>;
    fn end_subcircuit(&mut self) -> Result<()>;
    fn instance(
        &mut self,
        name: &str,
        terminals: &[&str],
        cell: &str,
        params: &[(&str, &str)],
    ) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// Writes every cell of `lib` to `backend`.
///
/// External cells become comments. Subcircuits are written children first.
pub fn write_library(lib: &Library, backend: &mut impl NetlistBackend) -> Result<()> {
    for line in lib.header.iter() {
        backend.comment(line)?;
    }
    for external in lib.externals() {
        backend.comment(&format!(
            "external cell {}: {}",
            external.name,
            external.ports.iter().join(" ")
        ))?;
    }

    for subckt in dependency_order(lib)? {
        let ports = subckt.ports.iter().map(ArcStr::as_str).collect::<Vec<_>>();
        backend.subcircuit(&subckt.name, &ports)?;
        for inst in subckt.instances.iter() {
            write_instance(inst, backend)?;
        }
        backend.end_subcircuit()?;
    }

    for inst in lib.top_instances.iter() {
        write_instance(inst, backend)?;
    }

    backend.finish()
}

fn write_instance(inst: &Instance, backend: &mut impl NetlistBackend) -> Result<()> {
    let terminals = inst
        .connections
        .iter()
        .map(ArcStr::as_str)
        .collect::<Vec<_>>();
    let params = inst
        .params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect::<Vec<_>>();
    backend.instance(&inst.name, &terminals, &inst.child, &params)
}

/// Orders subcircuits so that every cell appears after the cells it instantiates.
///
/// Ties keep library order.
pub fn dependency_order(lib: &Library) -> Result<Vec<&Subckt>> {
    let mut order = Vec::new();
    let mut done = HashSet::new();
    let mut visiting = HashSet::new();
    for subckt in lib.subckts() {
        visit(lib, subckt, &mut visiting, &mut done, &mut order)?;
    }
    Ok(order)
}

fn visit<'a>(
    lib: &'a Library,
    subckt: &'a Subckt,
    visiting: &mut HashSet<&'a str>,
    done: &mut HashSet<&'a str>,
    order: &mut Vec<&'a Subckt>,
) -> Result<()> {
    if done.contains(subckt.name.as_str()) {
        return Ok(());
    }
    if !visiting.insert(subckt.name.as_str()) {
        return Err(NetlistError::RecursiveCell(subckt.name.clone()));
    }
    for inst in subckt.instances.iter() {
        if let Some(child) = lib.subckt(&inst.child) {
            visit(lib, child, visiting, done, order)?;
        }
    }
    visiting.remove(subckt.name.as_str());
    done.insert(subckt.name.as_str());
    order.push(subckt);
    Ok(())
}
