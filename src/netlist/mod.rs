//! In-memory SPICE subcircuit netlists.
//!
//! A [`Library`] holds subcircuit definitions and external cell declarations.
//! Instances bind nets to the ports of their child cell by position.

use std::collections::HashMap;
use std::path::PathBuf;

use arcstr::ArcStr;
use serde::Serialize;

pub mod connectivity;
pub mod flatten;
pub mod parser;
pub mod report;
pub mod validate;

/// A collection of cells.
///
/// Cells are kept in insertion order. Duplicate definitions are retained so
/// that [`validate`](validate::validate) can report them; lookups by name
/// return the first definition.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct Library {
    /// Comment lines emitted at the top of the netlist.
    pub header: Vec<ArcStr>,
    cells: Vec<Cell>,
    #[serde(skip)]
    index: HashMap<ArcStr, usize>,
    /// Instances found outside of any subcircuit.
    pub top_instances: Vec<Instance>,
    /// Files pulled in through `.include`.
    pub includes: Vec<PathBuf>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cell {
    Subckt(Subckt),
    /// A cell whose contents are defined elsewhere.
    External(External),
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct Subckt {
    pub name: ArcStr,
    pub ports: Vec<ArcStr>,
    pub instances: Vec<Instance>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct External {
    pub name: ArcStr,
    pub ports: Vec<ArcStr>,
}

/// A subcircuit instance (an `X` line).
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Instance {
    /// The instance name, including the leading `X`.
    pub name: ArcStr,
    /// The name of the instantiated cell.
    pub child: ArcStr,
    /// Nets bound to the child's ports, in port order.
    pub connections: Vec<ArcStr>,
    /// `key=value` parameters, in source order.
    pub params: Vec<(ArcStr, ArcStr)>,
}

impl Library {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cell(&mut self, cell: impl Into<Cell>) {
        let cell = cell.into();
        self.index
            .entry(cell.name().clone())
            .or_insert(self.cells.len());
        self.cells.push(cell);
    }

    pub fn cell(&self, name: &str) -> Option<&Cell> {
        self.index.get(name).map(|&i| &self.cells[i])
    }

    pub fn subckt(&self, name: &str) -> Option<&Subckt> {
        match self.cell(name)? {
            Cell::Subckt(s) => Some(s),
            Cell::External(_) => None,
        }
    }

    #[inline]
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    pub fn subckts(&self) -> impl Iterator<Item = &Subckt> {
        self.cells.iter().filter_map(|cell| match cell {
            Cell::Subckt(s) => Some(s),
            Cell::External(_) => None,
        })
    }

    pub fn externals(&self) -> impl Iterator<Item = &External> {
        self.cells.iter().filter_map(|cell| match cell {
            Cell::External(e) => Some(e),
            Cell::Subckt(_) => None,
        })
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

impl Cell {
    pub fn name(&self) -> &ArcStr {
        match self {
            Self::Subckt(s) => &s.name,
            Self::External(e) => &e.name,
        }
    }

    pub fn ports(&self) -> &[ArcStr] {
        match self {
            Self::Subckt(s) => &s.ports,
            Self::External(e) => &e.ports,
        }
    }
}

impl From<Subckt> for Cell {
    fn from(value: Subckt) -> Self {
        Self::Subckt(value)
    }
}

impl From<External> for Cell {
    fn from(value: External) -> Self {
        Self::External(value)
    }
}

impl Subckt {
    pub fn new(name: impl Into<ArcStr>, ports: Vec<ArcStr>) -> Self {
        Self {
            name: name.into(),
            ports,
            instances: Vec::new(),
        }
    }

    pub fn is_port(&self, net: &str) -> bool {
        self.ports.iter().any(|p| p == net)
    }

    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|inst| inst.name == name)
    }
}

impl Instance {
    pub fn new(
        name: impl Into<ArcStr>,
        child: impl Into<ArcStr>,
        connections: Vec<ArcStr>,
    ) -> Self {
        Self {
            name: name.into(),
            child: child.into(),
            connections,
            params: Vec::new(),
        }
    }

    /// The instance name without its leading `X`.
    pub fn base_name(&self) -> &str {
        let name = self.name.as_str();
        match name.chars().next() {
            Some('X') | Some('x') => &name[1..],
            _ => name,
        }
    }

    /// The net bound to `port`, given the child's port list.
    pub fn net<'a>(&'a self, ports: &[ArcStr], port: &str) -> Option<&'a ArcStr> {
        ports
            .iter()
            .position(|p| p == port)
            .and_then(|i| self.connections.get(i))
    }
}
