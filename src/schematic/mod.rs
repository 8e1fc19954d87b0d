//! Schematic generators.
//!
//! A [`Component`] describes one cell: its name, which follows from its
//! parameters, and a `schematic` method that declares ports and internal
//! signals and instantiates child components. [`Generator`] runs components
//! and collects the resulting cells into a [`Library`], generating each child
//! cell once.

use std::collections::HashMap;
use std::fmt::Debug;

use arcstr::ArcStr;

use crate::error::{NetlistError, Result};
use crate::netlist::{Cell, External, Instance, Library, Subckt};

pub trait Component: Sized {
    type Params: Debug;

    fn new(params: &Self::Params) -> Result<Self>;

    fn name(&self) -> ArcStr;

    fn schematic(&self, ctx: &mut SchematicCtx) -> Result<()>;
}

/// Parameters for components that take none.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct NoParams;

/// A net within the cell being generated.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Signal(usize);

/// An ordered group of signals.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Bus(Vec<Signal>);

#[derive(Default)]
pub struct Generator {
    lib: Library,
    generated: HashMap<ArcStr, CellStatus>,
}

enum CellStatus {
    /// The cell's schematic is being built.
    Loading,
    /// Holds a description of the parameters the cell was generated with.
    Generated(String),
}

pub struct SchematicCtx<'a> {
    generator: &'a mut Generator,
    name: ArcStr,
    names: Vec<ArcStr>,
    lookup: HashMap<ArcStr, Signal>,
    ports: Vec<Signal>,
    instances: Vec<Instance>,
    external: bool,
}

/// An instance that has not yet been added to a cell.
#[must_use]
pub struct InstanceBuilder {
    name: Option<ArcStr>,
    child: ArcStr,
    ports: Vec<ArcStr>,
    connections: Vec<(ArcStr, Signal)>,
}

impl Generator {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates the cell for `C` with the given parameters, along with any
    /// cells it instantiates. Returns the cell name.
    pub fn generate<C: Component>(&mut self, params: &C::Params) -> Result<ArcStr> {
        let component = C::new(params)?;
        let name = component.name();
        let key = format!("{}{:?}", std::any::type_name::<C>(), params);

        match self.generated.get(&name) {
            Some(CellStatus::Loading) => return Err(NetlistError::RecursiveCell(name)),
            Some(CellStatus::Generated(existing)) if *existing != key => {
                return Err(NetlistError::NameCollision(name))
            }
            Some(CellStatus::Generated(_)) => return Ok(name),
            None => {}
        }

        log::debug!("generating cell `{name}`");
        self.generated.insert(name.clone(), CellStatus::Loading);
        let mut ctx = SchematicCtx::new(self, name.clone());
        let res = component.schematic(&mut ctx).map(|()| ctx.finish());

        let cell = match res {
            Ok(cell) => cell,
            Err(err) => {
                self.generated.remove(&name);
                return Err(err);
            }
        };
        self.generated.insert(name.clone(), CellStatus::Generated(key));
        self.lib.add_cell(cell);
        Ok(name)
    }

    #[inline]
    pub fn library(&self) -> &Library {
        &self.lib
    }

    #[inline]
    pub fn into_library(self) -> Library {
        self.lib
    }
}

impl<'a> SchematicCtx<'a> {
    fn new(generator: &'a mut Generator, name: ArcStr) -> Self {
        Self {
            generator,
            name,
            names: Vec::new(),
            lookup: HashMap::new(),
            ports: Vec::new(),
            instances: Vec::new(),
            external: false,
        }
    }

    /// The name of the cell being generated.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// Returns the signal named `name`, creating it if needed.
    ///
    /// Signals with the same name are the same net.
    pub fn signal(&mut self, name: impl Into<ArcStr>) -> Signal {
        let name = name.into();
        if let Some(&signal) = self.lookup.get(&name) {
            return signal;
        }
        let signal = Signal(self.names.len());
        self.names.push(name.clone());
        self.lookup.insert(name, signal);
        signal
    }

    /// Creates signals `<name>0` through `<name><width - 1>`.
    pub fn bus(&mut self, name: &str, width: usize) -> Bus {
        Bus((0..width).map(|i| self.signal(format!("{name}{i}"))).collect())
    }

    /// Exposes the signal `name` as the next port of the cell.
    pub fn port(&mut self, name: impl Into<ArcStr>) -> Signal {
        let signal = self.signal(name);
        if !self.ports.contains(&signal) {
            self.ports.push(signal);
        }
        signal
    }

    pub fn ports<const N: usize>(&mut self, names: [&str; N]) -> [Signal; N] {
        names.map(|name| self.port(name))
    }

    /// Marks the cell as defined outside of the generated netlist.
    ///
    /// External cells keep their ports; instances are not allowed.
    pub fn set_external(&mut self) {
        self.external = true;
    }

    /// Generates `C` if needed and starts an instance of it.
    pub fn instantiate<C: Component>(&mut self, params: &C::Params) -> Result<InstanceBuilder> {
        let child = self.generator.generate::<C>(params)?;
        let ports = self
            .generator
            .lib
            .cell(&child)
            .map(|cell| cell.ports().to_vec())
            .ok_or_else(|| NetlistError::UndefinedCell(child.clone()))?;
        Ok(InstanceBuilder {
            name: None,
            child,
            ports,
            connections: Vec::new(),
        })
    }

    fn add_instance(&mut self, inst: Instance) -> Result<()> {
        if self.external {
            return Err(NetlistError::InvalidParams(format!(
                "external cell `{}` cannot contain instance `{}`",
                self.name, inst.name
            )));
        }
        self.instances.push(inst);
        Ok(())
    }

    #[inline]
    fn signal_name(&self, signal: Signal) -> &ArcStr {
        &self.names[signal.0]
    }

    fn finish(self) -> Cell {
        let ports = self
            .ports
            .iter()
            .map(|&s| self.signal_name(s).clone())
            .collect();
        if self.external {
            Cell::External(External {
                name: self.name,
                ports,
            })
        } else {
            Cell::Subckt(Subckt {
                name: self.name,
                ports,
                instances: self.instances,
            })
        }
    }
}

impl InstanceBuilder {
    /// Sets the instance name. A leading `X` is added.
    pub fn named(mut self, name: impl AsRef<str>) -> Self {
        self.name = Some(arcstr::format!("X{}", name.as_ref()));
        self
    }

    pub fn with_connections<I, S>(mut self, connections: I) -> Self
    where
        I: IntoIterator<Item = (S, Signal)>,
        S: Into<ArcStr>,
    {
        self.connections
            .extend(connections.into_iter().map(|(port, s)| (port.into(), s)));
        self
    }

    /// Binds every child port and adds the instance to `ctx`.
    ///
    /// Every port of the child must be connected exactly once.
    pub fn add_to(self, ctx: &mut SchematicCtx) -> Result<()> {
        let name = self
            .name
            .unwrap_or_else(|| arcstr::format!("X{}_{}", self.child, ctx.instances.len()));

        if let Some((port, _)) = self
            .connections
            .iter()
            .find(|(port, _)| !self.ports.contains(port))
        {
            return Err(NetlistError::UnknownPort {
                cell: self.child,
                port: port.clone(),
            });
        }

        let connections = self
            .ports
            .iter()
            .map(|port| {
                let mut bound = self.connections.iter().filter(|(p, _)| p == port);
                match (bound.next(), bound.next()) {
                    (Some(&(_, signal)), None) => Ok(ctx.signal_name(signal).clone()),
                    (Some(_), Some(_)) => Err(NetlistError::InvalidParams(format!(
                        "port `{port}` of instance `{name}` is connected more than once"
                    ))),
                    (None, _) => Err(NetlistError::UnconnectedPort {
                        instance: name.clone(),
                        port: port.clone(),
                    }),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        ctx.add_instance(Instance::new(name, self.child, connections))
    }
}

impl Bus {
    #[inline]
    pub fn index(&self, idx: usize) -> Signal {
        self.0[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inv;

    impl Component for Inv {
        type Params = NoParams;

        fn new(_params: &Self::Params) -> Result<Self> {
            Ok(Self)
        }

        fn name(&self) -> ArcStr {
            arcstr::literal!("inv")
        }

        fn schematic(&self, ctx: &mut SchematicCtx) -> Result<()> {
            ctx.ports(["din", "din_b", "vdd", "vss"]);
            ctx.set_external();
            Ok(())
        }
    }

    struct InvChain {
        stages: usize,
        /// Leave out the `vss` connection of the last stage.
        drop_vss: bool,
    }

    impl Component for InvChain {
        type Params = (usize, bool);

        fn new(params: &Self::Params) -> Result<Self> {
            Ok(Self {
                stages: params.0,
                drop_vss: params.1,
            })
        }

        fn name(&self) -> ArcStr {
            arcstr::format!("inv_chain_{}", self.stages)
        }

        fn schematic(&self, ctx: &mut SchematicCtx) -> Result<()> {
            let [din, dout, vdd, vss] = ctx.ports(["din", "dout", "vdd", "vss"]);
            let int = ctx.bus("x", self.stages - 1);
            for i in 0..self.stages {
                let input = if i == 0 { din } else { int.index(i - 1) };
                let output = if i == self.stages - 1 {
                    dout
                } else {
                    int.index(i)
                };
                let mut inst = ctx
                    .instantiate::<Inv>(&NoParams)?
                    .named(format!("inv{i}"))
                    .with_connections([("din", input), ("din_b", output), ("vdd", vdd)]);
                if !(self.drop_vss && i == self.stages - 1) {
                    inst = inst.with_connections([("vss", vss)]);
                }
                inst.add_to(ctx)?;
            }
            Ok(())
        }
    }

    #[test]
    fn generate_inv_chain() {
        let mut gen = Generator::new();
        let name = gen.generate::<InvChain>(&(3, false)).unwrap();
        assert_eq!(name, "inv_chain_3");

        let lib = gen.into_library();
        assert!(matches!(lib.cell("inv"), Some(Cell::External(_))));

        let chain = lib.subckt("inv_chain_3").unwrap();
        assert_eq!(chain.ports, vec!["din", "dout", "vdd", "vss"]);
        let conns = chain
            .instances
            .iter()
            .map(|i| i.connections.join(" "))
            .collect::<Vec<_>>();
        assert_eq!(
            conns,
            vec!["din x0 vdd vss", "x0 x1 vdd vss", "x1 dout vdd vss"]
        );
    }

    #[test]
    fn child_cells_are_generated_once() {
        let mut gen = Generator::new();
        gen.generate::<InvChain>(&(2, false)).unwrap();
        gen.generate::<InvChain>(&(4, false)).unwrap();
        let names = gen
            .library()
            .cells()
            .map(|c| c.name().as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["inv", "inv_chain_2", "inv_chain_4"]);
    }

    #[test]
    fn unconnected_port_is_an_error() {
        let mut gen = Generator::new();
        let err = gen.generate::<InvChain>(&(2, true)).unwrap_err();
        assert!(matches!(
            err,
            NetlistError::UnconnectedPort { ref instance, ref port }
                if instance == "Xinv1" && port == "vss"
        ));
    }

    /// Instantiates `depth` levels of itself, then a cell `depth` levels up.
    struct Nested {
        depth: usize,
    }

    impl Component for Nested {
        type Params = usize;

        fn new(params: &Self::Params) -> Result<Self> {
            Ok(Self { depth: *params })
        }

        fn name(&self) -> ArcStr {
            arcstr::format!("nested_{}", self.depth % 3)
        }

        fn schematic(&self, ctx: &mut SchematicCtx) -> Result<()> {
            let [a] = ctx.ports(["a"]);
            ctx.instantiate::<Nested>(&(self.depth + 1))?
                .named("child")
                .with_connections([("a", a)])
                .add_to(ctx)
        }
    }

    struct SelfLoop;

    impl Component for SelfLoop {
        type Params = NoParams;

        fn new(_params: &Self::Params) -> Result<Self> {
            Ok(Self)
        }

        fn name(&self) -> ArcStr {
            arcstr::literal!("self_loop")
        }

        fn schematic(&self, ctx: &mut SchematicCtx) -> Result<()> {
            let [a] = ctx.ports(["a"]);
            ctx.instantiate::<SelfLoop>(&NoParams)?
                .with_connections([("a", a)])
                .add_to(ctx)
        }
    }

    #[test]
    fn self_instantiation_is_an_error() {
        let mut gen = Generator::new();
        assert!(matches!(
            gen.generate::<SelfLoop>(&NoParams),
            Err(NetlistError::RecursiveCell(ref name)) if name == "self_loop"
        ));
        assert_eq!(gen.library().cells().count(), 0);
    }

    #[test]
    fn indirect_recursion_is_an_error() {
        let mut gen = Generator::new();
        let err = gen.generate::<Nested>(&0).unwrap_err();
        assert!(matches!(err, NetlistError::RecursiveCell(ref name) if name == "nested_0"));

        // A failed generation leaves nothing behind.
        assert_eq!(gen.library().cells().count(), 0);
        gen.generate::<InvChain>(&(2, false)).unwrap();
    }

    #[test]
    fn name_collision_is_an_error() {
        let mut gen = Generator::new();
        gen.generate::<InvChain>(&(2, false)).unwrap();
        assert!(matches!(
            gen.generate::<InvChain>(&(2, true)),
            Err(NetlistError::NameCollision(_))
        ));
    }
}
