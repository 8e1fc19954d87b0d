//! Hierarchy flattening.
//!
//! Every instance of a defined subcircuit is replaced by the subcircuit's
//! contents. Nets and instances inside an expanded subcircuit are renamed
//! with their hierarchical path (`delay_3.nn`, `Xdelay_3.forward`). Ports
//! take on the net bound at the parent level. Instances of external or
//! undefined cells are kept as leaves.

use std::collections::HashMap;

use arcstr::ArcStr;

use super::{Cell, Instance, Library, Subckt};
use crate::error::{NetlistError, Result};

/// Separator between hierarchy levels in flattened names.
pub const HIER_SEP: char = '.';

/// Flattens `top` into a single subcircuit named `<top>_flat`.
///
/// The flattened cell keeps the ports of `top`.
pub fn flatten(lib: &Library, top: &str) -> Result<Subckt> {
    let top = lib
        .subckt(top)
        .ok_or_else(|| NetlistError::UndefinedCell(top.into()))?;

    let mut out = Subckt::new(arcstr::format!("{}_flat", top.name), top.ports.clone());
    let mut stack = vec![top.name.clone()];
    let binding = HashMap::new();
    for inst in top.instances.iter() {
        expand(lib, inst, None, &binding, &mut stack, &mut out)?;
    }

    log::info!(
        "flattened `{}` into {} leaf instances",
        top.name,
        out.instances.len()
    );
    Ok(out)
}

/// Flattens `top` and wraps the result in a library that also carries the
/// external cells of `lib`.
pub fn flatten_library(lib: &Library, top: &str) -> Result<Library> {
    let flat = flatten(lib, top)?;
    let mut out = Library::new();
    out.header = lib.header.clone();
    for external in lib.externals() {
        out.add_cell(external.clone());
    }
    out.add_cell(flat);
    Ok(out)
}

fn expand(
    lib: &Library,
    inst: &Instance,
    prefix: Option<&str>,
    binding: &HashMap<&ArcStr, ArcStr>,
    stack: &mut Vec<ArcStr>,
    out: &mut Subckt,
) -> Result<()> {
    let connections = inst
        .connections
        .iter()
        .map(|net| resolve(net, prefix, binding))
        .collect::<Vec<_>>();
    let path = match prefix {
        Some(prefix) => arcstr::format!("{prefix}{HIER_SEP}{}", inst.base_name()),
        None => ArcStr::from(inst.base_name()),
    };

    match lib.cell(&inst.child) {
        Some(Cell::Subckt(child)) => {
            check_port_count(inst, &child.ports)?;
            if stack.contains(&child.name) {
                return Err(NetlistError::RecursiveCell(child.name.clone()));
            }

            let child_binding = child.ports.iter().zip(connections).collect();
            stack.push(child.name.clone());
            for grandchild in child.instances.iter() {
                expand(lib, grandchild, Some(&path), &child_binding, stack, out)?;
            }
            stack.pop();
        }
        cell => {
            if let Some(Cell::External(external)) = cell {
                check_port_count(inst, &external.ports)?;
            } else {
                log::debug!(
                    "keeping instance `{}` of undefined cell `{}` as a leaf",
                    inst.name,
                    inst.child
                );
            }
            out.instances.push(Instance {
                name: arcstr::format!("X{path}"),
                child: inst.child.clone(),
                connections,
                params: inst.params.clone(),
            });
        }
    }

    Ok(())
}

fn resolve(net: &ArcStr, prefix: Option<&str>, binding: &HashMap<&ArcStr, ArcStr>) -> ArcStr {
    if let Some(bound) = binding.get(net) {
        return bound.clone();
    }
    match prefix {
        Some(prefix) => arcstr::format!("{prefix}{HIER_SEP}{net}"),
        None => net.clone(),
    }
}

fn check_port_count(inst: &Instance, ports: &[ArcStr]) -> Result<()> {
    if inst.connections.len() != ports.len() {
        return Err(NetlistError::PortCountMismatch {
            instance: inst.name.clone(),
            child: inst.child.clone(),
            expected: ports.len(),
            found: inst.connections.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::netlist::parser::Parser;
    use crate::tests::TMC_3_NETLIST;

    use super::*;

    #[test]
    fn flatten_tmc_3() {
        let lib = Parser::parse(TMC_3_NETLIST).unwrap();
        let flat = flatten(&lib, "timing_multiplier_3").unwrap();

        assert_eq!(flat.name, "timing_multiplier_3_flat");
        assert_eq!(flat.ports, lib.subckt("timing_multiplier_3").unwrap().ports);
        assert_eq!(flat.instances.len(), 21 * 3);
        assert!(flat
            .instances
            .iter()
            .all(|inst| inst.child == "dbdr_delay_cell"));

        let fwd = flat.instance("Xdelay_0.forward").unwrap();
        assert_eq!(
            fwd.connections,
            vec!["clk", "vdd", "f0", "sae_in", "delay_0.nn", "vdd", "vss"]
        );

        let last = flat.instance("Xdelay_20.backward_0").unwrap();
        assert_eq!(
            last.connections,
            vec!["vss", "delay_20.nn", "delay_20.int12", "vdd", "delay_20.noconn0", "vdd", "vss"]
        );

        let mid = flat.instance("Xdelay_4.backward_1").unwrap();
        assert_eq!(
            mid.connections,
            vec!["delay_4.int12", "vdd", "clk_rev_3", "vdd", "delay_4.noconn1", "vdd", "vss"]
        );

        // Every net is a top-level port, a top-level chain net, or a hierarchical net.
        let nets: HashSet<&ArcStr> = flat.instances.iter().flat_map(|i| &i.connections).collect();
        for net in nets {
            assert!(
                flat.is_port(net)
                    || net.starts_with('f')
                    || net.starts_with("clk_rev_")
                    || net.contains(HIER_SEP),
                "unexpected net `{net}`"
            );
        }
    }

    #[test]
    fn flatten_nested_params_and_names() {
        let netlist = r#"
.subckt leaf a b
Xr a b res r=10
.ends
.subckt mid a b
Xl0 a m leaf
Xl1 m b leaf
.ends
.subckt top in out
Xm in out mid
.ends
"#;
        let lib = Parser::parse(netlist).unwrap();
        let flat = flatten(&lib, "top").unwrap();
        let names = flat.instances.iter().map(|i| i.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Xm.l0.r", "Xm.l1.r"]);
        assert_eq!(flat.instances[0].connections, vec!["in", "m.m"]);
        assert_eq!(flat.instances[1].connections, vec!["m.m", "out"]);
        assert_eq!(
            flat.instances[0].params,
            vec![(ArcStr::from("r"), ArcStr::from("10"))]
        );
    }

    #[test]
    fn flatten_errors() {
        let lib = Parser::parse(TMC_3_NETLIST).unwrap();
        assert!(matches!(
            flatten(&lib, "timing_multiplier_4"),
            Err(NetlistError::UndefinedCell(_))
        ));

        let netlist = TMC_3_NETLIST.replace("Xdelay_2 f1 f2", "Xdelay_2 f2");
        let lib = Parser::parse(&netlist).unwrap();
        assert!(matches!(
            flatten(&lib, "timing_multiplier_3"),
            Err(NetlistError::PortCountMismatch { expected: 7, found: 6, .. })
        ));

        let lib = Parser::parse(".subckt a x\nXa x a\n.ends\n").unwrap();
        assert!(matches!(
            flatten(&lib, "a"),
            Err(NetlistError::RecursiveCell(_))
        ));
    }

    #[test]
    fn flatten_library_keeps_externals() {
        let ports = ["clk_in", "din", "clk_out", "en", "dout", "vdd", "vss"]
            .into_iter()
            .map(ArcStr::from)
            .collect::<Vec<_>>();

        let mut lib = Parser::parse(TMC_3_NETLIST).unwrap();
        lib.add_cell(crate::netlist::External {
            name: "dbdr_delay_cell".into(),
            ports: ports.clone(),
        });
        let flat = flatten_library(&lib, "timing_multiplier_3").unwrap();
        let names = flat.cells().map(|c| c.name().as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["dbdr_delay_cell", "timing_multiplier_3_flat"]);

        let mut lib = Parser::parse(TMC_3_NETLIST).unwrap();
        lib.add_cell(crate::netlist::External {
            name: "dbdr_delay_cell".into(),
            ports: ports[..6].to_vec(),
        });
        assert!(matches!(
            flatten_library(&lib, "timing_multiplier_3"),
            Err(NetlistError::PortCountMismatch { expected: 6, found: 7, .. })
        ));
    }
}
