//! Structural checks on a parsed or generated [`Library`].

use std::collections::{HashMap, HashSet};

use arcstr::ArcStr;
use itertools::Itertools;

use super::connectivity::net_usage;
use super::report::Report;
use super::{Cell, Instance, Library, Subckt};

/// Prefix of nets that are deliberately left unconnected.
pub const NO_CONNECT_PREFIX: &str = "noconn";

/// Cell name used for findings on instances outside of any subcircuit.
pub const TOP_LEVEL: &str = "<top-level>";

#[derive(Debug, Clone, Default)]
pub struct ValidateOpts {
    /// Cells that may be referenced without being defined.
    pub externals: HashSet<ArcStr>,
}

impl ValidateOpts {
    pub fn with_externals<I, S>(externals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ArcStr>,
    {
        Self {
            externals: externals.into_iter().map(Into::into).collect(),
        }
    }
}

/// Runs every structural check on `lib`.
pub fn validate(lib: &Library, opts: &ValidateOpts) -> Report {
    let mut report = Report::new();

    check_duplicate_cells(lib, &mut report);
    for subckt in lib.subckts() {
        check_ports(subckt, &mut report);
        check_instances(lib, &subckt.name, &subckt.instances, opts, &mut report);
        check_nets(lib, subckt, &mut report);
    }
    check_instances(lib, TOP_LEVEL, &lib.top_instances, opts, &mut report);
    check_recursion(lib, &mut report);

    log::debug!(
        "validated {} cells: {} findings",
        lib.cells().count(),
        report.findings.len()
    );
    report
}

fn check_duplicate_cells(lib: &Library, report: &mut Report) {
    let counts = lib.cells().map(Cell::name).counts();
    for name in lib.cells().map(Cell::name).unique() {
        let n = counts[name];
        if n > 1 {
            report.error(
                name.clone(),
                "duplicate_cell",
                format!("cell `{name}` is defined {n} times"),
            );
        }
    }
}

fn check_ports(subckt: &Subckt, report: &mut Report) {
    for port in subckt.ports.iter().duplicates() {
        report.error(
            subckt.name.clone(),
            "duplicate_port",
            format!("port `{port}` appears more than once"),
        );
    }
}

fn check_instances(
    lib: &Library,
    cell: &str,
    instances: &[Instance],
    opts: &ValidateOpts,
    report: &mut Report,
) {
    for name in instances.iter().map(|i| &i.name).duplicates() {
        report.error(
            cell,
            "duplicate_instance",
            format!("instance `{name}` appears more than once"),
        );
    }

    for inst in instances.iter() {
        match lib.cell(&inst.child) {
            Some(child) => {
                let expected = child.ports().len();
                let found = inst.connections.len();
                if expected != found {
                    report.error(
                        cell,
                        "port_count_mismatch",
                        format!(
                            "instance `{}` connects {found} nets, but `{}` has {expected} ports",
                            inst.name, inst.child
                        ),
                    );
                }
            }
            None if opts.externals.contains(&inst.child) => {}
            None => report.error(
                cell,
                "undefined_cell",
                format!(
                    "instance `{}` references undefined cell `{}`",
                    inst.name, inst.child
                ),
            ),
        }
    }
}

fn check_nets(lib: &Library, subckt: &Subckt, report: &mut Report) {
    for (net, usage) in net_usage(lib, subckt) {
        match (usage.is_port, usage.pins.len()) {
            (true, 0) => report.warning(
                subckt.name.clone(),
                "unused_port",
                format!("port `{net}` is not connected to any instance"),
            ),
            (false, 1) if net.starts_with(NO_CONNECT_PREFIX) => report.info(
                subckt.name.clone(),
                "no_connect",
                format!(
                    "net `{net}` is a no-connect driven by `{}`",
                    usage.pins[0].instance
                ),
            ),
            (false, 1) => report.warning(
                subckt.name.clone(),
                "floating_net",
                format!(
                    "net `{net}` only connects to `{}`",
                    usage.pins[0].instance
                ),
            ),
            _ => {}
        }
    }
}

fn check_recursion(lib: &Library, report: &mut Report) {
    let graph: HashMap<&ArcStr, Vec<&ArcStr>> = lib
        .subckts()
        .map(|s| {
            let children = s
                .instances
                .iter()
                .map(|i| &i.child)
                .filter(|c| lib.subckt(c).is_some())
                .unique()
                .collect();
            (&s.name, children)
        })
        .collect();

    for subckt in lib.subckts().unique_by(|s| s.name.clone()) {
        if reaches(&graph, &subckt.name, &subckt.name) {
            report.error(
                subckt.name.clone(),
                "recursive_cell",
                format!("cell `{}` instantiates itself", subckt.name),
            );
        }
    }
}

/// Returns true if `target` is reachable from the children of `from`.
fn reaches(graph: &HashMap<&ArcStr, Vec<&ArcStr>>, from: &ArcStr, target: &ArcStr) -> bool {
    let mut visited = HashSet::new();
    let mut stack: Vec<&ArcStr> = graph.get(from).cloned().unwrap_or_default();
    while let Some(cell) = stack.pop() {
        if cell == target {
            return true;
        }
        if visited.insert(cell) {
            if let Some(children) = graph.get(cell) {
                stack.extend(children.iter().copied());
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use crate::netlist::parser::Parser;
    use crate::tests::TMC_3_NETLIST;

    use super::*;

    fn opts() -> ValidateOpts {
        ValidateOpts::with_externals(["dbdr_delay_cell"])
    }

    #[test]
    fn tmc_3_netlist_is_valid() {
        let lib = Parser::parse(TMC_3_NETLIST).unwrap();
        let report = validate(&lib, &opts());
        assert!(report.is_ok(), "{:?}", report);

        let no_connects = report.with_code("no_connect").collect::<Vec<_>>();
        assert_eq!(no_connects.len(), 2);
        assert!(no_connects.iter().all(|f| f.cell == "dbdr_delay_unit_3"));

        // The last stage's clk_out drives nothing.
        let floating = report.with_code("floating_net").collect::<Vec<_>>();
        assert_eq!(floating.len(), 1);
        assert!(floating[0].message.contains("`f20`"));
        assert_eq!(floating[0].cell, "timing_multiplier_3");
    }

    #[test]
    fn undeclared_external_is_undefined() {
        let lib = Parser::parse(TMC_3_NETLIST).unwrap();
        let report = validate(&lib, &ValidateOpts::default());
        assert_eq!(report.with_code("undefined_cell").count(), 3);
    }

    #[test]
    fn dropped_connection_is_port_count_mismatch() {
        let netlist = TMC_3_NETLIST.replace(
            "Xdelay_7 f6 f7 sae_in clk_rev_6 clk_rev_7 vdd vss",
            "Xdelay_7 f6 f7 sae_in clk_rev_6 clk_rev_7 vdd",
        );
        let lib = Parser::parse(&netlist).unwrap();
        let report = validate(&lib, &opts());
        let errors = report.errors().collect::<Vec<_>>();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "port_count_mismatch");
        assert!(errors[0].message.contains("Xdelay_7"));
    }

    #[test]
    fn missing_definition_is_reported() {
        let netlist = TMC_3_NETLIST.replace(".subckt dbdr_delay_unit_3", ".subckt dbdr_delay_unit_4");
        let lib = Parser::parse(&netlist).unwrap();
        let report = validate(&lib, &opts());
        assert_eq!(report.with_code("undefined_cell").count(), 21);
    }

    #[test]
    fn duplicates_are_reported() {
        let netlist = r#"
.subckt inv a y vdd vss
.ends
.subckt inv a y vdd vss
.ends
.subckt buf a a y vdd vss
Xinv0 a x vdd vss inv
Xinv0 x y vdd vss inv
.ends
"#;
        let lib = Parser::parse(netlist).unwrap();
        let report = validate(&lib, &ValidateOpts::default());
        assert_eq!(report.with_code("duplicate_cell").count(), 1);
        assert_eq!(report.with_code("duplicate_port").count(), 1);
        assert_eq!(report.with_code("duplicate_instance").count(), 1);
        // Both definitions of `inv` are empty, so all of their ports are unused.
        assert_eq!(report.with_code("unused_port").count(), 8);
    }

    #[test]
    fn top_level_instances_are_checked() {
        let netlist = r#"
.subckt inv a y vdd vss
Xn a y vdd vss leaf
.ends
Xtop in out inv
Xundef a b nosuchcell
Xok a b vdd vss inv
Xok c d vdd vss inv
"#;
        let lib = Parser::parse(netlist).unwrap();
        assert_eq!(lib.top_instances.len(), 4);
        let report = validate(&lib, &ValidateOpts::with_externals(["leaf"]));

        let errors = report.errors().collect::<Vec<_>>();
        assert_eq!(errors.len(), 3, "{:?}", report);
        assert!(errors.iter().all(|f| f.cell == TOP_LEVEL));
        let mismatch = report.with_code("port_count_mismatch").collect::<Vec<_>>();
        assert_eq!(mismatch.len(), 1);
        assert!(mismatch[0].message.contains("`Xtop`"));
        let undefined = report.with_code("undefined_cell").collect::<Vec<_>>();
        assert_eq!(undefined.len(), 1);
        assert!(undefined[0].message.contains("`nosuchcell`"));
        assert_eq!(report.with_code("duplicate_instance").count(), 1);
    }

    #[test]
    fn recursion_is_reported() {
        let netlist = r#"
.subckt a x
Xb x b
.ends
.subckt b x
Xa x a
.ends
.subckt c x
Xa x a
.ends
"#;
        let lib = Parser::parse(netlist).unwrap();
        let report = validate(&lib, &ValidateOpts::default());
        let cells = report
            .with_code("recursive_cell")
            .map(|f| f.cell.as_str())
            .collect::<Vec<_>>();
        assert_eq!(cells, vec!["a", "b"]);
    }
}
