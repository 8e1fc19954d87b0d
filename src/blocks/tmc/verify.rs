//! Connectivity checks specific to the timing multiplier.
//!
//! Unit order is recovered by walking the forward clock chain from the `clk`
//! port, so instance names do not matter.

use std::collections::HashSet;

use arcstr::ArcStr;

use super::{unit_name, DELAY_CELL_NAME, UNIT_PORTS};
use crate::netlist::connectivity::net_usage;
use crate::netlist::report::Report;
use crate::netlist::validate::NO_CONNECT_PREFIX;
use crate::netlist::{Instance, Library};

/// Nets of one delay unit instance, looked up by unit port.
struct UnitNets<'a> {
    inst: &'a Instance,
    ports: &'a [ArcStr],
}

impl<'a> UnitNets<'a> {
    fn get(&self, port: &str) -> Option<&'a ArcStr> {
        self.inst.net(self.ports, port)
    }
}

/// Checks the forward and reverse clock chains of the timing multiplier `top`.
pub fn verify_tmc(lib: &Library, top: &str, multiplier: usize) -> Report {
    let mut report = Report::new();
    let unit = unit_name(multiplier);

    let Some(tmc) = lib.subckt(top) else {
        report.error(top, "missing_cell", format!("cell `{top}` is not defined"));
        return report;
    };
    let Some(unit_cell) = lib.cell(&unit) else {
        report.error(top, "missing_cell", format!("delay unit `{unit}` is not defined"));
        return report;
    };
    let ports = unit_cell.ports();
    if let Some(port) = UNIT_PORTS
        .iter()
        .find(|p| !ports.iter().any(|q| q.as_str() == **p))
    {
        report.error(
            unit.clone(),
            "missing_port",
            format!("delay unit `{unit}` has no port `{port}`"),
        );
        return report;
    }

    let units = tmc
        .instances
        .iter()
        .filter(|inst| inst.child == unit)
        .filter(|inst| inst.connections.len() == ports.len())
        .map(|inst| UnitNets { inst, ports })
        .collect::<Vec<_>>();
    if units.is_empty() {
        report.error(top, "no_delay_units", format!("`{top}` has no `{unit}` instances"));
        return report;
    }

    let Some(order) = forward_chain(top, &units, &mut report) else {
        return report;
    };
    check_reverse_chain(top, &order, &mut report);
    check_sae_in(top, &order, &mut report);

    if let Some(unit) = lib.subckt(&unit) {
        check_no_connects(lib, unit, &mut report);
        let cells = unit
            .instances
            .iter()
            .filter(|inst| inst.child == DELAY_CELL_NAME)
            .count();
        if cells != multiplier {
            report.error(
                unit.name.clone(),
                "delay_cell_count",
                format!("expected {multiplier} delay cells, found {cells}"),
            );
        }
    }

    log::debug!(
        "verified `{top}`: {} units, {} findings",
        order.len(),
        report.findings.len()
    );
    report
}

/// Walks `clk -> f0 -> f1 -> ...`, returning units in chain order.
fn forward_chain<'a>(
    top: &str,
    units: &'a [UnitNets<'a>],
    report: &mut Report,
) -> Option<Vec<&'a UnitNets<'a>>> {
    let mut order: Vec<&UnitNets> = Vec::with_capacity(units.len());
    let mut visited = HashSet::new();
    let mut net: &str = "clk";

    while order.len() < units.len() {
        let mut next = units
            .iter()
            .enumerate()
            .filter(|(_, u)| u.get("clk_in").map(ArcStr::as_str) == Some(net));
        match (next.next(), next.next()) {
            (Some((i, u)), None) => {
                if !visited.insert(i) {
                    report.error(
                        top,
                        "broken_forward_chain",
                        format!("forward clock chain loops back at `{}`", u.inst.name),
                    );
                    return None;
                }
                order.push(u);
                net = u.get("clk_out").map(ArcStr::as_str).unwrap_or_default();
            }
            (Some(_), Some(_)) => {
                report.error(
                    top,
                    "broken_forward_chain",
                    format!("net `{net}` drives the clock input of more than one delay unit"),
                );
                return None;
            }
            (None, _) => {
                let missing = units
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !visited.contains(i))
                    .map(|(_, u)| u.inst.name.as_str())
                    .collect::<Vec<_>>();
                report.error(
                    top,
                    "broken_forward_chain",
                    format!(
                        "forward clock chain ends at `{net}`; unreached units: {}",
                        missing.join(", ")
                    ),
                );
                return None;
            }
        }
    }

    Some(order)
}

fn check_reverse_chain(top: &str, order: &[&UnitNets], report: &mut Report) {
    let first = order[0];
    if first.get("sae_out").map(ArcStr::as_str) != Some("sae_out") {
        report.error(
            top,
            "broken_reverse_chain",
            format!(
                "first unit `{}` does not drive `sae_out`",
                first.inst.name
            ),
        );
    }

    for pair in order.windows(2) {
        let (cur, next) = (pair[0], pair[1]);
        let rev = cur.get("clk_rev");
        if rev.is_none() || rev != next.get("sae_out") {
            report.error(
                top,
                "broken_reverse_chain",
                format!(
                    "`{}` reversed clock is not driven by `{}`",
                    cur.inst.name, next.inst.name
                ),
            );
        }
    }

    let last = order[order.len() - 1];
    match last.get("clk_rev").map(ArcStr::as_str) {
        Some("vss") => report.info(
            top,
            "reverse_chain_tied_low",
            format!(
                "reversed clock of the last unit `{}` is tied to `vss`",
                last.inst.name
            ),
        ),
        net => report.error(
            top,
            "unterminated_reverse_chain",
            format!(
                "reversed clock of the last unit `{}` is `{}`, expected `vss`",
                last.inst.name,
                net.unwrap_or("<none>")
            ),
        ),
    }
}

fn check_sae_in(top: &str, order: &[&UnitNets], report: &mut Report) {
    for unit in order {
        if unit.get("sae_in").map(ArcStr::as_str) != Some("sae_in") {
            report.error(
                top,
                "sae_in_not_shared",
                format!("`{}` is not enabled by `sae_in`", unit.inst.name),
            );
        }
    }
}

fn check_no_connects(lib: &Library, unit: &crate::netlist::Subckt, report: &mut Report) {
    for (net, usage) in net_usage(lib, unit) {
        if net.starts_with(NO_CONNECT_PREFIX) && usage.pins.len() != 1 {
            report.error(
                unit.name.clone(),
                "loaded_no_connect",
                format!(
                    "no-connect net `{net}` is connected to {} pins",
                    usage.pins.len()
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::netlist::parser::Parser;
    use crate::tests::TMC_3_NETLIST;

    use super::*;

    fn verify(netlist: &str) -> Report {
        let lib = Parser::parse(netlist).unwrap();
        verify_tmc(&lib, "timing_multiplier_3", 3)
    }

    #[test]
    fn tmc_3_reference_netlist_passes() {
        let report = verify(TMC_3_NETLIST);
        assert!(report.is_ok(), "{:?}", report);
        let tied = report.with_code("reverse_chain_tied_low").collect::<Vec<_>>();
        assert_eq!(tied.len(), 1);
        assert!(tied[0].message.contains("Xdelay_20"));
    }

    #[test]
    fn shuffled_instances_pass() {
        let lines = TMC_3_NETLIST.lines().collect::<Vec<_>>();
        let (delays, rest): (Vec<&str>, Vec<&str>) =
            lines.iter().partition(|l| l.starts_with("Xdelay_"));
        let ends = rest.iter().rposition(|l| *l == ".ends").unwrap();
        let mut shuffled = rest[..ends].to_vec();
        shuffled.extend(delays.iter().rev());
        shuffled.extend(&rest[ends..]);
        let report = verify(&shuffled.join("\n"));
        assert!(report.is_ok(), "{:?}", report);
    }

    #[test]
    fn broken_forward_chain() {
        let netlist = TMC_3_NETLIST.replace("Xdelay_5 f4 f5", "Xdelay_5 f3 f5");
        let report = verify(&netlist);
        let errors = report.errors().collect::<Vec<_>>();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "broken_forward_chain");
    }

    #[test]
    fn broken_reverse_chain() {
        let netlist = TMC_3_NETLIST.replace(
            "Xdelay_9 f8 f9 sae_in clk_rev_8 clk_rev_9",
            "Xdelay_9 f8 f9 sae_in clk_rev_8 clk_rev_10",
        );
        let report = verify(&netlist);
        let errors = report
            .with_code("broken_reverse_chain")
            .collect::<Vec<_>>();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("`Xdelay_9`"));
    }

    #[test]
    fn last_stage_must_be_tied_low() {
        let netlist = TMC_3_NETLIST.replace(
            "Xdelay_20 f19 f20 sae_in clk_rev_19 vss",
            "Xdelay_20 f19 f20 sae_in clk_rev_19 clk_rev_20",
        );
        let report = verify(&netlist);
        assert_eq!(report.with_code("unterminated_reverse_chain").count(), 1);
        assert_eq!(report.with_code("reverse_chain_tied_low").count(), 0);
    }

    #[test]
    fn loaded_no_connect() {
        let netlist = TMC_3_NETLIST.replace(
            "Xbackward_1 int12 vdd sae_out vdd noconn1",
            "Xbackward_1 int12 noconn0 sae_out vdd noconn1",
        );
        let report = verify(&netlist);
        let errors = report.errors().collect::<Vec<_>>();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "loaded_no_connect");
    }

    #[test]
    fn missing_unit_definition() {
        let lib = Parser::parse(TMC_3_NETLIST).unwrap();
        let report = verify_tmc(&lib, "timing_multiplier_3", 4);
        assert_eq!(report.with_code("missing_cell").count(), 1);
    }
}
