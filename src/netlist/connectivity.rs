use std::collections::BTreeMap;

use arcstr::ArcStr;

use super::{Library, Subckt};

/// A pin of an instance that a net is bound to.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PinRef {
    pub instance: ArcStr,
    /// The child port name, if the child cell is known.
    pub pin: Option<ArcStr>,
    /// The position of the binding on the instance line.
    pub position: usize,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct NetUsage {
    pub is_port: bool,
    pub pins: Vec<PinRef>,
}

/// Collects every net of `subckt` along with the instance pins bound to it.
///
/// Ports are always present, even if nothing connects to them.
pub fn net_usage(lib: &Library, subckt: &Subckt) -> BTreeMap<ArcStr, NetUsage> {
    let mut nets: BTreeMap<ArcStr, NetUsage> = BTreeMap::new();
    for port in subckt.ports.iter() {
        nets.entry(port.clone()).or_default().is_port = true;
    }

    for inst in subckt.instances.iter() {
        let child_ports = lib.cell(&inst.child).map(|c| c.ports());
        for (position, net) in inst.connections.iter().enumerate() {
            let pin = child_ports.and_then(|ports| ports.get(position)).cloned();
            nets.entry(net.clone()).or_default().pins.push(PinRef {
                instance: inst.name.clone(),
                pin,
                position,
            });
        }
    }

    nets
}
