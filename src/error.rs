use arcstr::ArcStr;
use thiserror::Error;

use crate::netlist::parser::ParseError;

#[derive(Debug, Error)]
pub enum NetlistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error parsing netlist: {0}")]
    Parse(#[from] ParseError),

    #[error("undefined cell `{0}`")]
    UndefinedCell(ArcStr),

    #[error("instance `{instance}` connects {found} nets, but `{child}` has {expected} ports")]
    PortCountMismatch {
        instance: ArcStr,
        child: ArcStr,
        expected: usize,
        found: usize,
    },

    #[error("cell `{0}` instantiates itself")]
    RecursiveCell(ArcStr),

    #[error("cell `{cell}` has no port named `{port}`")]
    UnknownPort { cell: ArcStr, port: ArcStr },

    #[error("port `{port}` of instance `{instance}` is not connected")]
    UnconnectedPort { instance: ArcStr, port: ArcStr },

    #[error("cell `{0}` was already generated with different parameters")]
    NameCollision(ArcStr),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

pub type Result<T> = std::result::Result<T, NetlistError>;
