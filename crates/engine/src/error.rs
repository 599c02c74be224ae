//! Engine error types.

use thiserror::Error;

use crate::addr::Address;
use crate::extract::ParseError;

/// Errors surfaced by graph construction and update.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A formula failed to parse and the build was not configured to skip
    /// parse failures.
    #[error("formula at {addr} did not parse")]
    Parse {
        addr: Address,
        #[source]
        source: ParseError,
    },

    /// An update named a cell that holds no formula in the graph.
    #[error("no formula at {0}")]
    UnknownFormula(Address),

    /// A scan named a worksheet the data source does not have.
    #[error("unknown worksheet {0:?}")]
    UnknownWorksheet(String),
}
