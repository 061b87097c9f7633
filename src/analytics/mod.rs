//! Analytics over the normalized sales table.
//!
//! `functions` holds the query operations the chat dispatches to;
//! `charts` computes the dashboard data series.

pub mod charts;
pub mod functions;

pub use charts::Dashboard;
pub use functions::*;
