//! Entry points behind the CLI subcommands.

mod condense;
mod dump;
mod scan;

pub use condense::condense;
pub use dump::dump;
pub use scan::scan;
