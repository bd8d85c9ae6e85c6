pub mod error;
pub mod families;
pub mod parser;
pub mod source;
pub mod types;

pub use error::{ReportError, Result};
pub use families::{EnumerationFit, InvarianceFit};
pub use parser::{parse_number, parse_report};
pub use source::{DirectoryReportSource, MemoryReportSource, ReportSource};
pub use types::*;
