mod definition;
mod evidence;
mod report;
mod result;
mod severity;
mod status;

pub use definition::ProbeDefinition;
pub use evidence::Evidence;
pub use report::{OsInfo, Report};
pub use result::{CheckResult, DEFAULT_FINDING, FAULT_FINDING, timestamp_now};
pub use severity::Severity;
pub use status::CheckStatus;
