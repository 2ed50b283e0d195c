//! Operator command channel: parsing, execution and the inbound loop.

pub mod listener;
pub mod parser;
pub mod processor;

pub use listener::CommandListener;
pub use parser::{parse, Command};
pub use processor::CommandProcessor;
