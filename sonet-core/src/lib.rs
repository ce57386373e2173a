//! sonet-core
//!
//! Execution engine for pre-compiled FILLY-style scripts: a tree-walking
//! interpreter, the cooperative event subsystem that drives `mes(...)`
//! handlers, and the host resources (file handles, audio) scripts reach
//! through builtins.
//!
//! The front-end that turns source text into a [`script::Program`] lives
//! elsewhere; this crate starts from the instruction tree.

pub mod audio;
pub mod config;
pub mod error;
pub mod script;
pub mod subsystem;
pub mod vm;

pub use config::{LoggerConfig, VmConfig, VmConfigBuilder};
pub use error::{ErrorKind, RuntimeError, SourceLocation};
pub use script::{Program, Value};
pub use vm::{CancelToken, Vm};
