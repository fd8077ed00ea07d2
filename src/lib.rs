#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Exception-handling lowering for a C++ front end.
//!
//! `throw`, `try`/`catch` and exception specifications are turned into an
//! explicit instruction IR with protected regions, runtime type matching and
//! calls into a fixed unwinding runtime.

pub mod config;
pub mod diagnostics;
pub mod eh;
pub mod error;
pub mod ir;
pub mod logging;
pub mod types;

pub use config::{EhConfig, UnwindModel};
pub use eh::{
    CatchBlock, CatchParam, FunctionLowering, MatchingDescriptor, ThrowLowering, ThrowOperand,
    TranslationUnit, TryBlock, UnitArtifact,
};
pub use error::{Error, Result};
pub use ir::{FunctionKind, LoweredFunction};
pub use types::{ClassInfo, Ty, TypeSystem, TypeTable};
