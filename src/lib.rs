//! The Ewasm execution engine
//!
//! This library drives a single, synchronous execution of an
//! Ethereum-flavoured WASM contract on the WASMI interpreter.  It supplies
//! the contract's imports from the fixed `ethereum` host namespace,
//! rejecting any import whose name or signature differs from the host
//! interface, marshals arguments and results between the interpreter's
//! typed values and native scalars, and reads and writes the contract's
//! linear memory on behalf of the host calls.  The contract signals
//! completion through `finish` or `revert`, which unwind the interpreter
//! call stack and are translated back into an ordinary [`ExecutionResult`].
//!
//! ## Authors
//!
//! The Ewasm Engine Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.markdown` file in the ewasm-engine root directory for
//! information on licensing and copyright.

#[macro_use]
extern crate num_derive;

mod eei;

pub use eei::common::{
    EeiAPIName, EngineError, EthereumContext, ExecutionResult, ExecutionStatus, FatalEngineError,
    MemoryHandler, OutOfGas, StorageWord, TransactionContext,
};

use crate::eei::wasmi::WasmiRuntimeState;
use anyhow::Result;

/// Executes the contract `program` against the host state in `context`,
/// driving the contract's `main` export to completion on the interpreter.
///
/// Load, import-resolution, and contract-validation failures are returned
/// as errors (an [`EngineError`] is always recoverable by downcasting):
/// no execution has taken place and no partial result exists.  Everything
/// that happens once `main` starts running — a deliberate `finish` or
/// `revert`, gas exhaustion, or an interpreter trap — is reported through
/// the status of the returned [`ExecutionResult`] instead.
///
/// Note that the `execute` function is essentially this library's interface
/// to the outside world, and details exactly what external clients can
/// rely on.
pub fn execute(context: &mut dyn EthereumContext, program: &[u8]) -> Result<ExecutionResult> {
    let mut engine = WasmiRuntimeState::new(context);
    Ok(engine.invoke_entry_point(program)?)
}
