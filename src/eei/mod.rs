//! The Ethereum environment interface (EEI) bridge.
//!
//! The `common` module is interpreter-agnostic: the host-call table, the
//! linear-memory accessor, the EEI operation semantics, and the result and
//! error types.  The `wasmi` module binds all of that to the WASMI
//! interpreter.
//!
//! ## Authors
//!
//! The Ewasm Engine Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.markdown` file in the ewasm-engine root directory for
//! information on licensing and copyright.

pub(crate) mod common;
pub(crate) mod wasmi;
