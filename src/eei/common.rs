//! Common code for any implementation of the Ethereum environment
//! interface (EEI):
//! - The table of recognized host calls and their codes.
//! - An interface for handling linear memory access.
//! - An interface for the host's execution context (gas, storage, call
//!   data, call value).
//! - An EEI wrapper that converts the u32/i64-based parameters arriving
//!   from the WASM contract into properly typed operations on the
//!   execution context, validating memory regions along the way.
//!
//! ## Authors
//!
//! The Ewasm Engine Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.markdown` file in the ewasm-engine root directory for
//! information on licensing and copyright.

#![allow(non_camel_case_types)]

use byteorder::{ByteOrder, LittleEndian};
use err_derive::Error;
use lazy_static::lazy_static;
use std::{
    collections::HashMap,
    convert::TryFrom,
    fmt::{Display, Error as FmtError, Formatter},
    string::String,
    vec::Vec,
};

////////////////////////////////////////////////////////////////////////////////
// Common constants.
////////////////////////////////////////////////////////////////////////////////

/// The name of the `useGas` host function.
pub(crate) const EEI_USE_GAS_NAME: &str = "useGas";
/// The name of the `getGasLeft` host function.
pub(crate) const EEI_GET_GAS_LEFT_NAME: &str = "getGasLeft";
/// The name of the `storageStore` host function.
pub(crate) const EEI_STORAGE_STORE_NAME: &str = "storageStore";
/// The name of the `storageLoad` host function.
pub(crate) const EEI_STORAGE_LOAD_NAME: &str = "storageLoad";
/// The name of the `finish` host function.
pub(crate) const EEI_FINISH_NAME: &str = "finish";
/// The name of the `revert` host function.
pub(crate) const EEI_REVERT_NAME: &str = "revert";
/// The name of the `getCallDataSize` host function.
pub(crate) const EEI_GET_CALL_DATA_SIZE_NAME: &str = "getCallDataSize";
/// The name of the `callDataCopy` host function.
pub(crate) const EEI_CALL_DATA_COPY_NAME: &str = "callDataCopy";
/// The name of the `getCallValue` host function.
pub(crate) const EEI_GET_CALL_VALUE_NAME: &str = "getCallValue";

/// The width, in bytes, of a storage key or value.
pub(crate) const STORAGE_WORD_SIZE: u32 = 32;
/// The width, in bytes, of the call value written by `getCallValue`: a
/// 128-bit little-endian integer.
pub(crate) const CALL_VALUE_SIZE: u32 = 16;

/// A 256-bit storage key or value.
pub type StorageWord = [u8; STORAGE_WORD_SIZE as usize];

////////////////////////////////////////////////////////////////////////////////
// The host-call table.
////////////////////////////////////////////////////////////////////////////////

/// The fixed set of host functions the `ethereum` import namespace
/// provides.  The discriminant doubles as the host-call code that the
/// interpreter hands back at call time.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, PartialEq, ToPrimitive)]
pub enum EeiAPIName {
    USE_GAS = 1,
    GET_GAS_LEFT,
    STORAGE_STORE,
    STORAGE_LOAD,
    FINISH,
    REVERT,
    GET_CALL_DATA_SIZE,
    CALL_DATA_COPY,
    GET_CALL_VALUE,
}

lazy_static! {
    /// The dispatch table from import field name to host-call code.  Built
    /// once; never mutated across executions.
    static ref EEI_HOST_FUNCTION_TABLE: HashMap<&'static str, EeiAPIName> = {
        let mut table = HashMap::new();
        table.insert(EEI_USE_GAS_NAME, EeiAPIName::USE_GAS);
        table.insert(EEI_GET_GAS_LEFT_NAME, EeiAPIName::GET_GAS_LEFT);
        table.insert(EEI_STORAGE_STORE_NAME, EeiAPIName::STORAGE_STORE);
        table.insert(EEI_STORAGE_LOAD_NAME, EeiAPIName::STORAGE_LOAD);
        table.insert(EEI_FINISH_NAME, EeiAPIName::FINISH);
        table.insert(EEI_REVERT_NAME, EeiAPIName::REVERT);
        table.insert(EEI_GET_CALL_DATA_SIZE_NAME, EeiAPIName::GET_CALL_DATA_SIZE);
        table.insert(EEI_CALL_DATA_COPY_NAME, EeiAPIName::CALL_DATA_COPY);
        table.insert(EEI_GET_CALL_VALUE_NAME, EeiAPIName::GET_CALL_VALUE);
        table
    };
}

impl TryFrom<&str> for EeiAPIName {
    type Error = ();

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        EEI_HOST_FUNCTION_TABLE.get(s).copied().ok_or(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// The linear memory accessor.
////////////////////////////////////////////////////////////////////////////////

/// Access to the contract's linear memory, bound once per execution after
/// import resolution and before `main` runs.  All bytes flowing between
/// the host and the contract pass through this trait.
///
/// The accessor itself performs no bounds checking: the EEI operations in
/// [`EeiWrapper`] validate every region computed from contract-supplied
/// offsets and lengths against `memory_size` before touching it.
pub trait MemoryHandler {
    /// Current byte length of the bound linear memory.
    fn memory_size(&self) -> u64;
    /// Reads the byte at `offset`.
    fn get_byte(&self, offset: u32) -> Result<u8, FatalEngineError>;
    /// Writes `byte` at `offset`.
    fn set_byte(&mut self, offset: u32, byte: u8) -> Result<(), FatalEngineError>;

    /// Reads `length` bytes starting at `offset`.
    fn read_buffer(&self, offset: u32, length: u32) -> Result<Vec<u8>, FatalEngineError> {
        (0..length).map(|i| self.get_byte(offset + i)).collect()
    }

    /// Writes `buffer` starting at `offset`.
    fn write_buffer(&mut self, offset: u32, buffer: &[u8]) -> Result<(), FatalEngineError> {
        for (i, byte) in buffer.iter().enumerate() {
            self.set_byte(offset + i as u32, *byte)?;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// The execution context.
////////////////////////////////////////////////////////////////////////////////

/// Marker returned by [`EthereumContext::use_gas`] when a charge exceeds
/// the gas remaining.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OutOfGas;

/// The host state one contract execution operates on: a gas meter,
/// word-addressed persistent storage, the call data, and the call value.
///
/// The context is shared by reference across every host call of a single
/// execution and is never owned by the engine; a fresh execution requires
/// a fresh (or explicitly reused) context.
pub trait EthereumContext {
    /// Gas remaining on the meter.
    fn gas_left(&self) -> i64;
    /// Charges `amount` gas, failing if less than `amount` remains.  A
    /// failed charge leaves the meter empty.
    fn use_gas(&mut self, amount: i64) -> Result<(), OutOfGas>;
    /// The call data supplied with the transaction.
    fn call_data(&self) -> &[u8];
    /// The value, in wei, supplied with the transaction.
    fn call_value(&self) -> u128;
    /// Writes `value` under `key` in persistent storage.
    fn storage_store(&mut self, key: &StorageWord, value: &StorageWord);
    /// Reads the value under `key`, or the all-zero word if absent.
    fn storage_load(&self, key: &StorageWord) -> StorageWord;
}

/// A self-contained [`EthereumContext`]: an in-memory gas meter, call
/// data, call value, and map-backed storage.  Suitable for embedders that
/// do not bring their own blockchain client, and for tests.
pub struct TransactionContext {
    gas_left: i64,
    call_data: Vec<u8>,
    call_value: u128,
    storage: HashMap<StorageWord, StorageWord>,
}

impl TransactionContext {
    /// Creates a context with `gas_limit` on the meter and empty storage.
    pub fn new(gas_limit: i64, call_data: Vec<u8>, call_value: u128) -> Self {
        Self {
            gas_left: gas_limit,
            call_data,
            call_value,
            storage: HashMap::new(),
        }
    }
}

impl EthereumContext for TransactionContext {
    fn gas_left(&self) -> i64 {
        self.gas_left
    }

    fn use_gas(&mut self, amount: i64) -> Result<(), OutOfGas> {
        if amount > self.gas_left {
            self.gas_left = 0;
            return Err(OutOfGas);
        }
        self.gas_left -= amount;
        Ok(())
    }

    fn call_data(&self) -> &[u8] {
        &self.call_data
    }

    fn call_value(&self) -> u128 {
        self.call_value
    }

    fn storage_store(&mut self, key: &StorageWord, value: &StorageWord) {
        self.storage.insert(*key, *value);
    }

    fn storage_load(&self, key: &StorageWord) -> StorageWord {
        self.storage
            .get(key)
            .copied()
            .unwrap_or([0u8; STORAGE_WORD_SIZE as usize])
    }
}

////////////////////////////////////////////////////////////////////////////////
// Execution results.
////////////////////////////////////////////////////////////////////////////////

/// How one contract execution ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecutionStatus {
    /// The contract returned normally or called `finish`.
    Success,
    /// The contract called `revert`.
    Revert,
    /// The gas meter was exhausted.
    OutOfGas,
    /// The interpreter trapped, or a host call was passed an invalid
    /// memory region.
    Failure,
}

/// The outcome of one contract execution, populated incrementally while
/// the contract runs and returned once it has ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutionResult {
    /// How the execution ended.
    pub status: ExecutionStatus,
    /// The bytes the contract passed to `finish` or `revert`, empty
    /// otherwise.
    pub output: Vec<u8>,
    /// Gas charged over the lifetime of the execution.
    pub gas_used: i64,
    /// Gas remaining on the meter when the execution ended.
    pub gas_left: i64,
}

/// The deliberate early-termination signals.  These unwind the interpreter
/// call stack and are converted back into an [`ExecutionStatus`] by the
/// execution driver: they are the normal completion mechanism, not errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Termination {
    /// `finish(offset, length)` was called.
    Finish,
    /// `revert(offset, length)` was called.
    Revert,
    /// A gas charge exceeded the gas remaining.
    OutOfGas,
}

impl Termination {
    /// The result status this termination stands for.
    pub(crate) fn status(&self) -> ExecutionStatus {
        match self {
            Termination::Finish => ExecutionStatus::Success,
            Termination::Revert => ExecutionStatus::Revert,
            Termination::OutOfGas => ExecutionStatus::OutOfGas,
        }
    }
}

impl Display for Termination {
    fn fmt(&self, f: &mut Formatter) -> Result<(), FmtError> {
        match self {
            Termination::Finish => write!(f, "execution finished deliberately via 'finish'"),
            Termination::Revert => write!(f, "execution reverted deliberately via 'revert'"),
            Termination::OutOfGas => write!(f, "execution ran out of gas"),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Contract validation errors.
////////////////////////////////////////////////////////////////////////////////

/// Errors raised before any contract code runs: the binary failed to load,
/// an import could not be resolved, or a module-level invariant of the
/// contract interface does not hold.  None of these carries a partial
/// execution result.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The WASM contract was invalid and could not be decoded or
    /// validated.
    #[error(display = "EngineError: Invalid WASM contract (e.g. failed to decode it).")]
    InvalidWASMModule,
    /// An import declared by the contract is unknown to the host
    /// namespace, has a mismatched signature, or is not a function import.
    #[error(display = "EngineError: Import resolution failed: {}.", _0)]
    ImportResolution(String),
    /// The contract could not be instantiated for some other reason.
    #[error(display = "EngineError: Failed to instantiate the WASM contract: {}.", _0)]
    ModuleInstantiation(String),
    /// No linear memory was defined, or it is not exported as `"memory"`.
    #[error(
        display = "EngineError: The contract does not define and export exactly one linear memory."
    )]
    NoLinearMemory,
    /// More than one linear memory was defined.
    #[error(display = "EngineError: The contract defines more than one linear memory.")]
    MultipleLinearMemories,
    /// The contract declares a start function.
    #[error(display = "EngineError: The contract declares a start function.")]
    StartFunctionPresent,
    /// The contract does not export `"main"`.
    #[error(display = "EngineError: No export named \"main\" was found in the contract.")]
    NoEntryPoint,
    /// The contract exports `"main"`, but not as a function.
    #[error(display = "EngineError: The export named \"main\" is not a function.")]
    EntryPointNotFunction,
}

impl From<wasmi::Error> for EngineError {
    fn from(error: wasmi::Error) -> Self {
        match error {
            wasmi::Error::Instantiation(reason) => EngineError::ImportResolution(reason),
            wasmi::Error::Validation(_) => EngineError::InvalidWASMModule,
            otherwise => EngineError::ModuleInstantiation(format!("{:?}", otherwise)),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Fatal host-call errors.
////////////////////////////////////////////////////////////////////////////////

/// Errors raised while a host call is in flight.  These abort the
/// interpreter with a trap that the contract cannot observe or recover
/// from, and surface as [`ExecutionStatus::Failure`].
#[derive(Debug, Error)]
pub enum FatalEngineError {
    /// The interpreter passed a host call the wrong number of arguments.
    /// This should never happen once import resolution has verified the
    /// signature; seeing it indicates an engine bug.
    #[error(
        display = "FatalEngineError: Bad arguments passed to host function '{:?}'.",
        function_name
    )]
    BadArgumentsToHostFunction {
        /// The host function that was being invoked.
        function_name: EeiAPIName,
    },
    /// The contract invoked a host-call code outside the dispatch table.
    #[error(display = "FatalEngineError: Unknown host call invoked: '{}'.", _0)]
    UnknownHostFunction(usize),
    /// No linear memory was bound: this is a programming error (a bug)
    /// that should be fixed.
    #[error(display = "FatalEngineError: No WASM memory registered.")]
    NoMemoryRegistered,
    /// No contract module was bound: this is a programming error (a bug)
    /// that should be fixed.
    #[error(display = "FatalEngineError: No WASM contract module registered.")]
    NoProgramModuleRegistered,
    /// The contract supplied a memory region lying outside linear memory.
    #[error(
        display = "FatalEngineError: Memory region at offset {} with length {} lies outside linear memory.",
        offset,
        length
    )]
    MemoryBoundsExceeded {
        /// Start of the rejected region.
        offset: u32,
        /// Length of the rejected region.
        length: u32,
    },
    /// A byte read failed inside a validated region.
    #[error(display = "FatalEngineError: Failed to read linear memory at offset {}.", _0)]
    MemoryReadFailed(u32),
    /// A byte write failed inside a validated region.
    #[error(display = "FatalEngineError: Failed to write linear memory at offset {}.", _0)]
    MemoryWriteFailed(u32),
}

impl From<EeiAPIName> for FatalEngineError {
    fn from(function_name: EeiAPIName) -> Self {
        FatalEngineError::BadArgumentsToHostFunction { function_name }
    }
}

/// The failure channel of a single EEI operation: either a deliberate
/// termination (to be treated as normal completion by the driver) or a
/// fatal host fault.
#[derive(Debug)]
pub(crate) enum EeiError {
    /// The operation deliberately ended the execution.
    Terminated(Termination),
    /// The operation failed with a host fault.
    Fatal(FatalEngineError),
}

impl From<FatalEngineError> for EeiError {
    fn from(error: FatalEngineError) -> Self {
        EeiError::Fatal(error)
    }
}

////////////////////////////////////////////////////////////////////////////////
// The EEI wrapper.
////////////////////////////////////////////////////////////////////////////////

/// The EEI operations, interpreter-agnostic: each takes native scalars
/// already extracted from the interpreter's typed values, validates any
/// contract-supplied memory region, moves bytes through the
/// [`MemoryHandler`], and delegates persistent state to the
/// [`EthereumContext`].  Output captured by `finish`/`revert` is held here
/// until the driver assembles the final [`ExecutionResult`].
pub(crate) struct EeiWrapper<'a> {
    /// The execution context, borrowed for the lifetime of one execution.
    context: &'a mut dyn EthereumContext,
    /// Gas on the meter when the wrapper was created, for `gas_used`
    /// accounting.
    start_gas: i64,
    /// The bytes passed to `finish` or `revert`, if either was called.
    output: Vec<u8>,
}

impl<'a> EeiWrapper<'a> {
    /// The name of the WASM contract's entry point.
    pub(crate) const ENTRY_POINT_NAME: &'static str = "main";
    /// The name under which the contract must export its linear memory.
    pub(crate) const LINEAR_MEMORY_NAME: &'static str = "memory";
    /// The import namespace this engine provides.
    pub(crate) const HOST_MODULE_NAME: &'static str = "ethereum";

    pub(crate) fn new(context: &'a mut dyn EthereumContext) -> Self {
        let start_gas = context.gas_left();
        Self {
            context,
            start_gas,
            output: Vec::new(),
        }
    }

    /// Checks that `[offset, offset + length)` lies within the bound
    /// linear memory.  Every region computed from contract-supplied values
    /// passes through here before any byte moves.
    fn ensure_region<T: MemoryHandler>(
        memory: &T,
        offset: u32,
        length: u32,
    ) -> Result<(), FatalEngineError> {
        if u64::from(offset) + u64::from(length) <= memory.memory_size() {
            Ok(())
        } else {
            Err(FatalEngineError::MemoryBoundsExceeded { offset, length })
        }
    }

    /// Reads one 32-byte storage word at `offset`.
    fn read_word<T: MemoryHandler>(
        memory: &T,
        offset: u32,
    ) -> Result<StorageWord, FatalEngineError> {
        Self::ensure_region(memory, offset, STORAGE_WORD_SIZE)?;
        let bytes = memory.read_buffer(offset, STORAGE_WORD_SIZE)?;
        let mut word = [0u8; STORAGE_WORD_SIZE as usize];
        word.copy_from_slice(&bytes);
        Ok(word)
    }

    /// The EEI `useGas` operation.  A charge exceeding the gas remaining
    /// (or a negative charge) terminates the execution.
    pub(crate) fn use_gas(&mut self, amount: i64) -> Result<(), EeiError> {
        if amount < 0 {
            return Err(EeiError::Terminated(Termination::OutOfGas));
        }
        self.context
            .use_gas(amount)
            .map_err(|OutOfGas| EeiError::Terminated(Termination::OutOfGas))
    }

    /// The EEI `getGasLeft` operation.
    pub(crate) fn gas_left(&self) -> i64 {
        self.context.gas_left()
    }

    /// The EEI `storageStore` operation: reads the 32-byte key at
    /// `path_offset` and the 32-byte value at `value_offset` from linear
    /// memory and writes them through to persistent storage.
    pub(crate) fn storage_store<T: MemoryHandler>(
        &mut self,
        memory: &T,
        path_offset: u32,
        value_offset: u32,
    ) -> Result<(), EeiError> {
        let path = Self::read_word(memory, path_offset)?;
        let value = Self::read_word(memory, value_offset)?;
        self.context.storage_store(&path, &value);
        Ok(())
    }

    /// The EEI `storageLoad` operation: reads the 32-byte key at
    /// `path_offset`, loads the stored value, and writes it to linear
    /// memory at `value_offset`.
    pub(crate) fn storage_load<T: MemoryHandler>(
        &mut self,
        memory: &mut T,
        path_offset: u32,
        value_offset: u32,
    ) -> Result<(), EeiError> {
        let path = Self::read_word(memory, path_offset)?;
        Self::ensure_region(memory, value_offset, STORAGE_WORD_SIZE)?;
        let value = self.context.storage_load(&path);
        memory.write_buffer(value_offset, &value)?;
        Ok(())
    }

    /// The EEI `finish` operation: captures `length` bytes of output
    /// starting at `offset` and terminates the execution successfully.
    pub(crate) fn finish<T: MemoryHandler>(
        &mut self,
        memory: &T,
        offset: u32,
        length: u32,
    ) -> Result<(), EeiError> {
        self.capture_output(memory, offset, length)?;
        Err(EeiError::Terminated(Termination::Finish))
    }

    /// The EEI `revert` operation: captures output exactly as `finish`
    /// does, then terminates the execution with revert status.
    pub(crate) fn revert<T: MemoryHandler>(
        &mut self,
        memory: &T,
        offset: u32,
        length: u32,
    ) -> Result<(), EeiError> {
        self.capture_output(memory, offset, length)?;
        Err(EeiError::Terminated(Termination::Revert))
    }

    fn capture_output<T: MemoryHandler>(
        &mut self,
        memory: &T,
        offset: u32,
        length: u32,
    ) -> Result<(), FatalEngineError> {
        Self::ensure_region(memory, offset, length)?;
        self.output = memory.read_buffer(offset, length)?;
        Ok(())
    }

    /// The EEI `getCallDataSize` operation.
    pub(crate) fn call_data_size(&self) -> u32 {
        self.context.call_data().len() as u32
    }

    /// The EEI `callDataCopy` operation: copies `length` bytes of call
    /// data starting at `data_offset` into linear memory at
    /// `result_offset`, zero-padding past the end of the call data.
    pub(crate) fn call_data_copy<T: MemoryHandler>(
        &mut self,
        memory: &mut T,
        result_offset: u32,
        data_offset: u32,
        length: u32,
    ) -> Result<(), EeiError> {
        Self::ensure_region(memory, result_offset, length)?;
        let call_data = self.context.call_data();
        let mut buffer = vec![0u8; length as usize];
        for (i, byte) in buffer.iter_mut().enumerate() {
            let index = u64::from(data_offset) + i as u64;
            if index < call_data.len() as u64 {
                *byte = call_data[index as usize];
            }
        }
        memory.write_buffer(result_offset, &buffer)?;
        Ok(())
    }

    /// The EEI `getCallValue` operation: writes the call value as a
    /// 128-bit little-endian integer at `result_offset`.
    pub(crate) fn get_call_value<T: MemoryHandler>(
        &mut self,
        memory: &mut T,
        result_offset: u32,
    ) -> Result<(), EeiError> {
        Self::ensure_region(memory, result_offset, CALL_VALUE_SIZE)?;
        let mut buffer = [0u8; CALL_VALUE_SIZE as usize];
        LittleEndian::write_u128(&mut buffer, self.context.call_value());
        memory.write_buffer(result_offset, &buffer)?;
        Ok(())
    }

    /// Assembles the final execution result under `status`, reading the
    /// gas accounting off the context.
    pub(crate) fn result(&self, status: ExecutionStatus) -> ExecutionResult {
        let gas_left = self.context.gas_left();
        ExecutionResult {
            status,
            output: self.output.clone(),
            gas_used: self.start_gas - gas_left,
            gas_left,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests.
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// A flat byte buffer standing in for the interpreter's linear memory.
    struct FlatMemory(Vec<u8>);

    impl MemoryHandler for FlatMemory {
        fn memory_size(&self) -> u64 {
            self.0.len() as u64
        }

        fn get_byte(&self, offset: u32) -> Result<u8, FatalEngineError> {
            self.0
                .get(offset as usize)
                .copied()
                .ok_or(FatalEngineError::MemoryReadFailed(offset))
        }

        fn set_byte(&mut self, offset: u32, byte: u8) -> Result<(), FatalEngineError> {
            match self.0.get_mut(offset as usize) {
                Some(slot) => {
                    *slot = byte;
                    Ok(())
                }
                None => Err(FatalEngineError::MemoryWriteFailed(offset)),
            }
        }
    }

    fn assert_terminated(error: EeiError, expected: Termination) {
        match error {
            EeiError::Terminated(t) => assert_eq!(t, expected),
            EeiError::Fatal(e) => panic!("expected termination, got fatal error: {}", e),
        }
    }

    #[test]
    fn finish_captures_output_and_terminates() {
        let mut context = TransactionContext::new(100, Vec::new(), 0);
        let mut eei = EeiWrapper::new(&mut context);
        let mut memory = FlatMemory(vec![0u8; 64]);
        memory.write_buffer(8, &[1, 2, 3, 4]).unwrap();

        let error = eei.finish(&mut memory, 8, 4).unwrap_err();
        assert_terminated(error, Termination::Finish);
        let result = eei.result(ExecutionStatus::Success);
        assert_eq!(result.output, vec![1, 2, 3, 4]);
    }

    #[test]
    fn finish_out_of_bounds_is_fatal() {
        let mut context = TransactionContext::new(100, Vec::new(), 0);
        let mut eei = EeiWrapper::new(&mut context);
        let memory = FlatMemory(vec![0u8; 16]);

        match eei.finish(&memory, 8, 9).unwrap_err() {
            EeiError::Fatal(FatalEngineError::MemoryBoundsExceeded { offset: 8, length: 9 }) => (),
            otherwise => panic!("expected bounds fault, got {:?}", otherwise),
        }
    }

    #[test]
    fn gas_charges_are_metered() {
        let mut context = TransactionContext::new(1000, Vec::new(), 0);
        let mut eei = EeiWrapper::new(&mut context);

        eei.use_gas(100).unwrap();
        assert_eq!(eei.gas_left(), 900);
        eei.use_gas(900).unwrap();
        assert_eq!(eei.gas_left(), 0);
    }

    #[test]
    fn overdrawn_gas_terminates_and_empties_the_meter() {
        let mut context = TransactionContext::new(10, Vec::new(), 0);
        let mut eei = EeiWrapper::new(&mut context);

        let error = eei.use_gas(11).unwrap_err();
        assert_terminated(error, Termination::OutOfGas);
        assert_eq!(eei.gas_left(), 0);

        let result = eei.result(ExecutionStatus::OutOfGas);
        assert_eq!(result.gas_used, 10);
        assert_eq!(result.gas_left, 0);
    }

    #[test]
    fn negative_gas_charge_terminates() {
        let mut context = TransactionContext::new(10, Vec::new(), 0);
        let mut eei = EeiWrapper::new(&mut context);
        assert_terminated(eei.use_gas(-1).unwrap_err(), Termination::OutOfGas);
    }

    #[test]
    fn storage_words_round_trip_through_memory() {
        let mut context = TransactionContext::new(100, Vec::new(), 0);
        let mut eei = EeiWrapper::new(&mut context);
        let mut memory = FlatMemory(vec![0u8; 128]);

        let key = [0x11u8; 32];
        let value = [0x22u8; 32];
        memory.write_buffer(0, &key).unwrap();
        memory.write_buffer(32, &value).unwrap();

        eei.storage_store(&memory, 0, 32).unwrap();
        eei.storage_load(&mut memory, 0, 64).unwrap();
        assert_eq!(memory.read_buffer(64, 32).unwrap(), value.to_vec());
    }

    #[test]
    fn absent_storage_loads_as_zero() {
        let context = TransactionContext::new(0, Vec::new(), 0);
        assert_eq!(context.storage_load(&[9u8; 32]), [0u8; 32]);
    }

    #[test]
    fn call_data_copy_zero_pads_past_the_end() {
        let mut context = TransactionContext::new(100, vec![0xaa, 0xbb], 0);
        let mut eei = EeiWrapper::new(&mut context);
        let mut memory = FlatMemory(vec![0xffu8; 16]);

        eei.call_data_copy(&mut memory, 0, 1, 4).unwrap();
        assert_eq!(memory.read_buffer(0, 4).unwrap(), vec![0xbb, 0, 0, 0]);
    }

    #[test]
    fn call_value_is_written_little_endian() {
        let mut context = TransactionContext::new(100, Vec::new(), 0x0102);
        let mut eei = EeiWrapper::new(&mut context);
        let mut memory = FlatMemory(vec![0u8; 16]);

        eei.get_call_value(&mut memory, 0).unwrap();
        let mut expected = vec![0u8; 16];
        expected[0] = 0x02;
        expected[1] = 0x01;
        assert_eq!(memory.read_buffer(0, 16).unwrap(), expected);
    }

    #[test]
    fn host_call_table_covers_all_names() {
        for (name, code) in [
            (EEI_USE_GAS_NAME, EeiAPIName::USE_GAS),
            (EEI_GET_GAS_LEFT_NAME, EeiAPIName::GET_GAS_LEFT),
            (EEI_STORAGE_STORE_NAME, EeiAPIName::STORAGE_STORE),
            (EEI_STORAGE_LOAD_NAME, EeiAPIName::STORAGE_LOAD),
            (EEI_FINISH_NAME, EeiAPIName::FINISH),
            (EEI_REVERT_NAME, EeiAPIName::REVERT),
            (EEI_GET_CALL_DATA_SIZE_NAME, EeiAPIName::GET_CALL_DATA_SIZE),
            (EEI_CALL_DATA_COPY_NAME, EeiAPIName::CALL_DATA_COPY),
            (EEI_GET_CALL_VALUE_NAME, EeiAPIName::GET_CALL_VALUE),
        ]
        .iter()
        {
            assert_eq!(EeiAPIName::try_from(*name), Ok(*code));
        }
        assert_eq!(EeiAPIName::try_from("getBlockHash"), Err(()));
    }
}
