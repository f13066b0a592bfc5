//! An implementation of the EEI runtime state for WASMI.
//!
//! Resolves the contract's imports against the `ethereum` host namespace,
//! dispatches host calls arriving from the interpreter to the EEI
//! operations, and drives the contract's `main` export to completion,
//! folding deliberate terminations back into an ordinary execution result.
//!
//! ## Authors
//!
//! The Ewasm Engine Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.markdown` file in the ewasm-engine root directory for
//! information on licensing and copyright.

use crate::eei::common::{
    EeiAPIName, EeiError, EeiWrapper, EngineError, EthereumContext, ExecutionResult,
    ExecutionStatus, FatalEngineError, MemoryHandler, Termination,
};
use log::{debug, error, info};
use num::FromPrimitive;
use parity_wasm::elements::{External, Module as RawModule};
use std::{boxed::Box, convert::TryFrom, string::ToString, vec::Vec};
use wasmi::{
    memory_units::Bytes, Error, ExternVal, Externals, FuncInstance, FuncRef, GlobalDescriptor,
    GlobalRef, HostError, ImportsBuilder, MemoryDescriptor, MemoryRef, Module,
    ModuleImportResolver, ModuleInstance, ModuleRef, RuntimeArgs, RuntimeValue, Signature,
    TableDescriptor, TableRef, Trap, TrapKind, ValueType,
};

////////////////////////////////////////////////////////////////////////////////
// Host errors and traps.
////////////////////////////////////////////////////////////////////////////////

impl HostError for FatalEngineError {}
impl HostError for Termination {}

/// Lifts an EEI failure into a WASMI trap so that it unwinds the
/// interpreter call stack.  The driver inspects the trap afterwards to
/// tell deliberate terminations apart from genuine faults.
fn mk_host_trap(error: EeiError) -> Trap {
    match error {
        EeiError::Terminated(termination) => Trap::new(TrapKind::Host(Box::new(termination))),
        EeiError::Fatal(fatal) => Trap::new(TrapKind::Host(Box::new(fatal))),
    }
}

////////////////////////////////////////////////////////////////////////////////
// The WASMI runtime state.
////////////////////////////////////////////////////////////////////////////////

/// Impl the MemoryHandler for MemoryRef.  This allows passing the
/// interpreter's own linear memory to the EEI operations.
impl MemoryHandler for MemoryRef {
    fn memory_size(&self) -> u64 {
        let bytes: Bytes = self.current_size().into();
        bytes.0 as u64
    }

    fn get_byte(&self, offset: u32) -> Result<u8, FatalEngineError> {
        let bytes = self
            .get(offset, 1)
            .map_err(|_| FatalEngineError::MemoryReadFailed(offset))?;
        bytes
            .first()
            .copied()
            .ok_or(FatalEngineError::MemoryReadFailed(offset))
    }

    fn set_byte(&mut self, offset: u32, byte: u8) -> Result<(), FatalEngineError> {
        self.set(offset, &[byte])
            .map_err(|_| FatalEngineError::MemoryWriteFailed(offset))
    }

    #[inline]
    fn read_buffer(&self, offset: u32, length: u32) -> Result<Vec<u8>, FatalEngineError> {
        self.get(offset, length as usize)
            .map_err(|_| FatalEngineError::MemoryReadFailed(offset))
    }

    #[inline]
    fn write_buffer(&mut self, offset: u32, buffer: &[u8]) -> Result<(), FatalEngineError> {
        self.set(offset, buffer)
            .map_err(|_| FatalEngineError::MemoryWriteFailed(offset))
    }
}

/// The WASMI runtime state: the EEI wrapper around the host's execution
/// context, together with the contract module and linear memory once
/// `load_program` has bound them.
pub(crate) struct WasmiRuntimeState<'a> {
    /// The EEI wrapper around the execution context.
    eei: EeiWrapper<'a>,
    /// A reference to the WASM contract module that will execute.
    program_module: Option<ModuleRef>,
    /// A reference to the WASM contract's linear memory (or "heap").
    memory: Option<MemoryRef>,
}

/// The return type of a single host-call implementation: the value handed
/// back to the interpreter on success, or the EEI failure that becomes a
/// trap.
type EeiCallResult = Result<Option<RuntimeValue>, EeiError>;

////////////////////////////////////////////////////////////////////////////////
// Constants.
////////////////////////////////////////////////////////////////////////////////

/// A type check struct.
struct TypeCheck {}

impl TypeCheck {
    /// The representation type of a gas amount or gas counter.
    const GAS: ValueType = ValueType::I64;
    /// The representation type of WASM pointers (assuming `wasm32`).
    const POINTER: ValueType = ValueType::I32;
    /// The representation type of WASM buffer lengths and offsets into
    /// host-side data (assuming `wasm32`).
    const SIZE_T: ValueType = ValueType::I32;

    ////////////////////////////////////////////////////////////////////////////
    // Function well-formedness checks.
    ////////////////////////////////////////////////////////////////////////////

    /// Checks the function signature, `signature`, has the correct type for
    /// the host call coded by `index`.
    pub(self) fn check_signature(index: EeiAPIName, signature: &Signature) -> bool {
        let expected_params = Self::get_params(index);
        if signature.params() != expected_params.as_slice() {
            return false;
        }
        signature.return_type() == Self::get_return_type(index)
    }

    /// Return the parameters list of the host function coded by `index`.
    pub(crate) fn get_params(index: EeiAPIName) -> Vec<ValueType> {
        match index {
            EeiAPIName::USE_GAS => vec![Self::GAS],
            EeiAPIName::GET_GAS_LEFT => Vec::new(),
            EeiAPIName::STORAGE_STORE => vec![Self::POINTER, Self::POINTER],
            EeiAPIName::STORAGE_LOAD => vec![Self::POINTER, Self::POINTER],
            EeiAPIName::FINISH => vec![Self::POINTER, Self::SIZE_T],
            EeiAPIName::REVERT => vec![Self::POINTER, Self::SIZE_T],
            EeiAPIName::GET_CALL_DATA_SIZE => Vec::new(),
            EeiAPIName::CALL_DATA_COPY => vec![Self::POINTER, Self::SIZE_T, Self::SIZE_T],
            EeiAPIName::GET_CALL_VALUE => vec![Self::POINTER],
        }
    }

    /// Return the result type of the host function coded by `index`.  Only
    /// `getGasLeft` and `getCallDataSize` return anything.
    pub(crate) fn get_return_type(index: EeiAPIName) -> Option<ValueType> {
        match index {
            EeiAPIName::GET_GAS_LEFT => Some(Self::GAS),
            EeiAPIName::GET_CALL_DATA_SIZE => Some(Self::SIZE_T),
            _otherwise => None,
        }
    }

    /// Check if the number of parameters in `args` is correct against the
    /// host function coded by `index`.  Return
    /// `FatalEngineError::BadArgumentsToHostFunction`, if not.
    pub(crate) fn check_args_number(
        args: &RuntimeArgs,
        index: EeiAPIName,
    ) -> Result<(), FatalEngineError> {
        if args.len() == Self::get_params(index).len() {
            Ok(())
        } else {
            Err(index.into())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Module-level well-formedness checks.
////////////////////////////////////////////////////////////////////////////////

/// Counts the linear memories the contract defines or imports, which must
/// come to exactly one.  The count is read off the raw module sections
/// since the instantiated module only exposes exports.
fn check_linear_memory_count(buffer: &[u8]) -> Result<(), EngineError> {
    let module: RawModule =
        parity_wasm::deserialize_buffer(buffer).map_err(|_| EngineError::InvalidWASMModule)?;
    let defined = module.memory_section().map_or(0, |s| s.entries().len());
    let imported = module.import_section().map_or(0, |s| {
        s.entries()
            .iter()
            .filter(|entry| matches!(entry.external(), External::Memory(_)))
            .count()
    });

    match defined + imported {
        0 => Err(EngineError::NoLinearMemory),
        1 => Ok(()),
        _otherwise => Err(EngineError::MultipleLinearMemories),
    }
}

/// Checks that the contract exports an entry point under the expected name,
/// and that the export is a function.
fn check_entry_point(module: &ModuleRef) -> Result<(), EngineError> {
    match module.export_by_name(EeiWrapper::ENTRY_POINT_NAME) {
        Some(ExternVal::Func(_funcref)) => Ok(()),
        Some(_otherwise) => Err(EngineError::EntryPointNotFunction),
        None => Err(EngineError::NoEntryPoint),
    }
}

/// Finds the linear memory of the WASM contract, `module`, and returns it.
/// The contract interface requires the memory to be exported under a fixed
/// name.
fn get_module_memory(module: &ModuleRef) -> Result<MemoryRef, EngineError> {
    match module.export_by_name(EeiWrapper::LINEAR_MEMORY_NAME) {
        Some(ExternVal::Memory(memoryref)) => Ok(memoryref),
        _otherwise => Err(EngineError::NoLinearMemory),
    }
}

////////////////////////////////////////////////////////////////////////////////
// The host-call interface.
////////////////////////////////////////////////////////////////////////////////

impl<'a> ModuleImportResolver for WasmiRuntimeState<'a> {
    /// "Resolves" a host call by translating from an import field name,
    /// `field_name`, to the corresponding host-call code.  Every import the
    /// contract declares against this namespace must name a known host
    /// function and carry exactly its signature.
    fn resolve_func(&self, field_name: &str, signature: &Signature) -> Result<FuncRef, Error> {
        let index = EeiAPIName::try_from(field_name).map_err(|_| {
            Error::Instantiation(format!(
                "Unknown function {} with signature: {:?}.",
                field_name, signature
            ))
        })?;

        if !TypeCheck::check_signature(index, signature) {
            Err(Error::Instantiation(format!(
                "Function {} has an unexpected type-signature: {:?}.",
                field_name, signature
            )))
        } else {
            debug!("Importing host function '{}' as {:?}.", field_name, index);
            Ok(FuncInstance::alloc_host(signature.clone(), index as usize))
        }
    }

    fn resolve_global(
        &self,
        field_name: &str,
        _descriptor: &GlobalDescriptor,
    ) -> Result<GlobalRef, Error> {
        Err(Error::Instantiation(field_name.to_string()))
    }

    fn resolve_memory(
        &self,
        field_name: &str,
        _descriptor: &MemoryDescriptor,
    ) -> Result<MemoryRef, Error> {
        Err(Error::Instantiation(field_name.to_string()))
    }

    fn resolve_table(
        &self,
        field_name: &str,
        _descriptor: &TableDescriptor,
    ) -> Result<TableRef, Error> {
        Err(Error::Instantiation(field_name.to_string()))
    }
}

impl<'a> Externals for WasmiRuntimeState<'a> {
    fn invoke_index(
        &mut self,
        index: usize,
        args: RuntimeArgs,
    ) -> Result<Option<RuntimeValue>, Trap> {
        let eei_call_index =
            EeiAPIName::from_usize(index).ok_or(FatalEngineError::UnknownHostFunction(index))?;

        let result = match eei_call_index {
            EeiAPIName::USE_GAS => self.eei_use_gas(args),
            EeiAPIName::GET_GAS_LEFT => self.eei_get_gas_left(args),
            EeiAPIName::STORAGE_STORE => self.eei_storage_store(args),
            EeiAPIName::STORAGE_LOAD => self.eei_storage_load(args),
            EeiAPIName::FINISH => self.eei_finish(args),
            EeiAPIName::REVERT => self.eei_revert(args),
            EeiAPIName::GET_CALL_DATA_SIZE => self.eei_get_call_data_size(args),
            EeiAPIName::CALL_DATA_COPY => self.eei_call_data_copy(args),
            EeiAPIName::GET_CALL_VALUE => self.eei_get_call_value(args),
        };
        result.map_err(mk_host_trap)
    }
}

/// Functionality of the `WasmiRuntimeState` type that relies on it
/// satisfying the `Externals` and `ModuleImportResolver` constraints.
impl<'a> WasmiRuntimeState<'a> {
    /// Creates a new runtime state around the execution context `context`,
    /// with no contract loaded yet.
    #[inline]
    pub(crate) fn new(context: &'a mut dyn EthereumContext) -> Self {
        Self {
            eei: EeiWrapper::new(context),
            program_module: None,
            memory: None,
        }
    }

    /// Returns the ref to the wasm memory or a fatal error if none is
    /// bound.
    #[inline]
    pub(crate) fn memory(&self) -> Result<MemoryRef, FatalEngineError> {
        match &self.memory {
            Some(m) => Ok(m.clone()),
            None => Err(FatalEngineError::NoMemoryRegistered),
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Loading and executing the contract.
    ////////////////////////////////////////////////////////////////////////////

    /// Loads a compiled contract into the runtime state.  Tries to parse
    /// `buffer` to obtain a WASM `Module` struct, resolves its imports
    /// against the host namespace, and checks the module-level requirements
    /// of the contract interface: no start function, exactly one linear
    /// memory exported under the expected name, and a `main` function
    /// export.
    fn load_program(&mut self, buffer: &[u8]) -> Result<(), EngineError> {
        let module = Module::from_buffer(buffer)?;
        let env_resolver =
            ImportsBuilder::new().with_resolver(EeiWrapper::HOST_MODULE_NAME, self);

        let not_started_module_ref = ModuleInstance::new(&module, &env_resolver)?;
        if not_started_module_ref.has_start() {
            return Err(EngineError::StartFunctionPresent);
        }

        let module_ref = not_started_module_ref.assert_no_start();

        check_linear_memory_count(buffer)?;
        check_entry_point(&module_ref)?;

        let linear_memory = get_module_memory(&module_ref)?;
        self.program_module = Some(module_ref);
        self.memory = Some(linear_memory);
        Ok(())
    }

    /// Invokes an exported entry point function with a given name,
    /// `export_name`, in the WASM contract loaded into the runtime state.
    fn invoke_export(&mut self, export_name: &str) -> Result<Option<RuntimeValue>, Error> {
        let module = match self.program_module.as_ref().cloned() {
            None => {
                return Err(Error::Host(Box::new(
                    FatalEngineError::NoProgramModuleRegistered,
                )))
            }
            Some(module) => module,
        };

        module.invoke_export(export_name, &[], self)
    }

    /// Executes the entry point of the WASM contract `program`.
    ///
    /// Returns an error if the contract fails to load, resolve, or
    /// instantiate, or violates a module-level requirement of the contract
    /// interface: in those cases no contract code has run and no partial
    /// result exists.
    ///
    /// Once `main` is running every outcome is reported through the status
    /// of the returned result: a normal return or a deliberate `finish` is
    /// a success, `revert` and gas exhaustion carry their own statuses, and
    /// an interpreter trap (or a host call handed an invalid memory region)
    /// is a failure with the gas spent so far accounted for.
    pub(crate) fn invoke_entry_point(
        &mut self,
        program: &[u8],
    ) -> Result<ExecutionResult, EngineError> {
        self.load_program(program)?;
        info!(
            "Contract loaded ({} bytes), invoking '{}'.",
            program.len(),
            EeiWrapper::ENTRY_POINT_NAME
        );

        let status = match self.invoke_export(EeiWrapper::ENTRY_POINT_NAME) {
            Ok(_return_value) => ExecutionStatus::Success,
            Err(Error::Trap(trap)) => match trap.kind() {
                TrapKind::Host(host_error) => match host_error.downcast_ref::<Termination>() {
                    Some(termination) => {
                        info!("Contract terminated: {}.", termination);
                        termination.status()
                    }
                    None => {
                        error!("Contract faulted in a host call: {:?}.", host_error);
                        ExecutionStatus::Failure
                    }
                },
                otherwise => {
                    error!("Contract trapped: {:?}.", otherwise);
                    ExecutionStatus::Failure
                }
            },
            Err(Error::Host(host_error)) => {
                error!("Contract faulted in a host call: {:?}.", host_error);
                ExecutionStatus::Failure
            }
            Err(otherwise) => return Err(EngineError::from(otherwise)),
        };

        Ok(self.eei.result(status))
    }

    ////////////////////////////////////////////////////////////////////////////
    // The EEI host-call implementations.
    ////////////////////////////////////////////////////////////////////////////

    /// The implementation of the EEI `useGas` function.
    fn eei_use_gas(&mut self, args: RuntimeArgs) -> EeiCallResult {
        TypeCheck::check_args_number(&args, EeiAPIName::USE_GAS)?;
        let amount = args.nth::<i64>(0);
        self.eei.use_gas(amount)?;
        Ok(None)
    }

    /// The implementation of the EEI `getGasLeft` function.
    fn eei_get_gas_left(&mut self, args: RuntimeArgs) -> EeiCallResult {
        TypeCheck::check_args_number(&args, EeiAPIName::GET_GAS_LEFT)?;
        Ok(Some(RuntimeValue::I64(self.eei.gas_left())))
    }

    /// The implementation of the EEI `storageStore` function.
    fn eei_storage_store(&mut self, args: RuntimeArgs) -> EeiCallResult {
        TypeCheck::check_args_number(&args, EeiAPIName::STORAGE_STORE)?;
        let path_offset = args.nth::<u32>(0);
        let value_offset = args.nth::<u32>(1);
        self.eei
            .storage_store(&self.memory()?, path_offset, value_offset)?;
        Ok(None)
    }

    /// The implementation of the EEI `storageLoad` function.
    fn eei_storage_load(&mut self, args: RuntimeArgs) -> EeiCallResult {
        TypeCheck::check_args_number(&args, EeiAPIName::STORAGE_LOAD)?;
        let path_offset = args.nth::<u32>(0);
        let value_offset = args.nth::<u32>(1);
        self.eei
            .storage_load(&mut self.memory()?, path_offset, value_offset)?;
        Ok(None)
    }

    /// The implementation of the EEI `finish` function.  This halts the
    /// interpreter; no value is returned to the calling WASM contract.
    fn eei_finish(&mut self, args: RuntimeArgs) -> EeiCallResult {
        TypeCheck::check_args_number(&args, EeiAPIName::FINISH)?;
        let offset = args.nth::<u32>(0);
        let length = args.nth::<u32>(1);
        self.eei.finish(&self.memory()?, offset, length)?;
        Ok(None)
    }

    /// The implementation of the EEI `revert` function.  This halts the
    /// interpreter exactly as `finish` does, differing only in the status
    /// reported to the embedder.
    fn eei_revert(&mut self, args: RuntimeArgs) -> EeiCallResult {
        TypeCheck::check_args_number(&args, EeiAPIName::REVERT)?;
        let offset = args.nth::<u32>(0);
        let length = args.nth::<u32>(1);
        self.eei.revert(&self.memory()?, offset, length)?;
        Ok(None)
    }

    /// The implementation of the EEI `getCallDataSize` function.
    fn eei_get_call_data_size(&mut self, args: RuntimeArgs) -> EeiCallResult {
        TypeCheck::check_args_number(&args, EeiAPIName::GET_CALL_DATA_SIZE)?;
        Ok(Some(RuntimeValue::I32(self.eei.call_data_size() as i32)))
    }

    /// The implementation of the EEI `callDataCopy` function.
    fn eei_call_data_copy(&mut self, args: RuntimeArgs) -> EeiCallResult {
        TypeCheck::check_args_number(&args, EeiAPIName::CALL_DATA_COPY)?;
        let result_offset = args.nth::<u32>(0);
        let data_offset = args.nth::<u32>(1);
        let length = args.nth::<u32>(2);
        self.eei
            .call_data_copy(&mut self.memory()?, result_offset, data_offset, length)?;
        Ok(None)
    }

    /// The implementation of the EEI `getCallValue` function.
    fn eei_get_call_value(&mut self, args: RuntimeArgs) -> EeiCallResult {
        TypeCheck::check_args_number(&args, EeiAPIName::GET_CALL_VALUE)?;
        let result_offset = args.nth::<u32>(0);
        self.eei.get_call_value(&mut self.memory()?, result_offset)?;
        Ok(None)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests.
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eei::common::TransactionContext;

    fn signature(params: &[ValueType], ret: Option<ValueType>) -> Signature {
        Signature::new(params.to_vec(), ret)
    }

    #[test]
    fn host_function_signatures_are_exact() {
        assert!(TypeCheck::check_signature(
            EeiAPIName::USE_GAS,
            &signature(&[ValueType::I64], None),
        ));
        assert!(TypeCheck::check_signature(
            EeiAPIName::GET_GAS_LEFT,
            &signature(&[], Some(ValueType::I64)),
        ));
        assert!(TypeCheck::check_signature(
            EeiAPIName::STORAGE_STORE,
            &signature(&[ValueType::I32, ValueType::I32], None),
        ));
        assert!(TypeCheck::check_signature(
            EeiAPIName::GET_CALL_DATA_SIZE,
            &signature(&[], Some(ValueType::I32)),
        ));
        assert!(TypeCheck::check_signature(
            EeiAPIName::CALL_DATA_COPY,
            &signature(&[ValueType::I32, ValueType::I32, ValueType::I32], None),
        ));

        // Wrong parameter types, counts, and return types are all rejected.
        assert!(!TypeCheck::check_signature(
            EeiAPIName::USE_GAS,
            &signature(&[ValueType::I32], None),
        ));
        assert!(!TypeCheck::check_signature(
            EeiAPIName::STORAGE_STORE,
            &signature(&[ValueType::I32], None),
        ));
        assert!(!TypeCheck::check_signature(
            EeiAPIName::GET_GAS_LEFT,
            &signature(&[], Some(ValueType::I32)),
        ));
        assert!(!TypeCheck::check_signature(
            EeiAPIName::FINISH,
            &signature(&[ValueType::I32, ValueType::I32], Some(ValueType::I32)),
        ));
    }

    #[test]
    fn resolver_rejects_unknown_names_and_non_function_imports() {
        let mut context = TransactionContext::new(0, Vec::new(), 0);
        let state = WasmiRuntimeState::new(&mut context);

        assert!(state
            .resolve_func("getBlockHash", &signature(&[ValueType::I32], None))
            .is_err());
        assert!(state
            .resolve_func("useGas", &signature(&[ValueType::I32], None))
            .is_err());
        assert!(state
            .resolve_func("useGas", &signature(&[ValueType::I64], None))
            .is_ok());
    }
}
