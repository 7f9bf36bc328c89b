//! Capability initializers.
//!
//! Initializers only stage register writes for the processor being initialized. They succeed whenever the requested
//! state was staged or is unattainable by policy (a locked IA32_FEATURE_CONTROL), and fail only when the caller broke
//! the initialization contract.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use patina_register_table::{ProcessorIndex, RegisterClass, RegisterStager, bank_register};

use crate::{
    capability::{Capability, FeatureState},
    error::{ContractViolation, MachineCheckError},
    probe::CapabilityProbeContext,
    registers::{
        CR4, CR4_MCE, FEATURE_CONTROL_LMCE_ON, IA32_FEATURE_CONTROL, IA32_MC0_CTL, IA32_MC0_STATUS, IA32_MCG_CTL,
        MC_BANK_STRIDE,
    },
    snapshot::FeatureControlSnapshot,
};

/// Boot-wide inputs of an initializer.
#[derive(Debug, Clone, Copy)]
pub struct InitializeContext<'a> {
    /// The processor being initialized is the bootstrap processor.
    pub bootstrap: bool,
    /// This boot is a power-on reset.
    pub power_on_reset: bool,
    /// Captured before the first initializer runs. `None` only if the caller skipped the capture.
    pub feature_control: Option<&'a FeatureControlSnapshot>,
}

impl<'a> InitializeContext<'a> {
    /// The feature control snapshot, which must have been captured by now.
    pub fn feature_control_snapshot(&self) -> Result<&'a FeatureControlSnapshot, MachineCheckError> {
        self.feature_control.ok_or_else(|| {
            log::error!("The feature control snapshot must be captured before LMCE is initialized.");
            MachineCheckError::from(ContractViolation::MissingFeatureControlSnapshot)
        })
    }

    fn require_bootstrap(&self, capability: Capability, processor: ProcessorIndex) -> Result<(), MachineCheckError> {
        if capability.writer_scope().permits(self.bootstrap) {
            return Ok(());
        }
        log::error!(
            "{} initialization is restricted to the bootstrap processor but ran on processor {}.",
            capability.name(),
            processor
        );
        Err(ContractViolation::NotBootstrapProcessor { capability, processor }.into())
    }
}

/// Sets or clears CR4.MCE.
pub fn initialize_machine_check_exception(
    processor: ProcessorIndex,
    state: FeatureState,
    stager: &mut dyn RegisterStager,
) -> Result<(), MachineCheckError> {
    stager.stage_bit_field(processor, RegisterClass::ControlRegister, CR4, CR4_MCE, state.as_bit())?;
    Ok(())
}

/// Opens every error-reporting bank, and on a power-on reset clears the bank status left over from before the reset.
///
/// The bank count is taken from `context`, which must come from the processor being initialized. Disabling stages
/// nothing.
pub fn initialize_machine_check_architecture(
    processor: ProcessorIndex,
    context: &CapabilityProbeContext,
    init: &InitializeContext<'_>,
    state: FeatureState,
    stager: &mut dyn RegisterStager,
) -> Result<(), MachineCheckError> {
    init.require_bootstrap(Capability::MachineCheckArchitecture, processor)?;

    if !state.is_enabled() {
        return Ok(());
    }

    let banks = u32::from(context.bank_count());
    for bank in 0..banks {
        let index = bank_register(IA32_MC0_CTL, MC_BANK_STRIDE, bank)?;
        stager.stage_write(processor, RegisterClass::Msr, index, u64::MAX)?;
    }

    // Status logged before a warm reset or resume stays for the OS to collect.
    if init.power_on_reset {
        for bank in 0..banks {
            let index = bank_register(IA32_MC0_STATUS, MC_BANK_STRIDE, bank)?;
            stager.stage_write(processor, RegisterClass::Msr, index, 0)?;
        }
    }

    log::debug!(
        "Processor {}: staged {} MCA banks, status {}.",
        processor,
        banks,
        if init.power_on_reset { "cleared" } else { "preserved" }
    );
    Ok(())
}

/// Writes IA32_MCG_CTL: all ones when enabling, zero when disabling.
pub fn initialize_global_control(
    processor: ProcessorIndex,
    init: &InitializeContext<'_>,
    state: FeatureState,
    stager: &mut dyn RegisterStager,
) -> Result<(), MachineCheckError> {
    init.require_bootstrap(Capability::GlobalControl, processor)?;

    let value = if state.is_enabled() { u64::MAX } else { 0 };
    stager.stage_write(processor, RegisterClass::Msr, IA32_MCG_CTL, value)?;
    Ok(())
}

/// Sets or clears IA32_FEATURE_CONTROL.LMCE_ON, unless the register was locked when `snapshot` was captured.
pub fn initialize_local_machine_check(
    processor: ProcessorIndex,
    snapshot: &FeatureControlSnapshot,
    state: FeatureState,
    stager: &mut dyn RegisterStager,
) -> Result<(), MachineCheckError> {
    if snapshot.is_locked(processor)? {
        log::info!("Processor {}: IA32_FEATURE_CONTROL is locked, LMCE cannot be {:?}.", processor, state);
        return Ok(());
    }

    stager.stage_bit_field(
        processor,
        RegisterClass::Msr,
        IA32_FEATURE_CONTROL,
        FEATURE_CONTROL_LMCE_ON,
        state.as_bit(),
    )?;
    Ok(())
}
