//! Per-boot sequencing of the machine check capabilities.
//!
//! [`MachineCheckFeatures`] owns the boot-wide state: the platform configuration and the IA32_FEATURE_CONTROL
//! snapshot. The CPU feature framework drives it one processor at a time, bootstrap processor first.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::vec::Vec;

use patina_register_table::{ProcessorIndex, RegisterStager, RegisterTable, RegisterTableSet};
use spin::Once;

use crate::{
    capability::{Capability, FeatureState},
    config::MachineCheckConfig,
    error::{ContractViolation, MachineCheckError},
    initialize::InitializeContext,
    probe::{CapabilityProbe, CapabilityProbeContext},
    registers::FeatureControl,
    registration::MACHINE_CHECK_FEATURES,
    snapshot::FeatureControlSnapshot,
};

/// What happened to one capability on one processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityOutcome {
    /// The processor does not support the capability or one of its parents.
    Unsupported,
    /// The initializer staged the given state.
    Initialized(FeatureState),
    /// Supported, but the initializer only runs on the bootstrap processor.
    SkippedApplicationProcessor,
}

/// Per-capability outcomes of one processor's pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorReport {
    pub processor: ProcessorIndex,
    /// Indexed by `Capability as usize`.
    pub outcomes: [CapabilityOutcome; 4],
}

impl ProcessorReport {
    pub fn outcome(&self, capability: Capability) -> CapabilityOutcome {
        self.outcomes[capability as usize]
    }
}

/// Drives the machine check capabilities through one boot.
pub struct MachineCheckFeatures {
    config: MachineCheckConfig,
    feature_control: Once<FeatureControlSnapshot>,
}

impl MachineCheckFeatures {
    pub const fn new(config: MachineCheckConfig) -> Self {
        Self { config, feature_control: Once::new() }
    }

    pub fn config(&self) -> &MachineCheckConfig {
        &self.config
    }

    /// Captures IA32_FEATURE_CONTROL of processors `0..processor_count`. Must run once, before any processor is
    /// initialized.
    pub fn capture_feature_control_snapshot<F>(
        &self,
        processor_count: usize,
        reader: F,
    ) -> Result<&FeatureControlSnapshot, MachineCheckError>
    where
        F: FnMut(ProcessorIndex) -> FeatureControl,
    {
        let mut captured = false;
        let snapshot = self.feature_control.call_once(|| {
            captured = true;
            FeatureControlSnapshot::capture(processor_count, reader)
        });

        if !captured {
            log::error!("The feature control snapshot was already captured this boot.");
            return Err(ContractViolation::SnapshotAlreadyCaptured.into());
        }
        Ok(snapshot)
    }

    pub fn feature_control_snapshot(&self) -> Option<&FeatureControlSnapshot> {
        self.feature_control.get()
    }

    pub fn desired_state(&self, capability: Capability) -> FeatureState {
        self.config.state_of(capability)
    }

    pub fn is_supported(
        &self,
        capability: Capability,
        processor: ProcessorIndex,
        context: &CapabilityProbeContext,
    ) -> bool {
        (capability.registration().support)(processor, context)
    }

    /// Runs the initializer of `capability` for `processor` with the configured state.
    ///
    /// The caller is responsible for only calling this for supported capabilities, and for honoring the writer scope.
    pub fn initialize(
        &self,
        capability: Capability,
        processor: ProcessorIndex,
        bootstrap: bool,
        context: &CapabilityProbeContext,
        stager: &mut dyn RegisterStager,
    ) -> Result<FeatureState, MachineCheckError> {
        let state = self.desired_state(capability);
        let init = InitializeContext {
            bootstrap,
            power_on_reset: self.config.power_on_reset,
            feature_control: self.feature_control.get(),
        };
        (capability.registration().initialize)(processor, context, &init, state, stager)?;
        Ok(state)
    }

    /// Resolves and initializes every capability of `processor`, parents first.
    ///
    /// The probe is read again before every support check and every initializer, and always on `processor`. Writes
    /// reach `stager` only once every capability succeeded; a failed pass stages nothing.
    pub fn initialize_processor(
        &self,
        processor: ProcessorIndex,
        bootstrap: bool,
        probe: &dyn CapabilityProbe,
        stager: &mut dyn RegisterStager,
    ) -> Result<ProcessorReport, MachineCheckError> {
        let mut outcomes = [CapabilityOutcome::Unsupported; 4];
        let mut pass = RegisterTable::new(processor);

        for registration in MACHINE_CHECK_FEATURES.iter() {
            let capability = registration.capability;
            if !(registration.support)(processor, &probe.probe(processor)) {
                continue;
            }

            if !registration.scope.permits(bootstrap) {
                log::debug!("Processor {}: {} is left to the bootstrap processor.", processor, registration.name);
                outcomes[capability as usize] = CapabilityOutcome::SkippedApplicationProcessor;
                continue;
            }

            let state = self
                .initialize(capability, processor, bootstrap, &probe.probe(processor), &mut pass)
                .inspect_err(|err| {
                    log::error!("Processor {}: failed to initialize {}: {:?}", processor, registration.name, err)
                })?;
            outcomes[capability as usize] = CapabilityOutcome::Initialized(state);
        }

        pass.stage_into(stager)?;
        log::info!("Processor {}: machine check outcomes {:?}", processor, outcomes);
        Ok(ProcessorReport { processor, outcomes })
    }

    /// Initializes every processor in `processors` into its table in `tables`, `bootstrap` first.
    ///
    /// Each processor may only be listed once.
    pub fn initialize_all(
        &self,
        processors: &[ProcessorIndex],
        bootstrap: ProcessorIndex,
        probe: &dyn CapabilityProbe,
        tables: &mut RegisterTableSet,
    ) -> Result<Vec<ProcessorReport>, MachineCheckError> {
        if !processors.contains(&bootstrap) {
            log::error!("Bootstrap processor {} is not among the {} processors.", bootstrap, processors.len());
            return Err(ContractViolation::BootstrapNotEnumerated(bootstrap).into());
        }

        if let Some(duplicate) =
            processors.iter().enumerate().find_map(|(i, p)| processors[..i].contains(p).then_some(*p))
        {
            log::error!("Processor {} is listed more than once.", duplicate);
            return Err(ContractViolation::DuplicateProcessor(duplicate).into());
        }

        let order = core::iter::once(bootstrap).chain(processors.iter().copied().filter(|p| *p != bootstrap));
        let mut reports = Vec::with_capacity(processors.len());
        for processor in order {
            let table = tables.table_mut(processor)?;
            reports.push(self.initialize_processor(processor, processor == bootstrap, probe, table)?);
        }
        Ok(reports)
    }
}

impl Default for MachineCheckFeatures {
    fn default() -> Self {
        Self::new(MachineCheckConfig::default())
    }
}
