//! Registration of the machine check capabilities with the CPU feature framework.
//!
//! Each capability is exposed as a support predicate and an initializer with uniform signatures, keyed by the
//! capability name and registered parents first.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use patina_register_table::{ProcessorIndex, RegisterStager};
use r_efi::efi;

use crate::{
    capability::{Capability, FeatureState, WriterScope},
    error::MachineCheckError,
    initialize::{
        InitializeContext, initialize_global_control, initialize_local_machine_check,
        initialize_machine_check_architecture, initialize_machine_check_exception,
    },
    probe::CapabilityProbeContext,
};

pub type SupportFn = fn(ProcessorIndex, &CapabilityProbeContext) -> bool;

pub type InitializeFn = fn(
    ProcessorIndex,
    &CapabilityProbeContext,
    &InitializeContext<'_>,
    FeatureState,
    &mut dyn RegisterStager,
) -> Result<(), MachineCheckError>;

/// A capability as seen by the CPU feature framework.
#[derive(Clone, Copy)]
pub struct FeatureRegistration {
    pub capability: Capability,
    pub name: &'static str,
    pub parent: Option<Capability>,
    pub scope: WriterScope,
    pub support: SupportFn,
    pub initialize: InitializeFn,
}

impl fmt::Debug for FeatureRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureRegistration")
            .field("name", &self.name)
            .field("parent", &self.parent.map(Capability::name))
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl FeatureRegistration {
    const fn new(capability: Capability, support: SupportFn, initialize: InitializeFn) -> Self {
        Self {
            capability,
            name: capability.name(),
            parent: capability.parent(),
            scope: capability.writer_scope(),
            support,
            initialize,
        }
    }
}

/// The machine check capabilities in registration order, indexed by `Capability as usize`.
pub static MACHINE_CHECK_FEATURES: [FeatureRegistration; 4] = [
    FeatureRegistration::new(Capability::MachineCheckException, mce_support, mce_initialize),
    FeatureRegistration::new(Capability::MachineCheckArchitecture, mca_support, mca_initialize),
    FeatureRegistration::new(Capability::GlobalControl, mcg_ctl_support, mcg_ctl_initialize),
    FeatureRegistration::new(Capability::LocalMachineCheck, lmce_support, lmce_initialize),
];

impl Capability {
    pub fn registration(self) -> &'static FeatureRegistration {
        &MACHINE_CHECK_FEATURES[self as usize]
    }
}

/// The CPU feature framework's registration interface.
#[cfg_attr(any(test, feature = "mockall"), mockall::automock)]
pub trait FeatureRegistry {
    fn register_feature(&mut self, registration: &'static FeatureRegistration) -> Result<(), efi::Status>;
}

/// Registers every machine check capability, parents first. Stops at the first refused registration.
pub fn register_machine_check_features(registry: &mut dyn FeatureRegistry) -> Result<(), MachineCheckError> {
    for registration in MACHINE_CHECK_FEATURES.iter() {
        registry.register_feature(registration).map_err(|status| {
            log::error!("Failed to register CPU feature {}: {:?}", registration.name, status);
            MachineCheckError::RegistrationFailed { capability: registration.capability, status }
        })?;
        log::debug!("Registered CPU feature {}.", registration.name);
    }
    Ok(())
}

fn mce_support(processor: ProcessorIndex, context: &CapabilityProbeContext) -> bool {
    Capability::MachineCheckException.is_supported(processor, context)
}

fn mca_support(processor: ProcessorIndex, context: &CapabilityProbeContext) -> bool {
    Capability::MachineCheckArchitecture.is_supported(processor, context)
}

fn mcg_ctl_support(processor: ProcessorIndex, context: &CapabilityProbeContext) -> bool {
    Capability::GlobalControl.is_supported(processor, context)
}

fn lmce_support(processor: ProcessorIndex, context: &CapabilityProbeContext) -> bool {
    Capability::LocalMachineCheck.is_supported(processor, context)
}

fn mce_initialize(
    processor: ProcessorIndex,
    _context: &CapabilityProbeContext,
    _init: &InitializeContext<'_>,
    state: FeatureState,
    stager: &mut dyn RegisterStager,
) -> Result<(), MachineCheckError> {
    initialize_machine_check_exception(processor, state, stager)
}

fn mca_initialize(
    processor: ProcessorIndex,
    context: &CapabilityProbeContext,
    init: &InitializeContext<'_>,
    state: FeatureState,
    stager: &mut dyn RegisterStager,
) -> Result<(), MachineCheckError> {
    initialize_machine_check_architecture(processor, context, init, state, stager)
}

fn mcg_ctl_initialize(
    processor: ProcessorIndex,
    _context: &CapabilityProbeContext,
    init: &InitializeContext<'_>,
    state: FeatureState,
    stager: &mut dyn RegisterStager,
) -> Result<(), MachineCheckError> {
    initialize_global_control(processor, init, state, stager)
}

fn lmce_initialize(
    processor: ProcessorIndex,
    _context: &CapabilityProbeContext,
    init: &InitializeContext<'_>,
    state: FeatureState,
    stager: &mut dyn RegisterStager,
) -> Result<(), MachineCheckError> {
    initialize_local_machine_check(processor, init.feature_control_snapshot()?, state, stager)
}

#[cfg(test)]
mod tests {
    use mockall::Sequence;
    use patina_register_table::{MockRegisterStager, RegisterTable};

    use super::*;
    use crate::{
        error::ContractViolation,
        registers::{CpuIdVersionInfoEdx, McgCap},
    };

    #[test]
    fn test_table_matches_capabilities() {
        for (index, registration) in MACHINE_CHECK_FEATURES.iter().enumerate() {
            assert_eq!(Capability::ALL[index], registration.capability);
            assert_eq!(registration.capability.name(), registration.name);
            assert!(core::ptr::eq(registration, registration.capability.registration()));
        }
        assert_eq!(None, MACHINE_CHECK_FEATURES[0].parent);
        assert_eq!(Some(Capability::MachineCheckException), MACHINE_CHECK_FEATURES[1].parent);
        assert_eq!(Some(Capability::MachineCheckArchitecture), MACHINE_CHECK_FEATURES[2].parent);
        assert_eq!(Some(Capability::MachineCheckArchitecture), MACHINE_CHECK_FEATURES[3].parent);
        assert_eq!(WriterScope::BootstrapOnly, MACHINE_CHECK_FEATURES[1].scope);
        assert_eq!(WriterScope::BootstrapOnly, MACHINE_CHECK_FEATURES[2].scope);
    }

    #[test]
    fn test_support_functions_follow_chain() {
        let context = CapabilityProbeContext::new(
            CpuIdVersionInfoEdx::new().with_mce(true).with_mca(true),
            McgCap::new().with_mcg_ctl_p(true),
        );
        let supported = MACHINE_CHECK_FEATURES.each_ref().map(|r| (r.support)(ProcessorIndex(0), &context));
        assert_eq!([true, true, true, false], supported);
    }

    #[test]
    fn test_register_in_dependency_order() {
        let mut sequence = Sequence::new();
        let mut registry = MockFeatureRegistry::new();
        for capability in Capability::ALL {
            registry
                .expect_register_feature()
                .withf(move |registration| registration.capability == capability)
                .once()
                .in_sequence(&mut sequence)
                .returning(|_| Ok(()));
        }

        assert_eq!(Ok(()), register_machine_check_features(&mut registry));
    }

    #[test]
    fn test_register_stops_at_first_failure() {
        let mut registry = MockFeatureRegistry::new();
        registry
            .expect_register_feature()
            .withf(|registration| registration.capability == Capability::MachineCheckException)
            .once()
            .returning(|_| Ok(()));
        registry
            .expect_register_feature()
            .withf(|registration| registration.capability == Capability::MachineCheckArchitecture)
            .once()
            .returning(|_| Err(efi::Status::OUT_OF_RESOURCES));

        assert_eq!(
            Err(MachineCheckError::RegistrationFailed {
                capability: Capability::MachineCheckArchitecture,
                status: efi::Status::OUT_OF_RESOURCES,
            }),
            register_machine_check_features(&mut registry)
        );
    }

    #[test]
    fn test_lmce_initializer_requires_snapshot() {
        let mut stager = MockRegisterStager::new();
        stager.expect_stage_bit_field().never();

        let init = InitializeContext { bootstrap: true, power_on_reset: false, feature_control: None };
        let initialize = Capability::LocalMachineCheck.registration().initialize;
        assert_eq!(
            Err(MachineCheckError::ContractViolation(ContractViolation::MissingFeatureControlSnapshot)),
            initialize(ProcessorIndex(0), &CapabilityProbeContext::default(), &init, FeatureState::Enabled, &mut stager)
        );
    }

    #[test]
    fn test_mce_initializer_through_table() {
        let init = InitializeContext { bootstrap: false, power_on_reset: false, feature_control: None };
        let mut table = RegisterTable::new(ProcessorIndex(2));
        let initialize = Capability::MachineCheckException.registration().initialize;
        initialize(ProcessorIndex(2), &CapabilityProbeContext::default(), &init, FeatureState::Disabled, &mut table)
            .unwrap();
        assert_eq!(1, table.len());
    }
}
