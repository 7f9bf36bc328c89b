//! Machine check initialization errors.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use patina_register_table::{ProcessorIndex, RegisterTableError};
use r_efi::efi;

use crate::capability::Capability;

/// The caller broke the initialization ordering or scheduling contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractViolation {
    /// LMCE was initialized before the feature control snapshot was captured.
    MissingFeatureControlSnapshot,
    /// The feature control snapshot can only be captured once per boot.
    SnapshotAlreadyCaptured,
    ProcessorNotInSnapshot(ProcessorIndex),
    /// A bootstrap-only initializer ran on an application processor.
    NotBootstrapProcessor { capability: Capability, processor: ProcessorIndex },
    /// The bootstrap processor was not part of the enumerated processors.
    BootstrapNotEnumerated(ProcessorIndex),
    /// A processor was enumerated more than once.
    DuplicateProcessor(ProcessorIndex),
}

/// Errors returned by machine check registration and initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineCheckError {
    ContractViolation(ContractViolation),
    RegisterTable(RegisterTableError),
    /// The framework refused a feature registration.
    RegistrationFailed { capability: Capability, status: efi::Status },
}

impl From<ContractViolation> for MachineCheckError {
    fn from(value: ContractViolation) -> Self {
        MachineCheckError::ContractViolation(value)
    }
}

impl From<RegisterTableError> for MachineCheckError {
    fn from(value: RegisterTableError) -> Self {
        MachineCheckError::RegisterTable(value)
    }
}

impl From<MachineCheckError> for efi::Status {
    fn from(value: MachineCheckError) -> Self {
        match value {
            MachineCheckError::ContractViolation(ContractViolation::MissingFeatureControlSnapshot) => {
                efi::Status::NOT_READY
            }
            MachineCheckError::ContractViolation(ContractViolation::SnapshotAlreadyCaptured) => {
                efi::Status::ALREADY_STARTED
            }
            MachineCheckError::ContractViolation(ContractViolation::BootstrapNotEnumerated(_)) => {
                efi::Status::NOT_FOUND
            }
            MachineCheckError::ContractViolation(_) => efi::Status::INVALID_PARAMETER,
            MachineCheckError::RegisterTable(error) => error.into(),
            MachineCheckError::RegistrationFailed { status, .. } => status,
        }
    }
}
