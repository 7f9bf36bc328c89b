//! Deferred register tables for CPU feature initialization.
//!
//! CPU feature initializers never touch hardware directly. Instead they stage the register state they want into a
//! [`RegisterTable`] owned by the processor being initialized. The tables are handed to a committer later in boot,
//! which applies them on the processor they belong to.
//!
//! Two kinds of registers can be targeted, see [`RegisterClass`]. A modification either replaces the whole register
//! or a single [`BitField`] inside it. Registers replicated per bank are addressed through [`bank_register`].
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]

extern crate alloc;

pub mod commit;
pub mod register;
pub mod table;

pub use commit::RegisterAccess;
pub use register::{BitField, ProcessorIndex, RegisterClass, RegisterModification, RegisterValue, bank_register};
pub use table::{RegisterStager, RegisterTable, RegisterTableSet};

#[cfg(any(test, feature = "mockall"))]
pub use commit::MockRegisterAccess;
#[cfg(any(test, feature = "mockall"))]
pub use table::MockRegisterStager;

use r_efi::efi;

/// Errors raised while staging register writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterTableError {
    /// A modification tagged for one processor was staged into another processor's table.
    ProcessorMismatch { table: ProcessorIndex, requested: ProcessorIndex },
    /// The processor has no table in the set.
    UnknownProcessor(ProcessorIndex),
    /// The processor's table was already handed to a committer.
    AlreadyTaken(ProcessorIndex),
    /// `base + bank * stride` does not fit a register index.
    IndexOverflow { base: u32, stride: u32, bank: u32 },
}

impl From<RegisterTableError> for efi::Status {
    fn from(value: RegisterTableError) -> Self {
        match value {
            RegisterTableError::ProcessorMismatch { .. } | RegisterTableError::IndexOverflow { .. } => {
                efi::Status::INVALID_PARAMETER
            }
            RegisterTableError::UnknownProcessor(_) => efi::Status::NOT_FOUND,
            RegisterTableError::AlreadyTaken(_) => efi::Status::ALREADY_STARTED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_to_status() {
        let mismatch = RegisterTableError::ProcessorMismatch { table: ProcessorIndex(0), requested: ProcessorIndex(1) };
        assert_eq!(efi::Status::INVALID_PARAMETER, efi::Status::from(mismatch));
        assert_eq!(efi::Status::NOT_FOUND, efi::Status::from(RegisterTableError::UnknownProcessor(ProcessorIndex(4))));
        let taken = RegisterTableError::AlreadyTaken(ProcessorIndex(0));
        assert_eq!(efi::Status::ALREADY_STARTED, efi::Status::from(taken));
        assert_eq!(
            efi::Status::INVALID_PARAMETER,
            efi::Status::from(RegisterTableError::IndexOverflow { base: u32::MAX, stride: 4, bank: 1 })
        );
    }
}
