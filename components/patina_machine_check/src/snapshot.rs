//! One-time snapshot of IA32_FEATURE_CONTROL across all processors.
//!
//! IA32_FEATURE_CONTROL is write-once. Other initialization code may set its lock bit while processors are being
//! brought up, so the lock state is captured for every processor before any feature is initialized and only ever read
//! from the snapshot afterwards. Reading the live register instead would make the outcome depend on the order in which
//! processors are initialized.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::boxed::Box;

use patina_register_table::ProcessorIndex;

use crate::{
    error::{ContractViolation, MachineCheckError},
    registers::FeatureControl,
};

/// IA32_FEATURE_CONTROL of every processor at capture time, indexed by [`ProcessorIndex`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureControlSnapshot {
    registers: Box<[FeatureControl]>,
}

impl FeatureControlSnapshot {
    /// Captures the register of processors `0..processor_count`, calling `reader` once per processor in order.
    pub fn capture<F>(processor_count: usize, mut reader: F) -> Self
    where
        F: FnMut(ProcessorIndex) -> FeatureControl,
    {
        let registers: Box<[FeatureControl]> =
            (0..processor_count).map(|index| reader(ProcessorIndex(index))).collect();
        log::debug!(
            "Captured IA32_FEATURE_CONTROL for {} processors, {} locked.",
            registers.len(),
            registers.iter().filter(|register| register.lock()).count()
        );
        Self { registers }
    }

    pub fn processor_count(&self) -> usize {
        self.registers.len()
    }

    pub fn get(&self, processor: ProcessorIndex) -> Option<FeatureControl> {
        self.registers.get(processor.as_usize()).copied()
    }

    /// Whether the register of `processor` was locked when the snapshot was taken.
    pub fn is_locked(&self, processor: ProcessorIndex) -> Result<bool, MachineCheckError> {
        match self.get(processor) {
            Some(register) => Ok(register.lock()),
            None => {
                log::error!(
                    "Processor {} is not part of the feature control snapshot ({} processors).",
                    processor,
                    self.registers.len()
                );
                Err(ContractViolation::ProcessorNotInSnapshot(processor).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_reads_each_processor_once() {
        let mut reads = alloc::vec::Vec::new();
        let snapshot = FeatureControlSnapshot::capture(3, |processor| {
            reads.push(processor);
            FeatureControl::new().with_lock(processor.0 == 1)
        });

        assert_eq!(alloc::vec![ProcessorIndex(0), ProcessorIndex(1), ProcessorIndex(2)], reads);
        assert_eq!(3, snapshot.processor_count());
        assert_eq!(Ok(false), snapshot.is_locked(ProcessorIndex(0)));
        assert_eq!(Ok(true), snapshot.is_locked(ProcessorIndex(1)));
        assert_eq!(Ok(false), snapshot.is_locked(ProcessorIndex(2)));
    }

    #[test]
    fn test_processor_outside_snapshot() {
        let snapshot = FeatureControlSnapshot::capture(1, |_| FeatureControl::new());
        assert_eq!(None, snapshot.get(ProcessorIndex(1)));
        assert_eq!(
            Err(MachineCheckError::ContractViolation(ContractViolation::ProcessorNotInSnapshot(ProcessorIndex(1)))),
            snapshot.is_locked(ProcessorIndex(1))
        );
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = FeatureControlSnapshot::capture(0, |_| unreachable!());
        assert_eq!(0, snapshot.processor_count());
        assert!(snapshot.is_locked(ProcessorIndex(0)).is_err());
    }
}
