//! Committing a register table to hardware.
//!
//! The register primitives themselves are provided by the platform through [`RegisterAccess`]. Committing has to
//! happen on the processor that owns the table.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use crate::{
    register::{RegisterClass, RegisterValue},
    table::RegisterTable,
};

/// Raw register access on the executing processor.
#[cfg_attr(any(test, feature = "mockall"), mockall::automock)]
pub trait RegisterAccess {
    fn read(&mut self, class: RegisterClass, index: u32) -> u64;
    fn write(&mut self, class: RegisterClass, index: u32, value: u64);
}

impl RegisterTable {
    /// Applies every staged write in staging order and returns how many writes were performed.
    ///
    /// Whole-register writes are written as is. Field writes read the register, replace the field and write the result
    /// back. The table is consumed, so a table can only be committed once.
    pub fn commit(self, access: &mut dyn RegisterAccess) -> usize {
        let processor = self.processor();
        let entries = self.into_entries();
        let count = entries.len();

        for entry in entries {
            let value = match entry.value {
                RegisterValue::Whole(value) => value,
                RegisterValue::Field { .. } => entry.apply(access.read(entry.class, entry.index)),
            };
            log::trace!("Processor {}: {:?} {:#x} = {:#x}", processor, entry.class, entry.index, value);
            access.write(entry.class, entry.index, value);
        }

        log::debug!("Committed {} register writes for processor {}.", count, processor);
        count
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use mockall::{Sequence, predicate::eq};

    use super::*;
    use crate::{
        register::{BitField, ProcessorIndex},
        table::RegisterStager,
    };

    #[derive(Default)]
    struct RegisterFile {
        registers: BTreeMap<(u8, u32), u64>,
        writes: usize,
    }

    fn key(class: RegisterClass, index: u32) -> (u8, u32) {
        (matches!(class, RegisterClass::Msr) as u8, index)
    }

    impl RegisterAccess for RegisterFile {
        fn read(&mut self, class: RegisterClass, index: u32) -> u64 {
            self.registers.get(&key(class, index)).copied().unwrap_or_default()
        }

        fn write(&mut self, class: RegisterClass, index: u32, value: u64) {
            self.writes += 1;
            self.registers.insert(key(class, index), value);
        }
    }

    #[test]
    fn test_commit_whole_write_does_not_read() {
        let mut table = RegisterTable::new(ProcessorIndex(0));
        table.stage_write(ProcessorIndex(0), RegisterClass::Msr, 0x17B, u64::MAX).unwrap();

        let mut access = MockRegisterAccess::new();
        access.expect_read().never();
        access.expect_write().with(eq(RegisterClass::Msr), eq(0x17B), eq(u64::MAX)).once().return_const(());

        assert_eq!(1, table.commit(&mut access));
    }

    #[test]
    fn test_commit_field_write_is_read_modify_write() {
        let mut table = RegisterTable::new(ProcessorIndex(0));
        table.stage_bit_field(ProcessorIndex(0), RegisterClass::ControlRegister, 4, BitField::bit(6), 1).unwrap();

        let mut sequence = Sequence::new();
        let mut access = MockRegisterAccess::new();
        access
            .expect_read()
            .with(eq(RegisterClass::ControlRegister), eq(4))
            .once()
            .in_sequence(&mut sequence)
            .return_const(0x20_u64);
        access
            .expect_write()
            .with(eq(RegisterClass::ControlRegister), eq(4), eq(0x60))
            .once()
            .in_sequence(&mut sequence)
            .return_const(());

        assert_eq!(1, table.commit(&mut access));
    }

    #[test]
    fn test_commit_matches_resolve() {
        let mut table = RegisterTable::new(ProcessorIndex(3));
        table.stage_write(ProcessorIndex(3), RegisterClass::Msr, 0x400, u64::MAX).unwrap();
        table.stage_write(ProcessorIndex(3), RegisterClass::Msr, 0x401, 0).unwrap();
        table.stage_bit_field(ProcessorIndex(3), RegisterClass::Msr, 0x3A, BitField::bit(20), 1).unwrap();

        let mut file = RegisterFile::default();
        file.registers.insert(key(RegisterClass::Msr, 0x401), 0xDEAD);
        file.registers.insert(key(RegisterClass::Msr, 0x3A), 0x4);

        let expected_feature_control = table.resolve(RegisterClass::Msr, 0x3A, 0x4);
        assert_eq!(3, table.commit(&mut file));

        assert_eq!(3, file.writes);
        assert_eq!(u64::MAX, file.read(RegisterClass::Msr, 0x400));
        assert_eq!(0, file.read(RegisterClass::Msr, 0x401));
        assert_eq!(0x0010_0004, file.read(RegisterClass::Msr, 0x3A));
        assert_eq!(expected_feature_control, file.read(RegisterClass::Msr, 0x3A));
    }

    #[test]
    fn test_commit_empty_table() {
        let mut access = MockRegisterAccess::new();
        access.expect_read().never();
        access.expect_write().never();
        assert_eq!(0, RegisterTable::new(ProcessorIndex(0)).commit(&mut access));
    }
}
