//! Register identities and the modifications staged against them.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use crate::RegisterTableError;

/// Index of a logical processor, as assigned by the processor enumerator.
///
/// The index is only ever used as a lookup key. It is stable for the whole boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessorIndex(pub usize);

impl ProcessorIndex {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl From<usize> for ProcessorIndex {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for ProcessorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The register file a modification targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterClass {
    /// CRn. The register index selects `n`.
    ControlRegister,
    /// Model specific register. The register index is the MSR address.
    Msr,
}

/// A contiguous run of bits inside a 64-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitField {
    offset: u8,
    width: u8,
}

impl BitField {
    /// Creates a field of `width` bits starting at bit `offset`.
    ///
    /// ## Panics
    ///
    /// Panics if the field is empty or does not fit in 64 bits. Fields are expected to be constants, in which case the
    /// check happens at compile time.
    pub const fn new(offset: u8, width: u8) -> Self {
        assert!(width > 0 && offset as u32 + width as u32 <= 64, "bit field does not fit in a 64-bit register");
        Self { offset, width }
    }

    /// A single-bit field.
    pub const fn bit(offset: u8) -> Self {
        Self::new(offset, 1)
    }

    pub const fn offset(&self) -> u8 {
        self.offset
    }

    pub const fn width(&self) -> u8 {
        self.width
    }

    /// Mask of the field in register position.
    pub const fn mask(&self) -> u64 {
        let low = if self.width == 64 { u64::MAX } else { (1u64 << self.width) - 1 };
        low << self.offset
    }

    /// Returns `current` with the field replaced by `value`.
    ///
    /// Bits of `value` that do not fit in the field are dropped.
    pub const fn insert(&self, current: u64, value: u64) -> u64 {
        (current & !self.mask()) | ((value << self.offset) & self.mask())
    }

    /// Reads the field out of `register`.
    pub const fn extract(&self, register: u64) -> u64 {
        (register & self.mask()) >> self.offset
    }
}

/// What a modification writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterValue {
    /// Replaces the whole register.
    Whole(u64),
    /// Replaces one field and preserves every other bit.
    Field { field: BitField, value: u64 },
}

impl RegisterValue {
    /// The register contents after applying this value on top of `current`.
    pub const fn apply(&self, current: u64) -> u64 {
        match self {
            RegisterValue::Whole(value) => *value,
            RegisterValue::Field { field, value } => field.insert(current, *value),
        }
    }
}

/// A register write staged for one processor.
///
/// Modifications are created by feature initializers and are never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterModification {
    pub processor: ProcessorIndex,
    pub class: RegisterClass,
    pub index: u32,
    pub value: RegisterValue,
}

impl RegisterModification {
    pub const fn write(processor: ProcessorIndex, class: RegisterClass, index: u32, value: u64) -> Self {
        Self { processor, class, index, value: RegisterValue::Whole(value) }
    }

    pub const fn write_field(
        processor: ProcessorIndex,
        class: RegisterClass,
        index: u32,
        field: BitField,
        value: u64,
    ) -> Self {
        Self { processor, class, index, value: RegisterValue::Field { field, value } }
    }

    /// Returns true if this modification writes register `index` of `class`.
    pub fn targets(&self, class: RegisterClass, index: u32) -> bool {
        self.class == class && self.index == index
    }

    /// The register contents after committing this modification on top of `current`.
    pub const fn apply(&self, current: u64) -> u64 {
        self.value.apply(current)
    }
}

/// Index of the instance of a bank-replicated register belonging to `bank`, i.e. `base + bank * stride`.
pub fn bank_register(base: u32, stride: u32, bank: u32) -> Result<u32, RegisterTableError> {
    bank.checked_mul(stride)
        .and_then(|offset| base.checked_add(offset))
        .ok_or(RegisterTableError::IndexOverflow { base, stride, bank })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_field_mask() {
        assert_eq!(0x40, BitField::bit(6).mask());
        assert_eq!(0xFF, BitField::new(0, 8).mask());
        assert_eq!(0x00FF_0000, BitField::new(16, 8).mask());
        assert_eq!(u64::MAX, BitField::new(0, 64).mask());
        assert_eq!(1 << 63, BitField::bit(63).mask());
    }

    #[test]
    fn test_bit_field_insert_preserves_other_bits() {
        let field = BitField::bit(20);
        assert_eq!(0x0010_0005, field.insert(0x5, 1));
        assert_eq!(0x5, field.insert(0x0010_0005, 0));

        let wide = BitField::new(4, 4);
        assert_eq!(0xFFFF_FF5F, wide.insert(0xFFFF_FFFF, 0x5));
        // Only the low four bits of the value land in the field.
        assert_eq!(0xF0, wide.insert(0, 0x1F));
        assert_eq!(0xF, wide.extract(0xF0));
    }

    #[test]
    #[should_panic]
    fn test_bit_field_out_of_range() {
        let _ = BitField::new(60, 8);
    }

    #[test]
    fn test_register_value_apply() {
        assert_eq!(0, RegisterValue::Whole(0).apply(u64::MAX));
        assert_eq!(u64::MAX, RegisterValue::Whole(u64::MAX).apply(0x1234));
        assert_eq!(0x1274, RegisterValue::Field { field: BitField::bit(6), value: 1 }.apply(0x1234));
    }

    #[test]
    fn test_modification_targets() {
        let modification = RegisterModification::write(ProcessorIndex(2), RegisterClass::Msr, 0x17B, u64::MAX);
        assert!(modification.targets(RegisterClass::Msr, 0x17B));
        assert!(!modification.targets(RegisterClass::ControlRegister, 0x17B));
        assert!(!modification.targets(RegisterClass::Msr, 0x17A));
    }

    #[test]
    fn test_bank_register() {
        assert_eq!(Ok(0x400), bank_register(0x400, 4, 0));
        assert_eq!(Ok(0x401), bank_register(0x401, 4, 0));
        assert_eq!(Ok(0x40C), bank_register(0x400, 4, 3));
        assert_eq!(Ok(0x7FD), bank_register(0x401, 4, 255));
        assert_eq!(
            Err(RegisterTableError::IndexOverflow { base: 0x400, stride: 4, bank: u32::MAX }),
            bank_register(0x400, 4, u32::MAX)
        );
        assert_eq!(
            Err(RegisterTableError::IndexOverflow { base: u32::MAX, stride: 4, bank: 1 }),
            bank_register(u32::MAX, 4, 1)
        );
    }

    #[test]
    fn test_bank_registers_are_distinct() {
        let mut indices: alloc::vec::Vec<u32> = (0..32).map(|bank| bank_register(0x400, 4, bank).unwrap()).collect();
        indices.dedup();
        assert_eq!(32, indices.len());
    }
}
