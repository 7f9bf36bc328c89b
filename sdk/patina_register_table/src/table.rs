//! Append-only per-processor register tables.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::vec::Vec;

use crate::{
    RegisterTableError,
    register::{BitField, ProcessorIndex, RegisterClass, RegisterModification, RegisterValue},
};

/// Sink for staged register writes.
///
/// Staging only records the desired state. Nothing is written to hardware until the owning table is committed.
#[cfg_attr(any(test, feature = "mockall"), mockall::automock)]
pub trait RegisterStager {
    /// Stages a full-width write of `value` to register `index` of `class` on `processor`.
    fn stage_write(
        &mut self,
        processor: ProcessorIndex,
        class: RegisterClass,
        index: u32,
        value: u64,
    ) -> Result<(), RegisterTableError>;

    /// Stages a write of `value` into `field` of register `index` of `class` on `processor`.
    fn stage_bit_field(
        &mut self,
        processor: ProcessorIndex,
        class: RegisterClass,
        index: u32,
        field: BitField,
        value: u64,
    ) -> Result<(), RegisterTableError>;
}

/// The staged register writes of one processor, in staging order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterTable {
    processor: ProcessorIndex,
    entries: Vec<RegisterModification>,
}

impl RegisterTable {
    pub fn new(processor: ProcessorIndex) -> Self {
        Self { processor, entries: Vec::new() }
    }

    pub fn processor(&self) -> ProcessorIndex {
        self.processor
    }

    pub fn entries(&self) -> &[RegisterModification] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Staged writes to register `index` of `class`, oldest first.
    pub fn entries_for(&self, class: RegisterClass, index: u32) -> impl Iterator<Item = &RegisterModification> {
        self.entries.iter().filter(move |entry| entry.targets(class, index))
    }

    /// The value register `index` of `class` would hold once the table is committed on top of `initial`.
    pub fn resolve(&self, class: RegisterClass, index: u32, initial: u64) -> u64 {
        self.entries_for(class, index).fold(initial, |current, entry| entry.apply(current))
    }

    /// Re-stages every entry, in order, into `stager`. Consumes the table.
    ///
    /// Lets a caller stage a pass into a scratch table and only forward it once the whole pass succeeded.
    pub fn stage_into(self, stager: &mut dyn RegisterStager) -> Result<(), RegisterTableError> {
        for entry in self.entries {
            match entry.value {
                RegisterValue::Whole(value) => stager.stage_write(entry.processor, entry.class, entry.index, value)?,
                RegisterValue::Field { field, value } => {
                    stager.stage_bit_field(entry.processor, entry.class, entry.index, field, value)?
                }
            }
        }
        Ok(())
    }

    pub(crate) fn into_entries(self) -> Vec<RegisterModification> {
        self.entries
    }

    fn push(&mut self, modification: RegisterModification) -> Result<(), RegisterTableError> {
        if modification.processor != self.processor {
            log::error!(
                "Register write for processor {} staged into the table of processor {}.",
                modification.processor,
                self.processor
            );
            return Err(RegisterTableError::ProcessorMismatch {
                table: self.processor,
                requested: modification.processor,
            });
        }
        log::trace!(
            "Processor {}: staged {:?} {:#x} <- {:x?}",
            modification.processor,
            modification.class,
            modification.index,
            modification.value
        );
        self.entries.push(modification);
        Ok(())
    }
}

impl RegisterStager for RegisterTable {
    fn stage_write(
        &mut self,
        processor: ProcessorIndex,
        class: RegisterClass,
        index: u32,
        value: u64,
    ) -> Result<(), RegisterTableError> {
        self.push(RegisterModification::write(processor, class, index, value))
    }

    fn stage_bit_field(
        &mut self,
        processor: ProcessorIndex,
        class: RegisterClass,
        index: u32,
        field: BitField,
        value: u64,
    ) -> Result<(), RegisterTableError> {
        self.push(RegisterModification::write_field(processor, class, index, field, value))
    }
}

/// One register table per processor `0..count`.
///
/// Tables are handed out by `&mut` so processors can stage concurrently without sharing anything, and each table can
/// be taken exactly once for commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterTableSet {
    tables: Vec<Option<RegisterTable>>,
}

impl RegisterTableSet {
    pub fn new(processor_count: usize) -> Self {
        Self { tables: (0..processor_count).map(|index| Some(RegisterTable::new(ProcessorIndex(index)))).collect() }
    }

    /// Number of processors the set was created for, including processors whose table was already taken.
    pub fn processor_count(&self) -> usize {
        self.tables.len()
    }

    /// The table of `processor`, unless it does not exist or was already taken.
    pub fn table(&self, processor: ProcessorIndex) -> Option<&RegisterTable> {
        self.tables.get(processor.as_usize()).and_then(Option::as_ref)
    }

    pub fn table_mut(&mut self, processor: ProcessorIndex) -> Result<&mut RegisterTable, RegisterTableError> {
        match self.tables.get_mut(processor.as_usize()) {
            Some(Some(table)) => Ok(table),
            Some(None) => Err(RegisterTableError::AlreadyTaken(processor)),
            None => Err(RegisterTableError::UnknownProcessor(processor)),
        }
    }

    /// Every table still held by the set, in processor order.
    pub fn tables_mut(&mut self) -> impl Iterator<Item = &mut RegisterTable> {
        self.tables.iter_mut().flatten()
    }

    /// Removes the table of `processor` so it can be committed.
    pub fn take(&mut self, processor: ProcessorIndex) -> Result<RegisterTable, RegisterTableError> {
        match self.tables.get_mut(processor.as_usize()) {
            Some(slot) => slot.take().ok_or(RegisterTableError::AlreadyTaken(processor)),
            None => Err(RegisterTableError::UnknownProcessor(processor)),
        }
    }

    /// Total number of staged writes across the tables still held by the set.
    pub fn staged_count(&self) -> usize {
        self.tables.iter().flatten().map(RegisterTable::len).sum()
    }
}

impl RegisterStager for RegisterTableSet {
    fn stage_write(
        &mut self,
        processor: ProcessorIndex,
        class: RegisterClass,
        index: u32,
        value: u64,
    ) -> Result<(), RegisterTableError> {
        self.table_mut(processor)?.stage_write(processor, class, index, value)
    }

    fn stage_bit_field(
        &mut self,
        processor: ProcessorIndex,
        class: RegisterClass,
        index: u32,
        field: BitField,
        value: u64,
    ) -> Result<(), RegisterTableError> {
        self.table_mut(processor)?.stage_bit_field(processor, class, index, field, value)
    }
}
