//! Layouts and addresses of the registers involved in machine check initialization.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use bitfield_struct::bitfield;
use patina_register_table::BitField;
use x86_64::registers::control::Cr4Flags;

/// Control register number of CR4.
pub const CR4: u32 = 4;
/// CR4.MCE, machine check exception enable.
pub const CR4_MCE: BitField = BitField::bit(Cr4Flags::MACHINE_CHECK_EXCEPTION.bits().trailing_zeros() as u8);

pub const IA32_FEATURE_CONTROL: u32 = 0x3A;
/// IA32_FEATURE_CONTROL.LMCE_ON.
pub const FEATURE_CONTROL_LMCE_ON: BitField = BitField::bit(20);

pub const IA32_MCG_CAP: u32 = 0x179;
pub const IA32_MCG_CTL: u32 = 0x17B;

/// IA32_MC0_CTL. Bank `n` uses `IA32_MC0_CTL + n * MC_BANK_STRIDE`.
pub const IA32_MC0_CTL: u32 = 0x400;
/// IA32_MC0_STATUS. Bank `n` uses `IA32_MC0_STATUS + n * MC_BANK_STRIDE`.
pub const IA32_MC0_STATUS: u32 = 0x401;
/// Distance between the registers of two consecutive banks.
pub const MC_BANK_STRIDE: u32 = 4;

/// CPUID leaf 01h, EDX.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct CpuIdVersionInfoEdx {
    pub fpu: bool,
    pub vme: bool,
    pub de: bool,
    pub pse: bool,
    pub tsc: bool,
    pub msr: bool,
    pub pae: bool,
    /// Machine check exception.
    pub mce: bool,
    pub cx8: bool,
    pub apic: bool,
    #[bits(1)]
    __: u8,
    pub sep: bool,
    pub mtrr: bool,
    pub pge: bool,
    /// Machine check architecture.
    pub mca: bool,
    #[bits(17)]
    __: u32,
}

/// IA32_MCG_CAP, the global machine check capability register.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct McgCap {
    /// Number of error-reporting banks.
    pub count: u8,
    /// IA32_MCG_CTL is present.
    pub mcg_ctl_p: bool,
    pub mcg_ext_p: bool,
    pub mcg_cmci_p: bool,
    pub mcg_tes_p: bool,
    #[bits(4)]
    __: u8,
    pub mcg_ext_cnt: u8,
    pub mcg_ser_p: bool,
    #[bits(1)]
    __: u8,
    pub mcg_elog_p: bool,
    /// Local machine check exception signaling is supported.
    pub mcg_lmce_p: bool,
    #[bits(36)]
    __: u64,
}

/// IA32_FEATURE_CONTROL. Write-once: after `lock` is set the register ignores writes until reset.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct FeatureControl {
    pub lock: bool,
    pub enable_vmx_inside_smx: bool,
    pub enable_vmx_outside_smx: bool,
    #[bits(5)]
    __: u8,
    #[bits(7)]
    pub senter_local_function_enables: u8,
    pub senter_global_enable: bool,
    #[bits(1)]
    __: u8,
    pub sgx_launch_control_enable: bool,
    pub sgx_global_enable: bool,
    #[bits(1)]
    __: u8,
    pub lmce_on: bool,
    #[bits(43)]
    __: u64,
}
