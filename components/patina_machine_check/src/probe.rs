//! Per-processor machine check identification.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use patina_register_table::ProcessorIndex;

use crate::registers::{CpuIdVersionInfoEdx, McgCap};

#[cfg(target_arch = "x86_64")]
pub use x64::{LocalProcessorProbe, read_feature_control};

/// The identification registers of one processor, read at a single point in time.
///
/// Contexts are never shared between processors: bank counts and capability bits may differ between processor models
/// in the same system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityProbeContext {
    pub version_info_edx: CpuIdVersionInfoEdx,
    pub mcg_cap: McgCap,
}

impl CapabilityProbeContext {
    pub const fn new(version_info_edx: CpuIdVersionInfoEdx, mcg_cap: McgCap) -> Self {
        Self { version_info_edx, mcg_cap }
    }

    /// Number of error-reporting banks of the probed processor.
    pub const fn bank_count(&self) -> u8 {
        self.mcg_cap.count()
    }
}

/// Reads the identification registers of a processor.
#[cfg_attr(any(test, feature = "mockall"), mockall::automock)]
pub trait CapabilityProbe {
    fn probe(&self, processor: ProcessorIndex) -> CapabilityProbeContext;
}

#[cfg(target_arch = "x86_64")]
mod x64 {
    use core::arch::x86_64 as arch;

    use patina_register_table::ProcessorIndex;
    use x86_64::registers::model_specific::Msr;

    use super::{CapabilityProbe, CapabilityProbeContext};
    use crate::registers::{CpuIdVersionInfoEdx, FeatureControl, IA32_FEATURE_CONTROL, IA32_MCG_CAP, McgCap};

    /// Probes the processor executing the call.
    ///
    /// The processor index is only used for logging; the scheduler must run the probe on that processor.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct LocalProcessorProbe;

    impl CapabilityProbe for LocalProcessorProbe {
        fn probe(&self, processor: ProcessorIndex) -> CapabilityProbeContext {
            // SAFETY: CPUID leaf 1 is implemented by every x86_64 processor.
            let version_info_edx = CpuIdVersionInfoEdx::from_bits(unsafe { arch::__cpuid(1) }.edx);

            // IA32_MCG_CAP faults on processors without MCA.
            let mcg_cap = if version_info_edx.mca() {
                // SAFETY: CPUID reports MCA, so IA32_MCG_CAP is implemented.
                McgCap::from_bits(unsafe { Msr::new(IA32_MCG_CAP).read() })
            } else {
                McgCap::new()
            };

            log::trace!(
                "Processor {}: CPUID.01h:EDX = {:#x}, IA32_MCG_CAP = {:#x}",
                processor,
                version_info_edx.into_bits(),
                mcg_cap.into_bits()
            );
            CapabilityProbeContext::new(version_info_edx, mcg_cap)
        }
    }

    /// Reads IA32_FEATURE_CONTROL of the executing processor, for
    /// [`FeatureControlSnapshot::capture`](crate::snapshot::FeatureControlSnapshot::capture).
    ///
    /// ## Safety
    ///
    /// Must run at CPL 0 on a processor that implements IA32_FEATURE_CONTROL.
    pub unsafe fn read_feature_control() -> FeatureControl {
        FeatureControl::from_bits(unsafe { Msr::new(IA32_FEATURE_CONTROL).read() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_count_comes_from_mcg_cap() {
        let context = CapabilityProbeContext::new(
            CpuIdVersionInfoEdx::new().with_mce(true).with_mca(true),
            McgCap::new().with_count(10).with_mcg_ctl_p(true),
        );
        assert_eq!(10, context.bank_count());
        assert_eq!(0, CapabilityProbeContext::default().bank_count());
    }

    #[test]
    fn test_mock_probe_per_processor() {
        let mut probe = MockCapabilityProbe::new();
        probe.expect_probe().returning(|processor| {
            CapabilityProbeContext::new(CpuIdVersionInfoEdx::new(), McgCap::new().with_count(processor.0 as u8 + 1))
        });

        assert_eq!(1, probe.probe(ProcessorIndex(0)).bank_count());
        assert_eq!(4, probe.probe(ProcessorIndex(3)).bank_count());
    }
}
