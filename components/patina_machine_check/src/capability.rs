//! The machine check capability chain.
//!
//! ```text
//! MachineCheckException (CPUID.01h:EDX.MCE)
//!  └─ MachineCheckArchitecture (CPUID.01h:EDX.MCA)
//!      ├─ GlobalControl (IA32_MCG_CAP.MCG_CTL_P)
//!      └─ LocalMachineCheck (IA32_MCG_CAP.MCG_LMCE_P)
//! ```
//!
//! A capability is supported only if its parent is supported and the hardware reports the capability itself.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use patina_register_table::ProcessorIndex;
use spin::Once;

use crate::probe::CapabilityProbeContext;

static LOCAL_MACHINE_CHECK_REPORTED: Once = Once::new();

/// Prefix of the diagnostic logged the first time LMCE support is resolved.
pub const LOCAL_MACHINE_CHECK_DIAGNOSTIC: &str = "Local machine check exception supported:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// CR4.MCE, the machine check exception itself.
    MachineCheckException,
    /// Error-reporting banks.
    MachineCheckArchitecture,
    /// IA32_MCG_CTL.
    GlobalControl,
    /// Local machine check exception delivery, IA32_FEATURE_CONTROL.LMCE_ON.
    LocalMachineCheck,
}

/// Which processors may run a capability's initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterScope {
    AnyProcessor,
    /// The initializer writes state shared by the platform and is only run on the bootstrap processor. The scheduler
    /// enforces this; initializers only check it.
    BootstrapOnly,
}

impl WriterScope {
    pub const fn permits(self, bootstrap: bool) -> bool {
        match self {
            WriterScope::AnyProcessor => true,
            WriterScope::BootstrapOnly => bootstrap,
        }
    }
}

/// The state a capability should be initialized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureState {
    Disabled,
    Enabled,
}

impl FeatureState {
    pub const fn is_enabled(self) -> bool {
        matches!(self, FeatureState::Enabled)
    }

    /// Value of a single enable bit for this state.
    pub const fn as_bit(self) -> u64 {
        self.is_enabled() as u64
    }
}

impl From<bool> for FeatureState {
    fn from(enabled: bool) -> Self {
        if enabled { FeatureState::Enabled } else { FeatureState::Disabled }
    }
}

impl Capability {
    /// Every capability, parents before children.
    pub const ALL: [Capability; 4] = [
        Capability::MachineCheckException,
        Capability::MachineCheckArchitecture,
        Capability::GlobalControl,
        Capability::LocalMachineCheck,
    ];

    /// Stable name the capability is registered under.
    pub const fn name(self) -> &'static str {
        match self {
            Capability::MachineCheckException => "MCE",
            Capability::MachineCheckArchitecture => "MCA",
            Capability::GlobalControl => "MCG_CTL",
            Capability::LocalMachineCheck => "LMCE",
        }
    }

    pub const fn parent(self) -> Option<Capability> {
        match self {
            Capability::MachineCheckException => None,
            Capability::MachineCheckArchitecture => Some(Capability::MachineCheckException),
            Capability::GlobalControl | Capability::LocalMachineCheck => Some(Capability::MachineCheckArchitecture),
        }
    }

    pub const fn writer_scope(self) -> WriterScope {
        match self {
            Capability::MachineCheckArchitecture | Capability::GlobalControl => WriterScope::BootstrapOnly,
            Capability::MachineCheckException | Capability::LocalMachineCheck => WriterScope::AnyProcessor,
        }
    }

    /// Bit of this capability in [`MachineCheckConfig::enabled_capabilities`](crate::config::MachineCheckConfig).
    pub const fn mask(self) -> u32 {
        1 << self as u32
    }

    /// Whether the hardware reports this capability, without looking at the parent.
    pub const fn reported_by(self, context: &CapabilityProbeContext) -> bool {
        match self {
            Capability::MachineCheckException => context.version_info_edx.mce(),
            Capability::MachineCheckArchitecture => context.version_info_edx.mca(),
            Capability::GlobalControl => context.mcg_cap.mcg_ctl_p(),
            Capability::LocalMachineCheck => context.mcg_cap.mcg_lmce_p(),
        }
    }

    /// Whether `processor` supports this capability: the parent is supported and the hardware reports it.
    pub fn is_supported(self, processor: ProcessorIndex, context: &CapabilityProbeContext) -> bool {
        if let Some(parent) = self.parent() {
            if !parent.is_supported(processor, context) {
                return false;
            }
        }

        let supported = self.reported_by(context);
        if self == Capability::LocalMachineCheck {
            LOCAL_MACHINE_CHECK_REPORTED.call_once(|| log::info!("{} {}", LOCAL_MACHINE_CHECK_DIAGNOSTIC, supported));
        }
        log::trace!("Processor {}: {} supported = {}", processor, self.name(), supported);
        supported
    }
}
