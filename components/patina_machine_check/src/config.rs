//! Machine Check Component Configuration
//!
//! The configuration is platform policy: whether this boot is a power-on reset, and which capabilities should end up
//! enabled. Supported capabilities that are not enabled are still initialized, to their disabled state.
//!
//! ```rust,ignore
//! let features = patina_machine_check::MachineCheckFeatures::new(patina_machine_check::config::MachineCheckConfig {
//!     power_on_reset: true,
//!     enabled_capabilities: Capability::MachineCheckException.mask() | Capability::MachineCheckArchitecture.mask(),
//! });
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use crate::capability::{Capability, FeatureState};

/// Default: warm boot, error status from before the reset is preserved.
pub const DEFAULT_POWER_ON_RESET: bool = false;
/// Default: every machine check capability enabled.
pub const DEFAULT_ENABLED_CAPABILITIES: u32 = Capability::MachineCheckException.mask()
    | Capability::MachineCheckArchitecture.mask()
    | Capability::GlobalControl.mask()
    | Capability::LocalMachineCheck.mask();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineCheckConfig {
    /// This boot is a power-on reset, as opposed to a warm reset or an S3 resume.
    pub power_on_reset: bool,
    /// Bitmask of [`Capability::mask`] values to enable.
    pub enabled_capabilities: u32,
}

impl MachineCheckConfig {
    /// The state `capability` should be initialized to.
    pub const fn state_of(&self, capability: Capability) -> FeatureState {
        if self.enabled_capabilities & capability.mask() != 0 { FeatureState::Enabled } else { FeatureState::Disabled }
    }
}

impl Default for MachineCheckConfig {
    fn default() -> Self {
        Self { power_on_reset: DEFAULT_POWER_ON_RESET, enabled_capabilities: DEFAULT_ENABLED_CAPABILITIES }
    }
}
