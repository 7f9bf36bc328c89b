//! Machine check capability detection and initialization.
//!
//! Four capabilities form a dependency chain, see [`Capability`]. For each processor the CPU feature framework asks
//! whether a capability is supported, then runs its initializer with the state requested by the platform
//! [`MachineCheckConfig`]. Initializers do not write hardware; they stage writes into the processor's
//! [`RegisterTable`](patina_register_table::RegisterTable), which is committed later in boot.
//!
//! ```rust,ignore
//! let features = MachineCheckFeatures::new(MachineCheckConfig { power_on_reset: true, ..Default::default() });
//! register_machine_check_features(&mut registry)?;
//!
//! // Before any processor is initialized.
//! features.capture_feature_control_snapshot(processor_count, |processor| mp.run_on(processor, read_feature_control))?;
//!
//! let mut tables = RegisterTableSet::new(processor_count);
//! features.initialize_all(&processors, bootstrap, &probe, &mut tables)?;
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]

extern crate alloc;

pub mod capability;
pub mod component;
pub mod config;
pub mod error;
pub mod initialize;
pub mod probe;
pub mod registers;
pub mod registration;
pub mod snapshot;

pub use capability::{Capability, FeatureState, WriterScope};
pub use component::{CapabilityOutcome, MachineCheckFeatures, ProcessorReport};
pub use config::MachineCheckConfig;
pub use error::{ContractViolation, MachineCheckError};
pub use initialize::InitializeContext;
pub use probe::{CapabilityProbe, CapabilityProbeContext};
#[cfg(target_arch = "x86_64")]
pub use probe::{LocalProcessorProbe, read_feature_control};
pub use registration::{FeatureRegistration, FeatureRegistry, MACHINE_CHECK_FEATURES, register_machine_check_features};
pub use snapshot::FeatureControlSnapshot;

#[cfg(any(test, feature = "mockall"))]
pub use probe::MockCapabilityProbe;
#[cfg(any(test, feature = "mockall"))]
pub use registration::MockFeatureRegistry;
