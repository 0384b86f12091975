// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later

//! The system facade (component H): a single opaque handle that wires an
//! `armemu_core` pipeline and register file to an `armemu_map` memory map,
//! and exposes the operations a library consumer actually needs — load a
//! ROM, register memory-mapped I/O, step or run the processor, and observe
//! guest state without side effects.
//!
//! Everything below this crate (the pipeline, the memory map) treats guest
//! faults as ordinary control flow; this crate is where a host's *misuse*
//! of the API — an unknown register id, overlapping MMIO regions — turns
//! into a proper `Result`, per the three-way error split in the processor
//! specification's error-handling design.

mod error;
mod system;

pub use armemu_core::ProcessorMode;
pub use armemu_map::MmioDevice;
pub use error::SystemError;
pub use system::System;
