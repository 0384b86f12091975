// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later

//! The result every instruction execution routine produces: how many
//! cycles it cost, and whether it invalidated the prefetch buffer.
//!
//! Mirrors the source's packed `cycleCount | IR_FlushPipeline` return
//! value, split into a small struct rather than a bitfield since nothing
//! outside this crate needs the packed representation.

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InstructionOutcome {
    pub cycles: u32,
    pub flush: bool,
}

impl InstructionOutcome {
    #[inline]
    #[must_use]
    pub const fn cycles(cycles: u32) -> Self {
        Self { cycles, flush: false }
    }

    #[inline]
    #[must_use]
    pub const fn flushed(self) -> Self {
        Self { flush: true, ..self }
    }

    /// Sets `flush` from a boolean condition (typically "did this write the PC").
    #[inline]
    #[must_use]
    pub const fn flush_if(self, condition: bool) -> Self {
        Self { flush: self.flush || condition, ..self }
    }
}
