// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later

//! The exception engine: the common machinery every architectural fault
//! and interrupt routes through to save state, mask interrupts, switch
//! mode and vector.

use crate::psr::ProcessorMode;
use crate::registers::RegisterFile;

/// The eight architectural exception kinds of the 26-bit core.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExceptionKind {
    Reset,
    UndefinedInstruction,
    SoftwareInterrupt,
    PrefetchAbort,
    DataAbort,
    AddressException,
    Irq,
    Firq,
}

impl ExceptionKind {
    /// The fixed low-memory vector this exception branches through.
    #[inline]
    #[must_use]
    pub const fn vector(self) -> u32 {
        match self {
            Self::Reset => 0x0000_0000,
            Self::UndefinedInstruction => 0x0000_0004,
            Self::SoftwareInterrupt => 0x0000_0008,
            Self::PrefetchAbort => 0x0000_000C,
            Self::DataAbort => 0x0000_0010,
            Self::AddressException => 0x0000_0014,
            Self::Irq => 0x0000_0018,
            Self::Firq => 0x0000_001C,
        }
    }

    /// The mode this exception runs its handler in.
    #[inline]
    #[must_use]
    pub const fn target_mode(self) -> ProcessorMode {
        match self {
            Self::Irq => ProcessorMode::Irq,
            Self::Firq => ProcessorMode::Firq,
            _ => ProcessorMode::Svc,
        }
    }

    /// Whether this exception additionally masks FIRQ (only Reset and FIRQ
    /// itself do; everything else masks IRQ alone).
    #[inline]
    #[must_use]
    pub const fn masks_firq(self) -> bool {
        matches!(self, Self::Reset | Self::Firq)
    }
}

const IRQ_DISABLE_BIT: u32 = 1 << crate::psr::IRQ_DISABLE_SHIFT;
const FIRQ_DISABLE_BIT: u32 = 1 << crate::psr::FIRQ_DISABLE_SHIFT;

/// Delivers an exception: saves `PC | PSR` into the banked R14 of the
/// target mode, masks interrupts as the exception kind requires, switches
/// mode and branches through the fixed vector.
///
/// Matches the source order exactly: the return value is saved into the
/// target mode's bank *before* the mode switch (see
/// [`RegisterFile::set_banked_r14`] for the same-mode caveat this implies),
/// the mask bits are applied directly to the live PSR, then the mode
/// switch brings the new bank into the active registers, and finally PC is
/// set to the vector.
pub fn raise(regs: &mut RegisterFile, kind: ExceptionKind) {
    let saved = regs.pc() | regs.psr();
    regs.set_banked_r14(kind.target_mode(), saved);

    let mut mask = IRQ_DISABLE_BIT;
    if kind.masks_firq() {
        mask |= FIRQ_DISABLE_BIT;
    }
    force_mask_bits(regs, mask);

    regs.change_mode(kind.target_mode());
    regs.set_pc(kind.vector());

    #[cfg(feature = "tracing")]
    tracing::trace!(?kind, vector = kind.vector(), "exception raised");
}

/// Resets the processor: as [`raise`] with [`ExceptionKind::Reset`]. Both
/// interrupt masks end up forced regardless, since
/// [`ExceptionKind::masks_firq`] is true for `Reset`.
pub fn reset(regs: &mut RegisterFile) {
    raise(regs, ExceptionKind::Reset);
}

fn force_mask_bits(regs: &mut RegisterFile, bits: u32) {
    let psr = regs.psr() | bits;
    // Bypass update_psr's privilege gating: exception delivery always runs
    // with full authority over I/F regardless of the mode being departed.
    let _ = regs.set_psr(psr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::Reg;

    #[test]
    fn software_interrupt_switches_to_svc_and_masks_irq() {
        let mut regs = RegisterFile::new();
        regs.set_pc(0x0000_1000);
        raise(&mut regs, ExceptionKind::SoftwareInterrupt);
        assert_eq!(regs.pc(), 0x0000_0008);
        assert_eq!(regs.mode(), ProcessorMode::Svc);
        assert!(regs.flags().irq_disabled);
        assert!(!regs.flags().firq_disabled);
    }

    #[test]
    fn firq_masks_both_interrupts() {
        let mut regs = RegisterFile::new();
        raise(&mut regs, ExceptionKind::Firq);
        assert_eq!(regs.mode(), ProcessorMode::Firq);
        assert!(regs.flags().irq_disabled);
        assert!(regs.flags().firq_disabled);
    }

    #[test]
    fn swi_from_user_mode_saves_return_address_into_r14_svc() {
        let mut regs = RegisterFile::new();
        regs.set_pc(0x0000_2000);
        raise(&mut regs, ExceptionKind::SoftwareInterrupt);
        assert_eq!(regs.get_rn(Reg::R14) & 0x03FF_FFFC, 0x0000_2000);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut a = RegisterFile::new();
        let mut b = RegisterFile::new();
        reset(&mut a);
        reset(&mut a);
        reset(&mut b);
        assert_eq!(a.pc(), b.pc());
        assert_eq!(a.psr(), b.psr());
    }
}
