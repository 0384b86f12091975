// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later

//! The multiply/swap sub-family that shares primary opcode `000` with
//! data-processing: `MUL`/`MLA`, the 64-bit `UMULL`/`UMLAL`/`SMULL`/`SMLAL`
//! long multiplies, and `SWP`/`SWPB` (dispatched straight into
//! [`crate::loadstore::swap`]).
//!
//! Gated on bits 7:4 of the instruction equalling `0b1001`; the caller is
//! responsible for checking that before reaching here (see
//! [`crate::pipeline`]'s primary-opcode switch).

use crate::alu;
use crate::bus::Bus;
use crate::exception::ExceptionKind;
use crate::loadstore;
use crate::outcome::InstructionOutcome;
use crate::psr::Psr;
use crate::registers::{decode_reg, RegisterFile};

/// Dispatches the bits-24:23 sub-selector: `00` `MUL`/`MLA`, `01` long
/// multiply, `10` `SWP`, `11` reserved/undefined.
pub fn execute<B: Bus>(
    instruction: u32,
    regs: &mut RegisterFile,
    bus: &mut B,
) -> Result<InstructionOutcome, ExceptionKind> {
    match (instruction >> 23) & 0x3 {
        0b00 => Ok(mul_or_mla(instruction, regs)),
        0b01 => Ok(long_multiply(instruction, regs)),
        0b10 => loadstore::swap(instruction, regs, bus),
        _ => Err(ExceptionKind::UndefinedInstruction),
    }
}

fn mul_or_mla(instruction: u32, regs: &mut RegisterFile) -> InstructionOutcome {
    let s_bit = instruction & (1 << 20) != 0;
    let accumulate = instruction & (1 << 21) != 0;
    let rd = decode_reg(instruction, 16);
    let rn_accumulator = decode_reg(instruction, 12);
    let rs = decode_reg(instruction, 8);
    let rm = decode_reg(instruction, 0);

    // The use of get_rs/get_rn here doesn't match the field names, but is
    // correct for the handling of R15.
    let rm_value = regs.get_rs(rm);
    let rs_value = regs.get_rn(rs);
    let flags_in = regs.flags().condition_nibble();

    let (result, new_flags) = if accumulate {
        alu::mla(rm_value, rs_value, regs.get_rn(rn_accumulator), flags_in)
    } else {
        alu::mul(rm_value, rs_value, flags_in)
    };

    regs.set_rn(rd, result);
    if s_bit {
        regs.set_status_flags(Psr::default().with_condition_nibble(new_flags).to_bits());
    }

    // Simulates the timing of the Booth multiplier, scanned off the bits
    // 0-3 operand.
    InstructionOutcome::cycles(alu::mul_cycle_cost(rm_value))
}

/// `UMULL`/`UMLAL`/`SMULL`/`SMLAL`. Per the Open Question in §9, any `R15`
/// operand reads as `PC+4`-with-PSR (the `Rx` accessor) for consistency
/// with the plain `MUL` family, rather than being treated as UNPREDICTABLE.
fn long_multiply(instruction: u32, regs: &mut RegisterFile) -> InstructionOutcome {
    let signed = instruction & (1 << 22) != 0;
    let accumulate = instruction & (1 << 21) != 0;
    let s_bit = instruction & (1 << 20) != 0;
    let rd_hi = decode_reg(instruction, 16);
    let rd_lo = decode_reg(instruction, 12);
    let rs = decode_reg(instruction, 8);
    let rm = decode_reg(instruction, 0);

    let rm_value = regs.get_rx(rm);
    let rs_value = regs.get_rx(rs);
    let flags_in = regs.flags().condition_nibble();
    let accumulator = (u64::from(regs.get_rn(rd_hi)) << 32) | u64::from(regs.get_rn(rd_lo));

    let (result, new_flags) = match (signed, accumulate) {
        (false, false) => alu::umull(rm_value, rs_value, flags_in),
        (false, true) => alu::umlal(rm_value, rs_value, accumulator, flags_in),
        (true, false) => alu::smull(rm_value, rs_value, flags_in),
        (true, true) => alu::smlal(rm_value, rs_value, accumulator, flags_in),
    };

    regs.set_rn(rd_lo, result as u32);
    regs.set_rn(rd_hi, (result >> 32) as u32);
    if s_bit {
        regs.set_status_flags(Psr::default().with_condition_nibble(new_flags).to_bits());
    }

    // Unlike the short multiplies, the long forms don't time the Booth
    // multiplier off the operands; a fixed cost is charged regardless.
    InstructionOutcome::cycles(3)
}
