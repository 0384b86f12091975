// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later

//! The pipeline driver: the two-slot prefetch buffer, the condition gate,
//! the top-level primary-opcode switch, and the single-step/run-until-host-
//! interrupt loops described in §4.G.

use crate::bus::Bus;
use crate::condition::{Condition, ConditionMatrix};
use crate::dataproc;
use crate::exception::{self, ExceptionKind};
use crate::loadstore::{self, address_valid};
use crate::multiply;
use crate::outcome::InstructionOutcome;
use crate::psr::Psr;
use crate::registers::{decode_reg, Reg, RegisterFile};
use crate::shifter::{self, ShiftKind};

/// The four pending-interrupt lines plus the debug/host lines, polled at
/// the top of every pipeline iteration. `FIRQ`/`IRQ` delivery is further
/// gated by the processor's own `I`/`F` flags (tracked on [`RegisterFile`],
/// not duplicated here); `Debug` and `Host` are never masked.
#[derive(Copy, Clone, Debug, Default)]
pub struct InterruptLines {
    firq: bool,
    irq: bool,
    debug: bool,
    host: bool,
}

impl InterruptLines {
    #[must_use]
    pub const fn new() -> Self {
        Self { firq: false, irq: false, debug: false, host: false }
    }

    pub fn raise_firq(&mut self) {
        self.firq = true;
    }

    pub fn raise_irq(&mut self) {
        self.irq = true;
    }

    pub fn raise_debug(&mut self) {
        self.debug = true;
    }

    pub fn raise_host(&mut self) {
        self.host = true;
    }

    pub fn clear_host(&mut self) {
        self.host = false;
    }

    pub fn clear_debug(&mut self) {
        self.debug = false;
    }

    #[inline]
    #[must_use]
    const fn host_or_debug(self) -> bool {
        self.host || self.debug
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct Slot {
    word: u32,
    addr: u32,
    valid: bool,
}

/// Outcome of a single pipeline iteration, distinguishing an executed
/// instruction (or exception/skip) from the loop observing a host or debug
/// interrupt and stopping.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepResult {
    Executed { cycles: u32 },
    Halted,
}

/// Nominal cost of vectoring an exception or interrupt: one cycle for the
/// condition-fail-equivalent skip plus one for the vector fetch.
const EXCEPTION_VECTOR_CYCLES: u32 = 2;

/// The two-slot instruction prefetch buffer and the decode/execute switch
/// that drives it.
#[derive(Clone, Debug)]
pub struct Pipeline {
    slots: [Slot; 2],
    current: usize,
    matrix: ConditionMatrix,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self { slots: [Slot::default(); 2], current: 0, matrix: ConditionMatrix::new() }
    }

    /// Resets the prefetch buffer and refills both slots from the current
    /// PC, then advances the architectural PC by eight so it again reflects
    /// "two instructions ahead" (§4.C, §4.G).
    pub fn flush<B: Bus>(&mut self, regs: &mut RegisterFile, bus: &mut B) {
        let base = regs.pc();
        self.slots = [fetch_slot(bus, base), fetch_slot(bus, base.wrapping_add(4))];
        self.current = 0;
        regs.set_pc(base.wrapping_add(8));
    }

    /// Runs exactly one iteration of the main loop and returns.
    pub fn step<B: Bus>(&mut self, regs: &mut RegisterFile, bus: &mut B, interrupts: &mut InterruptLines) -> StepResult {
        self.iterate(regs, bus, interrupts)
    }

    /// Runs iterations until a host or debug interrupt is observed, returning
    /// the total cycle count.
    pub fn run<B: Bus>(&mut self, regs: &mut RegisterFile, bus: &mut B, interrupts: &mut InterruptLines) -> u64 {
        let mut total = 0u64;
        loop {
            match self.iterate(regs, bus, interrupts) {
                StepResult::Executed { cycles } => total += u64::from(cycles),
                StepResult::Halted => break,
            }
        }
        total
    }

    fn iterate<B: Bus>(&mut self, regs: &mut RegisterFile, bus: &mut B, interrupts: &mut InterruptLines) -> StepResult {
        if interrupts.host_or_debug() {
            return StepResult::Halted;
        }

        let flags = regs.flags();
        if interrupts.firq && !flags.firq_disabled {
            self.vector(regs, bus, ExceptionKind::Firq);
            return StepResult::Executed { cycles: EXCEPTION_VECTOR_CYCLES };
        }
        if interrupts.irq && !flags.irq_disabled {
            self.vector(regs, bus, ExceptionKind::Irq);
            return StepResult::Executed { cycles: EXCEPTION_VECTOR_CYCLES };
        }

        let slot = self.slots[self.current];
        if !slot.valid {
            self.vector(regs, bus, ExceptionKind::PrefetchAbort);
            return StepResult::Executed { cycles: EXCEPTION_VECTOR_CYCLES };
        }

        let instruction = slot.word;
        let condition = Condition::decode(instruction);
        if !self.matrix.allows(regs.flags().condition_nibble(), condition) {
            self.advance(regs, bus);
            #[cfg(feature = "tracing")]
            tracing::debug!(addr = slot.addr, ?condition, "instruction skipped by condition gate");
            return StepResult::Executed { cycles: 1 };
        }

        match execute(instruction, regs, bus, interrupts) {
            Ok(outcome) => {
                if outcome.flush {
                    self.flush(regs, bus);
                } else {
                    self.advance(regs, bus);
                }
                StepResult::Executed { cycles: outcome.cycles }
            }
            Err(kind) => {
                self.vector(regs, bus, kind);
                StepResult::Executed { cycles: EXCEPTION_VECTOR_CYCLES }
            }
        }
    }

    /// Saves the return address (the instruction four bytes behind the
    /// current architectural PC, per the seed scenarios in §8) and vectors
    /// through the exception engine, then flushes the buffer.
    fn vector<B: Bus>(&mut self, regs: &mut RegisterFile, bus: &mut B, kind: ExceptionKind) {
        regs.set_pc(regs.pc().wrapping_sub(4));
        exception::raise(regs, kind);
        self.flush(regs, bus);
    }

    fn advance<B: Bus>(&mut self, regs: &mut RegisterFile, bus: &mut B) {
        let refill_addr = regs.pc();
        self.slots[self.current] = fetch_slot(bus, refill_addr);
        regs.set_pc(refill_addr.wrapping_add(4));
        self.current ^= 1;
    }
}

fn fetch_slot<B: Bus>(bus: &mut B, addr: u32) -> Slot {
    if !address_valid(addr) {
        return Slot { word: 0, addr, valid: false };
    }
    let word = bus.fetch_word(addr);
    let valid = bus.last_fetch_mapped();
    Slot { word, addr, valid }
}

/// Decodes and executes one instruction, returning its outcome or the
/// architectural exception it raised.
fn execute<B: Bus>(
    instruction: u32,
    regs: &mut RegisterFile,
    bus: &mut B,
    interrupts: &mut InterruptLines,
) -> Result<InstructionOutcome, ExceptionKind> {
    match (instruction >> 25) & 0x7 {
        0b000 => execute_primary_000(instruction, regs, bus, interrupts),
        0b001 => data_processing_gate(instruction, regs, true, interrupts),
        0b010 | 0b011 => loadstore::single_transfer(instruction, regs, bus),
        0b100 => loadstore::block_transfer(instruction, regs, bus),
        0b101 => Ok(branch(instruction, regs)),
        0b110 => Err(ExceptionKind::UndefinedInstruction),
        _ => {
            if instruction & (1 << 24) != 0 {
                Err(ExceptionKind::SoftwareInterrupt)
            } else {
                // Coprocessor data-operation/register-transfer space; no
                // coprocessor exists on this core.
                Err(ExceptionKind::UndefinedInstruction)
            }
        }
    }
}

fn execute_primary_000<B: Bus>(
    instruction: u32,
    regs: &mut RegisterFile,
    bus: &mut B,
    interrupts: &mut InterruptLines,
) -> Result<InstructionOutcome, ExceptionKind> {
    let bit4 = instruction & (1 << 4) != 0;
    let bit7 = instruction & (1 << 7) != 0;

    if bit4 && bit7 {
        if (instruction >> 5) & 0x3 == 0 {
            multiply::execute(instruction, regs, bus)
        } else {
            // The ARMv4 half-word/signed-byte transfer space; left
            // reserved-undefined per the Open Question in §9.
            Err(ExceptionKind::UndefinedInstruction)
        }
    } else {
        data_processing_gate(instruction, regs, false, interrupts)
    }
}

/// Checks the UNPREDICTABLE `TST`/`TEQ`/`CMP`/`CMN`-without-`S` case before
/// routing into ordinary data-processing execution.
fn data_processing_gate(
    instruction: u32,
    regs: &mut RegisterFile,
    immediate: bool,
    interrupts: &mut InterruptLines,
) -> Result<InstructionOutcome, ExceptionKind> {
    let opcode = ((instruction >> 21) & 0xF) as u8;
    let s_bit = instruction & (1 << 20) != 0;

    if dataproc::is_comparison_opcode(opcode) && !s_bit {
        // Of the four comparison opcodes only TEQ (opcode 9) carries the
        // reserved bit pattern that distinguishes the debug trap; TST/CMP/CMN
        // without S are unconditionally undefined, and so is TEQ's immediate
        // encoding, whose bits 7:4 are data bits of the rotated immediate
        // rather than a marker.
        if opcode == 0x9 && !immediate && (instruction >> 4) & 0xF == 0x7 {
            interrupts.raise_debug();
            return Ok(InstructionOutcome::cycles(1));
        }
        return Err(ExceptionKind::UndefinedInstruction);
    }

    Ok(data_processing(instruction, regs, immediate))
}

fn decode_operand2(instruction: u32, regs: &RegisterFile, immediate: bool) -> (u32, bool) {
    let carry_in = regs.flags().carry;
    if immediate {
        (shifter::immediate_operand(instruction), carry_in)
    } else {
        let rm = decode_reg(instruction, 0);
        let kind = ShiftKind::decode(instruction);
        let rm_value = regs.get_rm(rm);
        if instruction & (1 << 4) != 0 {
            let rs = decode_reg(instruction, 8);
            let amount = (regs.get_rs(rs) & 0xFF) as u8;
            shifter::shift_by_register(rm_value, kind, amount, carry_in)
        } else {
            let amount = ((instruction >> 7) & 0x1F) as u8;
            shifter::shift_by_immediate(rm_value, kind, amount, carry_in)
        }
    }
}

fn data_processing(instruction: u32, regs: &mut RegisterFile, immediate: bool) -> InstructionOutcome {
    let s_bit = instruction & (1 << 20) != 0;
    let opcode = ((instruction >> 21) & 0xF) as u8;
    let rn = decode_reg(instruction, 16);
    let rd = decode_reg(instruction, 12);

    let (op2, shifter_carry) = decode_operand2(instruction, regs, immediate);
    let op1 = regs.get_rn(rn);
    let flags_in = regs.flags().condition_nibble();
    let (result, new_flags, writes_result) = dataproc::execute(opcode, op1, op2, flags_in, shifter_carry);

    let flush = if writes_result {
        let flush = regs.set_rd(rd, result, s_bit);
        // `Rd = R15` with `S` set restores the whole PSR from the result
        // itself (the exception-return idiom); the freshly computed ALU
        // flags must not also be applied in that case.
        if s_bit && !rd.is_pc() {
            regs.set_status_flags(Psr::default().with_condition_nibble(new_flags).to_bits());
        }
        flush
    } else {
        if s_bit {
            regs.set_status_flags(Psr::default().with_condition_nibble(new_flags).to_bits());
        }
        false
    };

    InstructionOutcome::cycles(1).flush_if(flush)
}

fn branch(instruction: u32, regs: &mut RegisterFile) -> InstructionOutcome {
    let link = instruction & (1 << 24) != 0;
    let raw = instruction & 0x00FF_FFFF;
    let offset = (((raw as i32) << 8) >> 8) << 2;

    let pc = regs.pc();
    let target = pc.wrapping_add(offset as u32);

    if link {
        let return_value = pc.wrapping_sub(4) | regs.psr();
        regs.set_rn(Reg::R14, return_value);
    }

    regs.set_pc(target);
    InstructionOutcome::cycles(3).flushed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psr::ProcessorMode;

    #[derive(Default)]
    struct FlatRam {
        bytes: Vec<u8>,
    }

    impl FlatRam {
        fn new(size: usize) -> Self {
            Self { bytes: vec![0; size] }
        }

        fn load(&mut self, addr: u32, words: &[u32]) {
            for (i, w) in words.iter().enumerate() {
                self.write_word(addr + (i as u32) * 4, *w);
            }
        }
    }

    impl Bus for FlatRam {
        fn read_byte(&mut self, addr: u32) -> u8 {
            self.bytes.get(addr as usize).copied().unwrap_or(0xDF)
        }
        fn read_halfword(&mut self, addr: u32) -> u16 {
            let lo = self.read_byte(addr) as u16;
            let hi = self.read_byte(addr.wrapping_add(1)) as u16;
            lo | (hi << 8)
        }
        fn read_word(&mut self, addr: u32) -> u32 {
            let mut word = 0u32;
            for i in 0..4 {
                word |= (self.read_byte(addr.wrapping_add(i)) as u32) << (i * 8);
            }
            word
        }
        fn write_byte(&mut self, addr: u32, value: u8) {
            if let Some(slot) = self.bytes.get_mut(addr as usize) {
                *slot = value;
            }
        }
        fn write_halfword(&mut self, addr: u32, value: u16) {
            self.write_byte(addr, value as u8);
            self.write_byte(addr.wrapping_add(1), (value >> 8) as u8);
        }
        fn write_word(&mut self, addr: u32, value: u32) {
            for i in 0..4 {
                self.write_byte(addr.wrapping_add(i), (value >> (i * 8)) as u8);
            }
        }
    }

    #[test]
    fn mov_then_add_immediate_in_user_mode() {
        let mut ram = FlatRam::new(0x10000);
        ram.load(0, &[0xE3A0_0005, 0xE280_0003]);
        let mut regs = RegisterFile::new();
        let mut pipeline = Pipeline::new();
        let mut interrupts = InterruptLines::new();
        pipeline.flush(&mut regs, &mut ram);

        pipeline.step(&mut regs, &mut ram, &mut interrupts);
        pipeline.step(&mut regs, &mut ram, &mut interrupts);

        assert_eq!(regs.get_rn(Reg::R0), 8);
        assert_eq!(regs.mode(), ProcessorMode::User);
    }

    #[test]
    fn subs_flags_overflow_scenario() {
        let mut ram = FlatRam::new(0x10000);
        ram.load(0, &[0xE051_3002]);
        let mut regs = RegisterFile::new();
        regs.set_rn(Reg::R1, 0x8000_0000);
        regs.set_rn(Reg::R2, 0x0000_0001);
        let mut pipeline = Pipeline::new();
        let mut interrupts = InterruptLines::new();
        pipeline.flush(&mut regs, &mut ram);
        pipeline.step(&mut regs, &mut ram, &mut interrupts);

        assert_eq!(regs.get_rn(Reg::R3), 0x7FFF_FFFF);
        let flags = regs.flags();
        assert!(!flags.negative);
        assert!(!flags.zero);
        assert!(flags.carry);
        assert!(flags.overflow);
    }

    #[test]
    fn branch_with_link_then_return_restores_pc() {
        let mut ram = FlatRam::new(0x2000);
        // BL to PC+0x40 (PC read as the instruction's own address + 8).
        ram.load(0x1000, &[0xEB00_0010]);
        ram.load(0x1048, &[0xE1A0_F00E]);
        let mut regs = RegisterFile::new();
        regs.set_psr(ProcessorMode::Svc as u32);
        regs.set_pc(0x1000);
        let mut pipeline = Pipeline::new();
        let mut interrupts = InterruptLines::new();
        pipeline.flush(&mut regs, &mut ram);

        pipeline.step(&mut regs, &mut ram, &mut interrupts);
        // R14 holds the address of the instruction after the BL.
        assert_eq!(regs.get_rn(Reg::R14) & 0x03FF_FFFC, 0x1004);
        // PC reads 8 bytes ahead of the branch target just fetched.
        assert_eq!(regs.pc(), 0x1050);

        pipeline.step(&mut regs, &mut ram, &mut interrupts);
        // MOV PC, R14 restores execution to right after the BL, again read
        // 8 bytes ahead once the buffer refills.
        assert_eq!(regs.pc(), 0x100C);
    }

    #[test]
    fn teq_without_s_and_reserved_operand_raises_the_debug_trap() {
        let mut ram = FlatRam::new(0x1000);
        ram.load(0, &[0xE120_0070]);
        let mut regs = RegisterFile::new();
        let mut pipeline = Pipeline::new();
        let mut interrupts = InterruptLines::new();
        pipeline.flush(&mut regs, &mut ram);

        let result = pipeline.step(&mut regs, &mut ram, &mut interrupts);
        assert_eq!(result, StepResult::Executed { cycles: 1 });
        // No vector taken: the buffer kept advancing past the trapping word.
        assert_eq!(regs.pc(), 0x0C);
        // The debug line is latched, so the next iteration halts.
        assert_eq!(pipeline.step(&mut regs, &mut ram, &mut interrupts), StepResult::Halted);
    }

    #[test]
    fn cmp_without_s_is_undefined_even_with_the_trap_bit_pattern() {
        let mut ram = FlatRam::new(0x1000);
        ram.load(0, &[0xE140_0070]);
        let mut regs = RegisterFile::new();
        regs.set_psr(ProcessorMode::Svc as u32);
        let mut pipeline = Pipeline::new();
        let mut interrupts = InterruptLines::new();
        pipeline.flush(&mut regs, &mut ram);

        pipeline.step(&mut regs, &mut ram, &mut interrupts);
        // Vectored through the undefined-instruction handler instead.
        assert_eq!(regs.pc(), 0x0000_0004 + 8);
    }

    #[test]
    fn teq_immediate_without_s_is_always_undefined() {
        let mut ram = FlatRam::new(0x1000);
        ram.load(0, &[0xE320_0000]);
        let mut regs = RegisterFile::new();
        regs.set_psr(ProcessorMode::Svc as u32);
        let mut pipeline = Pipeline::new();
        let mut interrupts = InterruptLines::new();
        pipeline.flush(&mut regs, &mut ram);

        pipeline.step(&mut regs, &mut ram, &mut interrupts);
        assert_eq!(regs.pc(), 0x0000_0004 + 8);
    }

    /// A `Bus` that raises a data abort on its `abort_on_nth` read, to
    /// exercise a fault partway through a block transfer.
    struct AbortingRam {
        ram: FlatRam,
        reads_until_abort: usize,
        pending_abort: bool,
    }

    impl Bus for AbortingRam {
        fn read_byte(&mut self, addr: u32) -> u8 {
            self.ram.read_byte(addr)
        }
        fn read_halfword(&mut self, addr: u32) -> u16 {
            self.ram.read_halfword(addr)
        }
        fn read_word(&mut self, addr: u32) -> u32 {
            let value = self.ram.read_word(addr);
            if self.reads_until_abort == 0 {
                self.pending_abort = true;
            } else {
                self.reads_until_abort -= 1;
            }
            value
        }
        fn write_byte(&mut self, addr: u32, value: u8) {
            self.ram.write_byte(addr, value);
        }
        fn write_halfword(&mut self, addr: u32, value: u16) {
            self.ram.write_halfword(addr, value);
        }
        fn write_word(&mut self, addr: u32, value: u32) {
            self.ram.write_word(addr, value);
        }
        fn take_data_abort(&mut self) -> bool {
            std::mem::take(&mut self.pending_abort)
        }
    }

    #[test]
    fn data_abort_mid_ldm_does_not_unwind_partial_writes() {
        let mut ram = AbortingRam { ram: FlatRam::new(0x10000), reads_until_abort: 1, pending_abort: false };
        ram.ram.write_word(0x8000, 0x1111_1111);
        ram.ram.write_word(0x8004, 0x2222_2222);
        let mut regs = RegisterFile::new();
        regs.set_rn(Reg::R13, 0x8000);
        // LDMIA R13, {R0, R1}: the first word loads normally, the second
        // raises a data abort. The already-loaded R0 is left in place.
        let ldm = (1 << 23) | (1 << 20) | (13 << 16) | 0x0003;
        let err = loadstore::block_transfer(ldm, &mut regs, &mut ram).unwrap_err();
        assert_eq!(err, ExceptionKind::DataAbort);
        assert_eq!(regs.get_rn(Reg::R0), 0x1111_1111);
        assert_eq!(regs.get_rn(Reg::R1), 0);
    }

    #[test]
    fn address_exception_seed_scenario() {
        let mut ram = FlatRam::new(0x0400_0010);
        let mut regs = RegisterFile::new();
        ram.load(0x0FF8, &[0xE591_0004]);
        regs.set_rn(Reg::R1, 0x03FF_FFFF);
        regs.set_psr(ProcessorMode::Svc as u32);
        regs.set_pc(0x0FF8);
        let mut pipeline = Pipeline::new();
        let mut interrupts = InterruptLines::new();
        pipeline.flush(&mut regs, &mut ram);

        pipeline.step(&mut regs, &mut ram, &mut interrupts);

        // PC reads 8 bytes ahead of the vector the buffer just refilled from.
        assert_eq!(regs.pc(), 0x0000_001C);
        assert_eq!(regs.mode(), ProcessorMode::Svc);
        assert!(regs.flags().irq_disabled);
    }
}
