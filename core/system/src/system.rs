// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later

use armemu_core::exception;
use armemu_core::psr::ProcessorMode;
use armemu_core::registers::{Reg, RegisterFile};
use armemu_core::{InterruptLines, Pipeline};
use armemu_map::{MemoryMap, MmioDevice, ADDRESS_CEILING, DEFAULT_RAM_BASE, DEFAULT_RAM_SIZE};

use crate::error::{InvalidRomSizeSnafu, OverlappingMemorySnafu, OverlappingMmioSnafu, SystemError, UnknownRegisterSnafu};

/// The opaque emulator handle (component H): a register file, a two-stage
/// pipeline, a memory map and the interrupt-status lines, wired together.
///
/// `System` owns every piece of mutable state the emulator needs and is not
/// `Sync`; a host that wants to interrupt a long-running [`System::run`]
/// from another thread shares only the narrow [`System::raise_host_interrupt`]
/// entry point (see the concurrency model in the processor specification),
/// never the handle itself.
pub struct System {
    regs: RegisterFile,
    pipeline: Pipeline,
    bus: MemoryMap,
    interrupts: InterruptLines,
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

impl System {
    /// Builds a fresh emulator with the default RAM window (32 KiB at
    /// `0x0000_8000`) and no ROM, then brings it up the way real hardware
    /// would: a reset exception delivered immediately, buffer flushed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ram(DEFAULT_RAM_BASE, DEFAULT_RAM_SIZE)
    }

    /// As [`Self::new`], with a caller-chosen RAM base and size (rounded up
    /// to the memory map's minimum region granularity).
    #[must_use]
    pub fn with_ram(ram_base: u32, ram_size: u32) -> Self {
        let mut system = Self {
            regs: RegisterFile::new(),
            pipeline: Pipeline::new(),
            bus: MemoryMap::new(ram_base, ram_size),
            interrupts: InterruptLines::new(),
        };
        system.reset();
        system
    }

    /// Replaces the ROM image (low window plus its high mirror) and
    /// regenerates the memory-map lookup tables. Rejects an image too large
    /// to fit without the low window and high mirror overlapping.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::InvalidRomSize`] if `bytes` would round up to
    /// more than half of the 26-bit address space.
    pub fn load_rom(&mut self, bytes: &[u8]) -> Result<(), SystemError> {
        if bytes.len() as u32 > ADDRESS_CEILING / 2 {
            return InvalidRomSizeSnafu { size: bytes.len() }.fail();
        }
        self.bus.load_rom(bytes);
        self.rebuild_map();

        #[cfg(feature = "tracing")]
        tracing::info!(bytes = bytes.len(), "rom loaded");

        Ok(())
    }

    /// Registers an additional host-backed memory region.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::OverlappingMemory`] if the region collides
    /// with one already registered.
    ///
    pub fn map_memory(&mut self, base: u32, size: u32, writable: bool) -> Result<(), SystemError> {
        if self.bus.map_memory(base, size, writable) {
            Ok(())
        } else {
            OverlappingMemorySnafu { base, size }.fail()
        }
    }

    /// Registers a memory-mapped I/O device over `[base, base+size)`.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::OverlappingMmio`] if the region collides with
    /// one already registered.
    pub fn map_mmio(&mut self, base: u32, size: u32, device: Box<dyn MmioDevice>) -> Result<(), SystemError> {
        if self.bus.map_mmio(base, size, device) {
            Ok(())
        } else {
            OverlappingMmioSnafu { base, size }.fail()
        }
    }

    /// Re-sorts and deduplicates the memory map's region tables. Safe to
    /// call whether or not anything actually changed; `load_rom`,
    /// `map_memory` and `map_mmio` each call this for their caller, so a
    /// host only needs it after reaching into the map by some other route.
    pub fn rebuild_map(&mut self) {
        self.bus.rebuild_map();
    }

    /// Raises a reset exception and flushes the pipeline. Idempotent: two
    /// resets in a row land on the same architectural state as one.
    pub fn reset(&mut self) {
        exception::reset(&mut self.regs);
        self.pipeline.flush(&mut self.regs, &mut self.bus);

        #[cfg(feature = "tracing")]
        tracing::info!("system reset");
    }

    /// Runs pipeline iterations until a host or debug interrupt is
    /// observed, returning the total cycle count consumed. Returns
    /// immediately with zero cycles if one is already pending on entry.
    pub fn run(&mut self) -> u64 {
        self.pipeline.run(&mut self.regs, &mut self.bus, &mut self.interrupts)
    }

    /// Runs exactly one pipeline iteration (one retired instruction, one
    /// condition-skip, or one exception/interrupt vector) and returns its
    /// cycle cost, or zero if a host/debug interrupt was already pending.
    pub fn step(&mut self) -> u64 {
        match self.pipeline.step(&mut self.regs, &mut self.bus, &mut self.interrupts) {
            armemu_core::pipeline::StepResult::Executed { cycles } => u64::from(cycles),
            armemu_core::pipeline::StepResult::Halted => 0,
        }
    }

    /// The currently active processor mode.
    #[must_use]
    pub fn get_mode(&self) -> ProcessorMode {
        self.regs.mode()
    }

    /// Reads general register `id` (`0..=15`) with ordinary `Rn` semantics
    /// (R15 reads as the full `PC | PSR` composite).
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::UnknownRegister`] if `id` is not `0..=15`.
    pub fn get_register(&self, id: u32) -> Result<u32, SystemError> {
        let reg = valid_register(id)?;
        Ok(self.regs.get_rn(reg))
    }

    /// Writes general register `id` with ordinary `Rn` semantics (a write
    /// to R15 updates only the PC bits, preserving PSR).
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::UnknownRegister`] if `id` is not `0..=15`.
    pub fn set_register(&mut self, id: u32, value: u32) -> Result<(), SystemError> {
        let reg = valid_register(id)?;
        self.regs.set_rn(reg, value);
        Ok(())
    }

    /// Copies up to `buf.len()` bytes of guest memory starting at `addr`
    /// into `buf` without any of the side effects a real access might carry
    /// (no MMIO device is invoked, no data abort can be raised). Stops at
    /// the first address that isn't plain RAM/ROM/host-mapped memory,
    /// returning the number of bytes actually copied.
    pub fn read_guest(&self, addr: u32, buf: &mut [u8]) -> usize {
        for (i, slot) in buf.iter_mut().enumerate() {
            match self.bus.peek_byte(addr.wrapping_add(i as u32)) {
                Some(byte) => *slot = byte,
                None => return i,
            }
        }
        buf.len()
    }

    /// The write counterpart of [`Self::read_guest`]: stops at the first
    /// byte that isn't writable plain memory, returning the number of bytes
    /// actually written.
    pub fn write_guest(&mut self, addr: u32, bytes: &[u8]) -> usize {
        for (i, byte) in bytes.iter().enumerate() {
            if !self.bus.poke_byte(addr.wrapping_add(i as u32), *byte) {
                return i;
            }
        }
        bytes.len()
    }

    /// Raises the FIRQ line. Delivered on the next pipeline iteration if
    /// the processor's `F` flag does not mask it.
    pub fn raise_firq(&mut self) {
        self.interrupts.raise_firq();
    }

    /// Raises the IRQ line. Delivered on the next pipeline iteration if the
    /// processor's `I` flag does not mask it.
    pub fn raise_irq(&mut self) {
        self.interrupts.raise_irq();
    }

    /// Raises the non-maskable debug line (as `bkpt`/the reserved
    /// comparison-opcode trap would), causing [`Self::run`] to return on
    /// its next iteration.
    pub fn raise_debug(&mut self) {
        self.interrupts.raise_debug();
    }

    /// Clears the debug line so a later `run`/`step` is not halted by it
    /// immediately.
    pub fn clear_debug(&mut self) {
        self.interrupts.clear_debug();
    }

    /// The host-cancellation entry point described in the concurrency
    /// model: calling this causes [`Self::run`] to return promptly once its
    /// current instruction (if any) retires.
    pub fn raise_host_interrupt(&mut self) {
        self.interrupts.raise_host();
    }

    /// Clears the host-pending line so a later `run`/`step` is not halted
    /// by it immediately.
    pub fn clear_host_interrupt(&mut self) {
        self.interrupts.clear_host();
    }
}

fn valid_register(id: u32) -> Result<Reg, SystemError> {
    if id <= 15 {
        Ok(Reg(id as u8))
    } else {
        UnknownRegisterSnafu { id }.fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_system_is_reset_and_ready_to_step() {
        let system = System::new();
        assert_eq!(system.get_mode(), ProcessorMode::Svc);
        assert!(system.regs.flags().irq_disabled);
    }

    #[test]
    fn reset_twice_matches_reset_once() {
        let mut a = System::new();
        let mut b = System::new();
        a.reset();
        assert_eq!(a.get_register(15).unwrap(), b.get_register(15).unwrap());
        b.reset();
        assert_eq!(a.get_register(15).unwrap(), b.get_register(15).unwrap());
    }

    #[test]
    fn unknown_register_id_is_rejected() {
        let system = System::new();
        assert!(system.get_register(16).is_err());
    }

    #[test]
    fn load_rom_rejects_an_oversized_image() {
        let mut system = System::new();
        let huge = vec![0u8; (ADDRESS_CEILING / 2 + 1) as usize];
        assert!(system.load_rom(&huge).is_err());
    }

    #[test]
    fn read_guest_round_trips_write_guest_and_stops_at_a_gap() {
        let mut system = System::with_ram(DEFAULT_RAM_BASE, DEFAULT_RAM_SIZE);
        let written = system.write_guest(DEFAULT_RAM_BASE, &[1, 2, 3, 4]);
        assert_eq!(written, 4);
        let mut buf = [0u8; 4];
        let read = system.read_guest(DEFAULT_RAM_BASE, &mut buf);
        assert_eq!(read, 4);
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn overlapping_mmio_registration_reports_the_conflicting_region() {
        struct Stub;
        impl MmioDevice for Stub {
            fn read_word(&mut self, _offset: u32) -> Option<u32> {
                Some(0)
            }
            fn write_word(&mut self, _offset: u32, _value: u32) -> bool {
                true
            }
        }
        let mut system = System::new();
        system.map_mmio(0x0400_0000, 0x10, Box::new(Stub)).unwrap();
        let err = system.map_mmio(0x0400_0004, 0x10, Box::new(Stub)).unwrap_err();
        assert!(matches!(err, SystemError::OverlappingMmio { .. }));
    }
}
