// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later

//! The memory-side interface the CPU core requires of its host. Kept as a
//! trait so this crate never depends on any concrete memory-map
//! implementation; `armemu_map` supplies the implementation this crate's
//! pipeline actually runs against.
//!
//! Every access is infallible from the CPU's point of view: a memory map
//! that can't satisfy an address is expected to return a fixed pattern for
//! reads and discard writes silently, rather than surface a host-level
//! error through this trait. Architectural consequences of bad addresses
//! (address exceptions, aborts) are the caller's responsibility to raise
//! based on the address itself, not something this trait reports.

/// A 26-bit-addressable memory system as seen by the CPU core.
pub trait Bus {
    fn read_byte(&mut self, addr: u32) -> u8;
    fn read_halfword(&mut self, addr: u32) -> u16;
    fn read_word(&mut self, addr: u32) -> u32;

    fn write_byte(&mut self, addr: u32, value: u8);
    fn write_halfword(&mut self, addr: u32, value: u16);
    fn write_word(&mut self, addr: u32, value: u32);

    /// Fetches a word for the instruction pipeline. Distinct from
    /// `read_word` so an implementation may choose to track instruction
    /// fetches separately (for tracing, or a future split I/D path); the
    /// default simply defers to `read_word`.
    #[inline]
    fn fetch_word(&mut self, addr: u32) -> u32 {
        self.read_word(addr)
    }

    /// Whether the most recent `fetch_word` call landed on a mapped region.
    /// An ordinary data read to an unmapped address returns a fixed pattern
    /// and is not a fault, but a fetch that finds nothing mapped leaves the
    /// corresponding pipeline slot invalid instead, so it raises a prefetch
    /// abort if the instruction it would have held is ever reached. The
    /// default reports every fetch as mapped; a memory map that actually
    /// tracks region coverage overrides this.
    #[inline]
    fn last_fetch_mapped(&mut self) -> bool {
        true
    }

    /// `SWP`: reads the old value then writes the new one, returning the
    /// old. Not atomic with respect to anything but itself, which is all a
    /// single-threaded core needs.
    #[inline]
    fn exchange_byte(&mut self, addr: u32, value: u8) -> u8 {
        let old = self.read_byte(addr);
        self.write_byte(addr, value);
        old
    }

    /// `SWP` (word form).
    #[inline]
    fn exchange_word(&mut self, addr: u32, value: u32) -> u32 {
        let old = self.read_word(addr);
        self.write_word(addr, value);
        old
    }

    /// Whether the most recently completed access raised a data abort (an
    /// MMIO region signalling an external abort, for instance). The default
    /// never aborts, matching the RAM/ROM/unmapped paths of §4.E, which
    /// never fail; a `Bus` that backs an MMIO region able to refuse an
    /// access overrides this to report it, and the load/store unit turns a
    /// `true` here into an architectural data abort.
    #[inline]
    fn take_data_abort(&mut self) -> bool {
        false
    }
}
