// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host-observable failures: what the facade returns when its caller
//! misuses the API, as distinct from the architectural exceptions the
//! pipeline delivers to guest code (those never surface here) and the
//! internal-invariant panics a bug in this crate itself would cause.

#[derive(Debug, snafu::Snafu)]
#[snafu(visibility(pub))]
pub enum SystemError {
    /// A register id outside `0..=15` was passed to `get_register` or
    /// `set_register`.
    #[snafu(display("no such register: R{id}"))]
    UnknownRegister { id: u32 },

    /// A newly registered plain memory region overlapped one already mapped.
    #[snafu(display(
        "memory region [{base:#010x}, {:#010x}) overlaps an existing region",
        base.wrapping_add(*size)
    ))]
    OverlappingMemory { base: u32, size: u32 },

    /// A newly registered MMIO region overlapped one already mapped.
    #[snafu(display(
        "mmio region [{base:#010x}, {:#010x}) overlaps an existing region",
        base.wrapping_add(*size)
    ))]
    OverlappingMmio { base: u32, size: u32 },

    /// `load_rom` was asked to load more ROM than fits below the high
    /// mirror without colliding with the low window.
    #[snafu(display("rom image of {size} bytes does not fit in the 26-bit address space"))]
    InvalidRomSize { size: usize },
}
