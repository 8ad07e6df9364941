/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Capacity unit helpers.
//!
//! The engine works in binary units throughout: RAM and disk in MiB, CPU in
//! hundredths of a core.  Inventory reports bytes and whole cores, so every
//! conversion goes through these free functions.

/// Bytes in one MiB.
pub const BYTES_PER_MIB: u64 = 1024 * 1024;

/// MiB in one GiB.
pub const MIB_PER_GIB: u64 = 1024;

/// CPU units (hundredths of a core) per core.
pub const CPU_UNITS_PER_CORE: u64 = 100;

/// Fractional MiB for a byte count.
///
/// Not truncated: the RAM rule floors only after applying the reservation
/// margin, so early truncation would change results.
pub fn bytes_to_mib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MIB as f64
}

pub fn gib_to_mib(gib: u64) -> u64 {
    gib.saturating_mul(MIB_PER_GIB)
}

pub fn cores_to_cpu_units(cores: u32) -> f64 {
    (cores as u64 * CPU_UNITS_PER_CORE) as f64
}

/// Format a capacity figure for reason strings: integers print without a
/// fractional part (`600`), everything else with up to two decimals.
pub fn format_amount(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() {
        format!("{}", v as i64)
    } else {
        let s = format!("{v:.2}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
