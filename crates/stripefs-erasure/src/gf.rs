//! GF(2^8) arithmetic
//!
//! The field is GF(2^8) reduced by the polynomial 0x11D (the generic
//! Rabin IDA modulus, not the AES one). All arithmetic goes through
//! process-wide immutable log/antilog tables built once at first use;
//! fragment interchange across implementations requires this exact field,
//! so the modulus is not configurable.

use std::sync::LazyLock;

/// Field modulus: x^8 + x^4 + x^3 + x^2 + 1.
pub const GF_MODULUS: u16 = 0x11D;

/// Multiplicative order of the field (2^8 - 1).
const GF_ORDER: usize = 255;

struct GfTables {
    /// log[a] for a in 1..=255; log[0] is unused.
    log: [u16; 256],
    /// pow[i] for i in 0..510, so `pow[log[a] + log[b]]` needs no modulo.
    pow: [u8; 2 * GF_ORDER],
}

static TABLES: LazyLock<GfTables> = LazyLock::new(|| {
    let mut log = [0u16; 256];
    let mut pow = [0u8; 2 * GF_ORDER];
    let mut x: u16 = 1;
    for i in 0..GF_ORDER {
        pow[i] = x as u8;
        pow[i + GF_ORDER] = x as u8;
        log[x as usize] = i as u16;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= GF_MODULUS;
        }
    }
    GfTables { log, pow }
});

/// Multiply two field elements.
#[inline]
#[must_use]
pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = &*TABLES;
    t.pow[(t.log[a as usize] + t.log[b as usize]) as usize]
}

/// Divide `a` by `b`. Division by zero is a contract violation.
#[inline]
#[must_use]
pub fn div(a: u8, b: u8) -> u8 {
    debug_assert!(b != 0, "division by zero in GF(2^8)");
    if a == 0 || b == 0 {
        return 0;
    }
    let t = &*TABLES;
    t.pow[(t.log[a as usize] + GF_ORDER as u16 - t.log[b as usize]) as usize]
}

/// Raise a field element to an integer power.
#[inline]
#[must_use]
pub fn exp(a: u8, n: usize) -> u8 {
    if n == 0 {
        return 1;
    }
    if a == 0 {
        return 0;
    }
    let t = &*TABLES;
    t.pow[(t.log[a as usize] as usize * n) % GF_ORDER]
}

/// `dst[i] ^= src[i]` (field addition).
#[inline]
pub fn xor_slice(dst: &mut [u8], src: &[u8]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

/// `dst[i] = coeff * dst[i]` over the whole slice.
pub fn mul_slice(coeff: u8, dst: &mut [u8]) {
    match coeff {
        0 => dst.fill(0),
        1 => {}
        _ => {
            let t = &*TABLES;
            let lc = t.log[coeff as usize];
            for d in dst.iter_mut() {
                if *d != 0 {
                    *d = t.pow[(lc + t.log[*d as usize]) as usize];
                }
            }
        }
    }
}

/// `acc[i] ^= coeff * src[i]`, the hot multiply-accumulate primitive.
pub fn mul_slice_acc(coeff: u8, src: &[u8], acc: &mut [u8]) {
    debug_assert_eq!(src.len(), acc.len());
    match coeff {
        0 => {}
        1 => xor_slice(acc, src),
        _ => {
            let t = &*TABLES;
            let lc = t.log[coeff as usize];
            for (a, s) in acc.iter_mut().zip(src) {
                if *s != 0 {
                    *a ^= t.pow[(lc + t.log[*s as usize]) as usize];
                }
            }
        }
    }
}
