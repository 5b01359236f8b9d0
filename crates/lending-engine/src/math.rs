//! checked fixed-point helpers
//!
//! every operation rounds toward zero and reports overflow instead of
//! wrapping. callers choose operand order so rounding favours the pool.

use crate::error::{Error, Result};
use crate::types::Wad;

/// `a * b / d` rounded down, without overflowing when only the
/// intermediate product exceeds `u128`.
pub fn mul_div(a: u128, b: u128, d: u128) -> Result<u128> {
    if d == 0 {
        return Err(Error::MathOverflow);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / d);
    }
    split_mul_div(a, b, d)
        .or_else(|| split_mul_div(b, a, d))
        .ok_or(Error::MathOverflow)
}

// a = q*d + r  =>  a*b/d = q*b + r*b/d, exact under floor division
fn split_mul_div(a: u128, b: u128, d: u128) -> Option<u128> {
    let q = a / d;
    let r = a % d;
    let high = q.checked_mul(b)?;
    let low = r.checked_mul(b)? / d;
    high.checked_add(low)
}

/// `base ^ exp` in wad precision by repeated squaring
pub fn wad_pow(base: Wad, mut exp: u64) -> Result<Wad> {
    let mut result = Wad::ONE;
    let mut square = base;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.checked_mul(square)?;
        }
        exp >>= 1;
        if exp > 0 {
            square = square.checked_mul(square)?;
        }
    }
    Ok(result)
}
