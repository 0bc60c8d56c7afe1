//! Text forms of numbers shared by the index-key, JSON and hash encoders.

use crate::error::{CodecError, CodecResult};

/// Formats `v` the way ECMAScript's `Number.prototype.toString` does.
///
/// Values with magnitude below `1e-6` or at least `1e21` use exponent form
/// (`1e-7`, `1e+21`); everything else is plain decimal. The shortest text that
/// round-trips at `bitsize` precision is produced, so a 32-bit field is
/// formatted from its `f32` value. NaN and infinities are rejected.
pub fn format_float(v: f64, bitsize: u32) -> CodecResult<String> {
    if v.is_nan() || v.is_infinite() {
        return Err(CodecError::UnsupportedFloat {
            value: v.to_string(),
        });
    }
    let abs = v.abs();
    let exponent_form = if abs == 0.0 {
        false
    } else if bitsize == 32 {
        let abs32 = abs as f32;
        abs32 < 1e-6 || abs32 >= 1e21
    } else {
        abs < 1e-6 || abs >= 1e21
    };

    let text = match (bitsize == 32, exponent_form) {
        (true, false) => format!("{}", v as f32),
        (true, true) => format!("{:e}", v as f32),
        (false, false) => format!("{v}"),
        (false, true) => format!("{v:e}"),
    };
    if exponent_form {
        Ok(sign_exponent(text))
    } else {
        Ok(text)
    }
}

/// Rust writes `1e21`; JavaScript writes `1e+21`.
fn sign_exponent(mut text: String) -> String {
    if let Some(at) = text.find('e') {
        if !text[at + 1..].starts_with('-') {
            text.insert(at + 1, '+');
        }
    }
    text
}

/// Parses float text produced by [`format_float`] (or any decimal float).
///
/// A 32-bit field is parsed at `f32` precision and widened.
pub fn parse_float(text: &str, bitsize: u32) -> CodecResult<f64> {
    let parsed = if bitsize == 32 {
        text.parse::<f32>().map(f64::from).ok()
    } else {
        text.parse::<f64>().ok()
    };
    parsed.ok_or_else(|| CodecError::decoding_failed(format!("invalid float {text:?}")))
}

/// Formats `v` in base 36 using lowercase digits.
pub fn format_base36(mut v: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if v == 0 {
        return "0".to_string();
    }
    let mut out = [0u8; 13];
    let mut at = out.len();
    while v > 0 {
        at -= 1;
        out[at] = DIGITS[(v % 36) as usize];
        v /= 36;
    }
    out[at..].iter().map(|&b| b as char).collect()
}

/// Parses base-36 text produced by [`format_base36`].
pub fn parse_base36(text: &str) -> CodecResult<u64> {
    u64::from_str_radix(text, 36)
        .map_err(|e| CodecError::decoding_failed(format!("invalid base-36 id {text:?}: {e}")))
}

/// Checks that `v` fits a signed integer of `bitsize` bits.
pub fn check_int_width(v: i64, bitsize: u32) -> CodecResult<i64> {
    let fits = match bitsize {
        8 => i8::try_from(v).is_ok(),
        16 => i16::try_from(v).is_ok(),
        32 => i32::try_from(v).is_ok(),
        _ => true,
    };
    if fits {
        Ok(v)
    } else {
        Err(CodecError::integer_overflow(v, bitsize))
    }
}

/// Checks that `v` fits an unsigned integer of `bitsize` bits.
pub fn check_uint_width(v: u64, bitsize: u32) -> CodecResult<u64> {
    let fits = match bitsize {
        8 => u8::try_from(v).is_ok(),
        16 => u16::try_from(v).is_ok(),
        32 => u32::try_from(v).is_ok(),
        _ => true,
    };
    if fits {
        Ok(v)
    } else {
        Err(CodecError::integer_overflow(v, bitsize))
    }
}
