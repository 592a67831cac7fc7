//! Utility functions and helpers

use crate::types::events::Keywords;
use crate::types::session::SessionMask;
use anyhow::Result;

/// Parse a keyword mask given as hex (`0x1f`), binary (`0b101`) or decimal
pub fn parse_keywords(s: &str) -> Result<Keywords> {
    let s = s.trim().replace('_', "");

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Ok(u64::from_str_radix(hex, 16)?)
    } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        Ok(u64::from_str_radix(bin, 2)?)
    } else {
        Ok(s.parse()?)
    }
}

/// Render a session mask as a fixed-width bit string, slot 0 rightmost
pub fn format_mask(mask: SessionMask, width: usize) -> String {
    let width = width.clamp(1, SessionMask::BITS as usize);
    format!("{:0width$b}", mask & low_bits(width), width = width)
}

fn low_bits(width: usize) -> SessionMask {
    if width >= SessionMask::BITS as usize {
        SessionMask::MAX
    } else {
        (1 << width) - 1
    }
}
