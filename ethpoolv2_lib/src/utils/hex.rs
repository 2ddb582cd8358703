// Copyright (C) 2025, 2026 Ethpoolv2 Developers (see AUTHORS)
//
// This file is part of Ethpoolv2
//
// Ethpoolv2 is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Ethpoolv2 is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// Ethpoolv2. If not, see <https://www.gnu.org/licenses/>.

use num_bigint::BigInt;

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Parse a 0x-prefixed hex quantity into an i64.
pub fn parse_hex_i64(s: &str) -> Result<i64, std::num::ParseIntError> {
    i64::from_str_radix(strip_hex_prefix(s), 16)
}

/// Parse a 0x-prefixed hex quantity of arbitrary size. Returns `None` on
/// malformed input, including the empty string.
pub fn parse_hex_big(s: &str) -> Option<BigInt> {
    let stripped = strip_hex_prefix(s);
    if stripped.is_empty() {
        return None;
    }
    BigInt::parse_bytes(stripped.as_bytes(), 16)
}

/// A well-formed Ethereum address: 0x followed by 40 hex digits.
pub fn is_valid_hex_address(s: &str) -> bool {
    s.len() == 42
        && (s.starts_with("0x") || s.starts_with("0X"))
        && s[2..].bytes().all(|b| b.is_ascii_hexdigit())
}
