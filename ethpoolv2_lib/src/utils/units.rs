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

//! Monetary units. Chain amounts are wei; the credit ledger is kept in
//! Shannon (10^9 wei) as plain integers.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::ToPrimitive;

/// Wei per Shannon.
pub const SHANNON: i64 = 1_000_000_000;

const DISPLAY_SCALE: i64 = 100_000_000;

/// Convert an exact wei amount to whole Shannon, truncating toward zero.
/// This is the single lossy step between reward arithmetic and the ledger.
pub fn wei_to_shannon(value: &BigRational) -> i64 {
    (value.clone() / BigRational::from_integer(BigInt::from(SHANNON)))
        .to_integer()
        .to_i64()
        .unwrap_or_default()
}

/// Format an exact wei amount for log output: Shannon scaled by 10^-7 with
/// eight fractional digits.
pub fn format_rat_reward(value: &BigRational) -> String {
    let scaled = (value.clone() / BigRational::from_integer(BigInt::from(DISPLAY_SCALE)))
        .to_integer()
        .to_i128()
        .unwrap_or_default();
    format!(
        "{}.{:08}",
        scaled / DISPLAY_SCALE as i128,
        (scaled % DISPLAY_SCALE as i128).unsigned_abs()
    )
}

/// Format an integer wei amount, same scaling as [`format_rat_reward`].
pub fn format_reward(value: &BigInt) -> String {
    format_rat_reward(&BigRational::from_integer(value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::One;

    fn rat(wei: i128) -> BigRational {
        BigRational::from_integer(BigInt::from(wei))
    }

    #[test]
    fn test_wei_to_shannon_exact() {
        assert_eq!(wei_to_shannon(&rat(1_000_000_000)), 1);
        assert_eq!(wei_to_shannon(&rat(1_000_000_000_000_000_000)), 1_000_000_000);
        assert_eq!(wei_to_shannon(&rat(0)), 0);
    }

    #[test]
    fn test_wei_to_shannon_truncates_toward_zero() {
        assert_eq!(wei_to_shannon(&rat(1_999_999_999)), 1);
        // 1.5 wei under a full Shannon still truncates
        let just_under = rat(2_000_000_000) - BigRational::new(BigInt::one(), BigInt::from(2));
        assert_eq!(wei_to_shannon(&just_under), 1);
    }

    #[test]
    fn test_format_rat_reward() {
        // 1 ETH = 10^9 Shannon, displayed as 100.00000000
        assert_eq!(format_rat_reward(&rat(1_000_000_000_000_000_000)), "100.00000000");
        assert_eq!(format_rat_reward(&rat(0)), "0.00000000");
        // 5 ETH block reward
        assert_eq!(format_rat_reward(&rat(5_000_000_000_000_000_000)), "500.00000000");
        // sub-unit amounts keep their fractional digits
        assert_eq!(format_rat_reward(&rat(123_400_000_000)), "0.00001234");
    }

    #[test]
    fn test_format_reward() {
        assert_eq!(
            format_reward(&BigInt::from(2_000_000_000_000_000_000i128)),
            "200.00000000"
        );
    }
}
