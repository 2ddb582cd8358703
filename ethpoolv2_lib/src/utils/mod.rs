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

pub mod hex;
pub mod units;
