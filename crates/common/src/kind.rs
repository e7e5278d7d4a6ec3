// bslice - Backward Slicing Toolkit
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Value kinds carried by trace sequences.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The fixed-width primitive kind stored in one trace sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// 32-bit signed integers
    Int,
    /// 64-bit signed integers
    Long,
}

impl ValueKind {
    /// All kinds, in tag order
    pub const ALL: [Self; 2] = [Self::Int, Self::Long];

    /// Width of one encoded value in bytes
    pub const fn width(self) -> usize {
        match self {
            Self::Int => 4,
            Self::Long => 8,
        }
    }

    /// Lowercase name, as used in configuration files
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Long => "long",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown value kind name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value kind `{0}` (expected `int` or `long`)")]
pub struct UnknownValueKind(pub String);

impl FromStr for ValueKind {
    type Err = UnknownValueKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int" => Ok(Self::Int),
            "long" => Ok(Self::Long),
            _ => Err(UnknownValueKind(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths() {
        assert_eq!(ValueKind::Int.width(), 4);
        assert_eq!(ValueKind::Long.width(), 8);
    }

    #[test]
    fn test_parse_and_display() {
        for kind in ValueKind::ALL {
            assert_eq!(kind.to_string().parse::<ValueKind>().unwrap(), kind);
        }
        assert_eq!("LONG".parse::<ValueKind>().unwrap(), ValueKind::Long);
        assert!("double".parse::<ValueKind>().is_err());
    }
}
