use std::fmt::{self, Debug, Display, Write};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A 128-bit identifier in the canonical `8-4-4-4-12` grouping.
///
/// Used both for provider ids and for the correlation ids that link the stage events of a
/// single input line.
#[derive(PartialOrd, Ord, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Guid {
    data1: u32,
    data2: u16,
    data3: u16,
    data4: [u8; 8],
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuidParseError {
    #[error("expected 32 hex digits in 8-4-4-4-12 groups, got `{0}`")]
    InvalidFormat(String),
}

impl Guid {
    pub fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Guid {
        Guid {
            data1,
            data2,
            data3,
            data4,
        }
    }

    pub fn from_u128(value: u128) -> Guid {
        let bytes = value.to_be_bytes();
        let mut data4 = [0; 8];
        data4.copy_from_slice(&bytes[8..]);
        Guid {
            data1: (value >> 96) as u32,
            data2: (value >> 80) as u16,
            data3: (value >> 64) as u16,
            data4,
        }
    }

    pub fn as_u128(&self) -> u128 {
        (u128::from(self.data1) << 96)
            | (u128::from(self.data2) << 80)
            | (u128::from(self.data3) << 64)
            | u128::from(u64::from_be_bytes(self.data4))
    }
}

impl FromStr for Guid {
    type Err = GuidParseError;

    /// Accepts `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` in any case, optionally wrapped in braces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GuidParseError::InvalidFormat(s.to_string());

        let trimmed = s.trim();
        let inner = match (trimmed.strip_prefix('{'), trimmed.strip_suffix('}')) {
            (Some(_), Some(_)) => &trimmed[1..trimmed.len() - 1],
            (None, None) => trimmed,
            _ => return Err(invalid()),
        };

        let groups: Vec<&str> = inner.split('-').collect();
        let lengths = [8, 4, 4, 4, 12];
        if groups.len() != lengths.len()
            || groups
                .iter()
                .zip(lengths.iter())
                .any(|(g, &len)| g.len() != len || !g.bytes().all(|b| b.is_ascii_hexdigit()))
        {
            return Err(invalid());
        }

        let digits: String = groups.concat();
        let value = u128::from_str_radix(&digits, 16).map_err(|_| invalid())?;
        Ok(Guid::from_u128(value))
    }
}

impl Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // We know ahead of time how much space we need.
        let mut s = String::with_capacity(36);

        write!(
            &mut s,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )?;

        f.write_str(&s)
    }
}

impl Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parses_bare_and_braced_in_any_case() {
        let bare: Guid = "8e4f2a1b-0c3d-4e5f-a6b7-c8d9e0f1a2b3".parse().unwrap();
        let braced: Guid = "{8E4F2A1B-0C3D-4E5F-A6B7-C8D9E0F1A2B3}".parse().unwrap();

        assert_eq!(bare, braced);
        assert_eq!(bare.to_string(), "8e4f2a1b-0c3d-4e5f-a6b7-c8d9e0f1a2b3");
    }

    #[test]
    fn test_u128_conversion_matches_text() {
        let guid = Guid::from_u128(0x0011_2233_4455_6677_8899_aabb_ccdd_eeff);
        assert_eq!(guid.to_string(), "00112233-4455-6677-8899-aabbccddeeff");
        assert_eq!(guid.as_u128(), 0x0011_2233_4455_6677_8899_aabb_ccdd_eeff);
    }

    #[test]
    fn test_rejects_malformed_text() {
        for bad in [
            "",
            "not-a-guid",
            "{8e4f2a1b-0c3d-4e5f-a6b7-c8d9e0f1a2b3",
            "8e4f2a1b0c3d4e5fa6b7c8d9e0f1a2b3",
            "8e4f2a1b-0c3d-4e5f-a6b7-c8d9e0f1a2bz",
            "+e4f2a1b-0c3d-4e5f-a6b7-c8d9e0f1a2b3",
        ] {
            assert!(bad.parse::<Guid>().is_err(), "`{}` should not parse", bad);
        }
    }
}
