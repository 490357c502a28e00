use std::fmt;
use std::str::FromStr;

use crate::common::Error;

/// A 48-bit device address, stored little-endian like the controller
/// reports it.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Hash)]
pub struct Address([u8; 6]);

impl Address {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Address(bytes)
    }

    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }

    /// Colon-free rendering used as the fallback alias for peers whose
    /// name was never resolved.
    pub fn to_alias(&self) -> String {
        self.to_string().replace(':', "-")
    }
}

impl From<u64> for Address {
    fn from(addr: u64) -> Self {
        let bytes = addr.to_le_bytes()[..6]
            .try_into()
            .unwrap_or_else(|_| unreachable!("slice length matches array length"));
        Address(bytes)
    }
}

impl From<Address> for u64 {
    fn from(addr: Address) -> Self {
        let mut bytes = [0u8; 8];
        bytes[..6].copy_from_slice(&addr.0);

        u64::from_le_bytes(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Big-endian on the wire format, most significant byte first.
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[5], self.0[4], self.0[3], self.0[2], self.0[1], self.0[0]
        )
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');

        for slot in (0..6).rev() {
            let part = parts
                .next()
                .ok_or_else(|| Error::InvalidArguments(format!("malformed address: {s}")))?;
            bytes[slot] = u8::from_str_radix(part, 16)
                .map_err(|_| Error::InvalidArguments(format!("malformed address: {s}")))?;
        }

        if parts.next().is_some() {
            return Err(Error::InvalidArguments(format!("malformed address: {s}")));
        }

        Ok(Address(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_from_u64() {
        let addr = Address::from(0x112233445566u64);
        assert_eq!(addr.bytes(), [0x66, 0x55, 0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn address_display_round_trip() {
        let addr = Address::from(0x112233445566u64);
        assert_eq!(addr.to_string(), "11:22:33:44:55:66");
        assert_eq!("11:22:33:44:55:66".parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn address_alias_uses_dashes() {
        let addr = Address::from(0xAABBCCDDEEFFu64);
        assert_eq!(addr.to_alias(), "AA-BB-CC-DD-EE-FF");
    }

    #[test]
    fn address_parse_rejects_garbage() {
        assert!("11:22:33".parse::<Address>().is_err());
        assert!("11:22:33:44:55:zz".parse::<Address>().is_err());
        assert!("11:22:33:44:55:66:77".parse::<Address>().is_err());
    }
}
