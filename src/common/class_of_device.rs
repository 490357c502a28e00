use std::fmt;

/// Limited Discoverable bit mask in CoD.
const LIMITED_BIT: u32 = 0x002000;

/// 24-bit class-of-device value: service-class bits in the upper byte,
/// major device class in bits 8..13, minor class in bits 2..8.
#[derive(PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct ClassOfDevice(u32);

impl ClassOfDevice {
    pub const fn new(raw: u32) -> Self {
        ClassOfDevice(raw & 0x00ff_ffff)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn service_classes(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Replaces only the service-class byte, keeping the limited bit and
    /// major/minor class bits intact.
    pub fn with_service_classes(self, value: u8) -> Self {
        ClassOfDevice((self.0 & 0x00ffff) | (u32::from(value) << 16))
    }

    /// Replaces only the major and minor class bits.
    pub fn with_major_minor(self, major: u8, minor: u8) -> Self {
        ClassOfDevice((self.0 & 0xffe000) | (u32::from(major & 0x1f) << 8) | u32::from(minor))
    }

    pub fn limited(&self) -> bool {
        self.0 & LIMITED_BIT != 0
    }

    pub fn with_limited(self, limited: bool) -> Self {
        if limited {
            ClassOfDevice(self.0 | LIMITED_BIT)
        } else {
            ClassOfDevice(self.0 & !LIMITED_BIT)
        }
    }

    pub fn major(&self) -> u8 {
        ((self.0 >> 8) & 0x1f) as u8
    }

    pub fn minor(&self) -> u8 {
        ((self.0 >> 2) & 0x3f) as u8
    }

    /// Icon name advertised alongside a found device, derived from the
    /// major device class.
    pub fn icon(&self) -> &'static str {
        match self.major() {
            0x01 => "computer",
            0x02 => "phone",
            0x03 => "network-wireless",
            0x04 => "audio-card",
            0x05 => "input-keyboard",
            0x06 => "camera-photo",
            0x07 => "multimedia-player",
            0x08 => "toy",
            0x09 => "health",
            _ => "device",
        }
    }
}

impl fmt::Debug for ClassOfDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassOfDevice(0x{:06x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_classes_leave_lower_bits_alone() {
        let cod = ClassOfDevice::new(0x00210c).with_service_classes(0x1a);
        assert_eq!(cod.raw(), 0x1a210c);
        assert_eq!(cod.service_classes(), 0x1a);
        assert!(cod.limited());
    }

    #[test]
    fn major_minor_leave_upper_bits_alone() {
        let cod = ClassOfDevice::new(0x1a2000).with_major_minor(0x01, 0x0c);
        assert_eq!(cod.raw(), 0x1a210c);
        assert_eq!(cod.major(), 0x01);
    }

    #[test]
    fn limited_bit_toggles() {
        let cod = ClassOfDevice::new(0x1a010c);
        assert!(!cod.limited());
        assert!(cod.with_limited(true).limited());
        assert_eq!(cod.with_limited(true).with_limited(false), cod);
    }
}
