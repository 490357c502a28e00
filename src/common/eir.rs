//! Extended-inquiry-response payload handling: decoding the service
//! identifiers a peer advertises, and assembling the local payload that is
//! broadcast while discoverable.

pub const EIR_DATA_LENGTH: usize = 240;

const EIR_UUID16_SOME: u8 = 0x02;
const EIR_UUID16_ALL: u8 = 0x03;
const EIR_UUID32_SOME: u8 = 0x04;
const EIR_UUID32_ALL: u8 = 0x05;
const EIR_UUID128_SOME: u8 = 0x06;
const EIR_UUID128_ALL: u8 = 0x07;
const EIR_NAME_COMPLETE: u8 = 0x09;
const EIR_TX_POWER: u8 = 0x0a;

/// Base UUID suffix used when promoting 16/32-bit identifiers.
const BASE_UUID_SUFFIX: &str = "0000-1000-8000-00805f9b34fb";

fn uuid16_to_string(val: u16) -> String {
    format!("0000{val:04x}-{BASE_UUID_SUFFIX}")
}

fn uuid32_to_string(val: u32) -> String {
    format!("{val:08x}-{BASE_UUID_SUFFIX}")
}

fn uuid128_to_string(bytes: &[u8]) -> String {
    // EIR carries the 128-bit value little-endian.
    let mut b = [0u8; 16];
    for (i, byte) in bytes.iter().enumerate() {
        b[15 - i] = *byte;
    }
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12], b[13],
        b[14], b[15]
    )
}

/// Extracts service identifiers from an advertising-payload fragment.
/// Returns an empty list for truncated or malformed data.
pub fn decode_services(data: &[u8]) -> Vec<String> {
    let mut services = Vec::new();
    let mut offset = 0;

    while offset + 1 < data.len() {
        let field_len = data[offset] as usize;
        // Zero length marks the end of significant data.
        if field_len == 0 {
            break;
        }
        if offset + 1 + field_len > data.len() {
            return Vec::new();
        }

        let kind = data[offset + 1];
        let payload = &data[offset + 2..offset + 1 + field_len];

        match kind {
            EIR_UUID16_SOME | EIR_UUID16_ALL => {
                for chunk in payload.chunks_exact(2) {
                    services.push(uuid16_to_string(u16::from_le_bytes([chunk[0], chunk[1]])));
                }
            }
            EIR_UUID32_SOME | EIR_UUID32_ALL => {
                for chunk in payload.chunks_exact(4) {
                    services.push(uuid32_to_string(u32::from_le_bytes([
                        chunk[0], chunk[1], chunk[2], chunk[3],
                    ])));
                }
            }
            EIR_UUID128_SOME | EIR_UUID128_ALL => {
                for chunk in payload.chunks_exact(16) {
                    services.push(uuid128_to_string(chunk));
                }
            }
            _ => {}
        }

        offset += field_len + 1;
    }

    services
}

/// Assembles the local advertising payload from the adapter name, inquiry
/// tx power and the 16-bit identifiers of the supported services. Fields
/// that do not fit in the fixed-size payload are dropped, name first.
pub fn build_payload(name: &str, tx_power: i8, services: &[String]) -> [u8; EIR_DATA_LENGTH] {
    let mut data = [0u8; EIR_DATA_LENGTH];
    let mut offset = 0;

    let name_bytes = name.as_bytes();
    if !name_bytes.is_empty() && offset + name_bytes.len() + 2 <= EIR_DATA_LENGTH {
        data[offset] = (name_bytes.len() + 1) as u8;
        data[offset + 1] = EIR_NAME_COMPLETE;
        data[offset + 2..offset + 2 + name_bytes.len()].copy_from_slice(name_bytes);
        offset += name_bytes.len() + 2;
    }

    if offset + 3 <= EIR_DATA_LENGTH {
        data[offset] = 2;
        data[offset + 1] = EIR_TX_POWER;
        data[offset + 2] = tx_power as u8;
        offset += 3;
    }

    let uuid16s: Vec<u16> = services.iter().filter_map(|s| base_uuid16(s)).collect();
    if !uuid16s.is_empty() && offset + 2 + uuid16s.len() * 2 <= EIR_DATA_LENGTH {
        data[offset] = (uuid16s.len() * 2 + 1) as u8;
        data[offset + 1] = EIR_UUID16_ALL;
        offset += 2;
        for val in uuid16s {
            data[offset..offset + 2].copy_from_slice(&val.to_le_bytes());
            offset += 2;
        }
    }

    data
}

/// Recovers the 16-bit identifier from a base-UUID service string, if it
/// is one.
fn base_uuid16(service: &str) -> Option<u16> {
    let rest = service.strip_prefix("0000")?;
    let val = rest.get(..4)?;
    let suffix = rest.get(4..)?.strip_prefix('-')?;
    if suffix != BASE_UUID_SUFFIX {
        return None;
    }
    u16::from_str_radix(val, 16).ok()
}
