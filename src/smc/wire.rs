//! Byte-exact serialization of the SMC records.
//!
//! Two distinct layouts cross the boundary here and they are deliberately
//! not unified:
//!
//! - the 74-byte **kernel record** exchanged with the SMC through
//!   `IOConnectCallStructMethod`, where key and type tags are packed
//!   big-endian text and every multibyte integer is native-endian;
//! - the 46-byte **simple value record**, a host-side snapshot of one
//!   reading whose key and type fields are 5 bytes each to leave room for a
//!   NUL terminator.
//!
//! Rather than transmuting a `#[repr(C)]` struct, each field is placed at a
//! named offset, so the layout is visible and pinned down by golden-byte
//! tests.

use super::{KeyInfo, SmcKey, SmcReading, TypeTag, SMC_BYTES_LEN};

/// Size of the kernel request/response record.
pub const KERNEL_RECORD_LEN: usize = 74;

/// Size of the host-side simple value record.
pub const READING_RECORD_LEN: usize = 46;

/// Field offsets within the two records.
pub mod offsets {
    // Kernel record.
    pub const KEY: usize = 0;
    pub const VERSION: usize = 4;
    pub const VERSION_RELEASE: usize = 8;
    pub const PLIMIT_VERSION: usize = 10;
    pub const PLIMIT_LENGTH: usize = 12;
    pub const PLIMIT_CPU: usize = 14;
    pub const PLIMIT_GPU: usize = 18;
    pub const PLIMIT_MEM: usize = 22;
    pub const KEY_INFO_SIZE: usize = 26;
    pub const KEY_INFO_TYPE: usize = 30;
    pub const KEY_INFO_ATTRIBUTES: usize = 34;
    pub const RESULT: usize = 35;
    pub const STATUS: usize = 36;
    pub const COMMAND: usize = 37;
    pub const DATA32: usize = 38;
    pub const BYTES: usize = 42;

    // Simple value record.
    pub const READING_KEY: usize = 0;
    pub const READING_SIZE: usize = 5;
    pub const READING_TYPE: usize = 9;
    pub const READING_BYTES: usize = 14;
}

/// SMC firmware version block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionInfo {
    pub major: u8,
    pub minor: u8,
    pub build: u8,
    pub reserved: u8,
    pub release: u16,
}

/// Power-limit block carried in every record; zero for plain reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerLimit {
    pub version: u16,
    pub length: u16,
    pub cpu: u32,
    pub gpu: u32,
    pub mem: u32,
}

/// The full SMC request/response record.
///
/// The same shape travels both ways: a request fills `key`, `command` and
/// (for value reads) `key_info`; a response adds `result`, the resolved
/// `key_info` and the payload `bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KernelRecord {
    pub key: SmcKey,
    pub version: VersionInfo,
    pub power_limit: PowerLimit,
    pub key_info: KeyInfo,
    pub result: u8,
    pub status: u8,
    /// The `data8` byte; carries the SMC command for reads.
    pub command: u8,
    pub data32: u32,
    pub bytes: [u8; SMC_BYTES_LEN],
}

impl KernelRecord {
    /// Serializes into the wire form handed to the kernel.
    pub fn pack(&self) -> [u8; KERNEL_RECORD_LEN] {
        let mut buf = [0u8; KERNEL_RECORD_LEN];
        buf[offsets::KEY..offsets::KEY + 4].copy_from_slice(&self.key.to_bytes());
        buf[offsets::VERSION] = self.version.major;
        buf[offsets::VERSION + 1] = self.version.minor;
        buf[offsets::VERSION + 2] = self.version.build;
        buf[offsets::VERSION + 3] = self.version.reserved;
        put_u16(&mut buf, offsets::VERSION_RELEASE, self.version.release);
        put_u16(&mut buf, offsets::PLIMIT_VERSION, self.power_limit.version);
        put_u16(&mut buf, offsets::PLIMIT_LENGTH, self.power_limit.length);
        put_u32(&mut buf, offsets::PLIMIT_CPU, self.power_limit.cpu);
        put_u32(&mut buf, offsets::PLIMIT_GPU, self.power_limit.gpu);
        put_u32(&mut buf, offsets::PLIMIT_MEM, self.power_limit.mem);
        put_u32(&mut buf, offsets::KEY_INFO_SIZE, self.key_info.data_size);
        buf[offsets::KEY_INFO_TYPE..offsets::KEY_INFO_TYPE + 4]
            .copy_from_slice(&self.key_info.data_type.to_bytes());
        buf[offsets::KEY_INFO_ATTRIBUTES] = self.key_info.attributes;
        buf[offsets::RESULT] = self.result;
        buf[offsets::STATUS] = self.status;
        buf[offsets::COMMAND] = self.command;
        put_u32(&mut buf, offsets::DATA32, self.data32);
        buf[offsets::BYTES..].copy_from_slice(&self.bytes);
        buf
    }

    /// Deserializes a record the kernel wrote back.
    pub fn unpack(buf: &[u8; KERNEL_RECORD_LEN]) -> Self {
        let mut bytes = [0u8; SMC_BYTES_LEN];
        bytes.copy_from_slice(&buf[offsets::BYTES..]);
        Self {
            key: SmcKey::from_bytes(tag4(buf, offsets::KEY)),
            version: VersionInfo {
                major: buf[offsets::VERSION],
                minor: buf[offsets::VERSION + 1],
                build: buf[offsets::VERSION + 2],
                reserved: buf[offsets::VERSION + 3],
                release: get_u16(buf, offsets::VERSION_RELEASE),
            },
            power_limit: PowerLimit {
                version: get_u16(buf, offsets::PLIMIT_VERSION),
                length: get_u16(buf, offsets::PLIMIT_LENGTH),
                cpu: get_u32(buf, offsets::PLIMIT_CPU),
                gpu: get_u32(buf, offsets::PLIMIT_GPU),
                mem: get_u32(buf, offsets::PLIMIT_MEM),
            },
            key_info: KeyInfo {
                data_size: get_u32(buf, offsets::KEY_INFO_SIZE),
                data_type: TypeTag::from_bytes(tag4(buf, offsets::KEY_INFO_TYPE)),
                attributes: buf[offsets::KEY_INFO_ATTRIBUTES],
            },
            result: buf[offsets::RESULT],
            status: buf[offsets::STATUS],
            command: buf[offsets::COMMAND],
            data32: get_u32(buf, offsets::DATA32),
            bytes,
        }
    }
}

impl SmcReading {
    /// Serializes into the host-side simple value record. Unlike the kernel
    /// record, the key and type fields here are 5 bytes with a trailing NUL.
    pub fn to_record(&self) -> [u8; READING_RECORD_LEN] {
        let mut buf = [0u8; READING_RECORD_LEN];
        buf[offsets::READING_KEY..offsets::READING_KEY + 4]
            .copy_from_slice(&self.key.to_bytes());
        put_u32(&mut buf, offsets::READING_SIZE, self.data_size);
        buf[offsets::READING_TYPE..offsets::READING_TYPE + 4]
            .copy_from_slice(&self.data_type.to_bytes());
        buf[offsets::READING_BYTES..].copy_from_slice(&self.bytes);
        buf
    }

    pub fn from_record(buf: &[u8; READING_RECORD_LEN]) -> Self {
        let mut bytes = [0u8; SMC_BYTES_LEN];
        bytes.copy_from_slice(&buf[offsets::READING_BYTES..]);
        Self {
            key: SmcKey::from_bytes(tag4(buf, offsets::READING_KEY)),
            data_size: get_u32(buf, offsets::READING_SIZE),
            data_type: TypeTag::from_bytes(tag4(buf, offsets::READING_TYPE)),
            bytes,
        }
    }
}

// Struct-layer integers stay in native byte order; only the four-character
// tags are big-endian text.

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_ne_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

fn get_u16(buf: &[u8], offset: usize) -> u16 {
    let mut raw = [0u8; 2];
    raw.copy_from_slice(&buf[offset..offset + 2]);
    u16::from_ne_bytes(raw)
}

fn get_u32(buf: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_ne_bytes(raw)
}

fn tag4(buf: &[u8], offset: usize) -> [u8; 4] {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smc::{keys, SMC_CMD_READ_KEYINFO};

    #[test]
    fn kernel_record_fields_land_at_documented_offsets() {
        let record = KernelRecord {
            key: keys::CPU_TEMP,
            version: VersionInfo {
                major: 2,
                minor: 3,
                build: 15,
                reserved: 0,
                release: 0x0102,
            },
            power_limit: PowerLimit {
                version: 1,
                length: 16,
                cpu: 0x11111111,
                gpu: 0x22222222,
                mem: 0x33333333,
            },
            key_info: KeyInfo {
                data_size: 2,
                data_type: TypeTag::SP78,
                attributes: 0x07,
            },
            result: 0x84,
            status: 1,
            command: SMC_CMD_READ_KEYINFO,
            data32: 0xDEAD_BEEF,
            bytes: {
                let mut b = [0u8; SMC_BYTES_LEN];
                b[0] = 0xAA;
                b[SMC_BYTES_LEN - 1] = 0xBB;
                b
            },
        };

        let buf = record.pack();
        assert_eq!(buf.len(), KERNEL_RECORD_LEN);
        assert_eq!(&buf[offsets::KEY..offsets::KEY + 4], b"TC0P");
        assert_eq!(buf[offsets::VERSION], 2);
        assert_eq!(
            buf[offsets::VERSION_RELEASE..offsets::VERSION_RELEASE + 2],
            0x0102u16.to_ne_bytes()
        );
        assert_eq!(
            buf[offsets::KEY_INFO_SIZE..offsets::KEY_INFO_SIZE + 4],
            2u32.to_ne_bytes()
        );
        assert_eq!(&buf[offsets::KEY_INFO_TYPE..offsets::KEY_INFO_TYPE + 4], b"sp78");
        assert_eq!(buf[offsets::KEY_INFO_ATTRIBUTES], 0x07);
        assert_eq!(buf[offsets::RESULT], 0x84);
        assert_eq!(buf[offsets::STATUS], 1);
        assert_eq!(buf[offsets::COMMAND], SMC_CMD_READ_KEYINFO);
        assert_eq!(
            buf[offsets::DATA32..offsets::DATA32 + 4],
            0xDEAD_BEEFu32.to_ne_bytes()
        );
        assert_eq!(buf[offsets::BYTES], 0xAA);
        assert_eq!(buf[KERNEL_RECORD_LEN - 1], 0xBB);
    }

    #[test]
    fn kernel_record_round_trips() {
        let record = KernelRecord {
            key: keys::FAN_COUNT,
            key_info: KeyInfo {
                data_size: 1,
                data_type: TypeTag::UI8,
                attributes: 0,
            },
            command: SMC_CMD_READ_KEYINFO,
            ..KernelRecord::default()
        };
        assert_eq!(KernelRecord::unpack(&record.pack()), record);
    }

    #[test]
    fn default_kernel_record_packs_to_zeroes() {
        assert_eq!(KernelRecord::default().pack(), [0u8; KERNEL_RECORD_LEN]);
    }

    #[test]
    fn reading_record_keeps_nul_terminated_text_fields() {
        let mut bytes = [0u8; SMC_BYTES_LEN];
        bytes[0] = 0x19;
        bytes[1] = 0x80;
        let reading = crate::smc::SmcReading {
            key: keys::CPU_TEMP,
            data_size: 2,
            data_type: TypeTag::SP78,
            bytes,
        };

        let buf = reading.to_record();
        assert_eq!(buf.len(), READING_RECORD_LEN);
        assert_eq!(&buf[offsets::READING_KEY..offsets::READING_KEY + 4], b"TC0P");
        assert_eq!(buf[offsets::READING_KEY + 4], 0);
        assert_eq!(
            buf[offsets::READING_SIZE..offsets::READING_SIZE + 4],
            2u32.to_ne_bytes()
        );
        assert_eq!(&buf[offsets::READING_TYPE..offsets::READING_TYPE + 4], b"sp78");
        assert_eq!(buf[offsets::READING_TYPE + 4], 0);
        assert_eq!(buf[offsets::READING_BYTES], 0x19);

        assert_eq!(crate::smc::SmcReading::from_record(&buf), reading);
    }
}
