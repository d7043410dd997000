//! SMC sensor queries.
//!
//! The System Management Controller answers four-character keys (`TC0P`,
//! `FNum`, ...) over a structured kernel call. Reading one key is always a
//! two-step exchange on an open connection:
//!
//! 1. `read_key_info` (command 9) asks the SMC for the key's size, type tag
//!    and attributes;
//! 2. `read_value` (command 5) fetches the raw bytes, echoing back exactly
//!    the size and type the SMC reported in step 1.
//!
//! The SMC validates the echoed fields against its own records, so they are
//! never guessed locally. [`SmcReading::decode`] then interprets the bytes
//! according to the type tag.
//!
//! All OS access goes through the [`transport::SmcTransport`] trait, so the
//! protocol logic here runs (and is tested) on any host.

pub mod transport;
pub mod wire;

use std::fmt;
use std::str::FromStr;

use tracing::{instrument, trace};

use crate::error::{Error, Result};
use transport::{SmcConnection, SmcTransport, KERNEL_INDEX_SMC};
use wire::KernelRecord;

/// Fetch the raw bytes of a key (`data8` command byte).
pub const SMC_CMD_READ_BYTES: u8 = 5;
/// Fetch a key's size, type and attributes (`data8` command byte).
pub const SMC_CMD_READ_KEYINFO: u8 = 9;

/// SMC result byte for "key not found".
pub const SMC_RESULT_KEY_NOT_FOUND: u8 = 132;

const SMC_RESULT_OK: u8 = 0;

/// Largest value payload the SMC record carries.
pub const SMC_BYTES_LEN: usize = 32;

/// A four-character SMC key, e.g. `TC0P` or `FNum`.
///
/// On the wire the four ASCII characters are packed big-endian into a `u32`
/// with no NUL terminator; [`SmcKey::packed`] and [`SmcKey::from_packed`]
/// round-trip losslessly.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SmcKey([u8; 4]);

impl SmcKey {
    /// Builds a key from a 4-character ASCII string.
    pub fn new(text: &str) -> Result<Self> {
        let bytes: [u8; 4] = text
            .as_bytes()
            .try_into()
            .map_err(|_| Error::InvalidKey(text.to_string()))?;
        if !text.is_ascii() {
            return Err(Error::InvalidKey(text.to_string()));
        }
        Ok(Self(bytes))
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0
    }

    /// The big-endian packed form sent to the kernel.
    pub const fn packed(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Recovers a key from its packed form.
    pub const fn from_packed(raw: u32) -> Self {
        Self(raw.to_be_bytes())
    }

    /// Key for fan `index`'s actual speed, following the `F%dAc` template
    /// (zero-based, so fan 0 is `F0Ac`).
    pub fn fan_speed(index: u32) -> Result<Self> {
        Self::new(&format!("F{index}Ac"))
    }
}

impl FromStr for SmcKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for SmcKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for SmcKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SmcKey({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Well-known SMC keys.
pub mod keys {
    use super::SmcKey;

    /// Number of fans.
    pub const FAN_COUNT: SmcKey = SmcKey::from_bytes(*b"FNum");
    /// CPU proximity temperature, in °C.
    pub const CPU_TEMP: SmcKey = SmcKey::from_bytes(*b"TC0P");
    /// CPU core voltage, in V.
    pub const CPU_VOLTAGE: SmcKey = SmcKey::from_bytes(*b"VC0C");
}

/// A four-character SMC data type tag, e.g. `sp78` or `flt `.
///
/// Tags shorter than four characters are space-padded by the SMC itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeTag([u8; 4]);

impl TypeTag {
    /// Signed 7.8 fixed-point, 2 bytes. The common temperature type.
    pub const SP78: TypeTag = TypeTag(*b"sp78");
    /// 32-bit float in native byte order, 4 bytes.
    pub const FLT: TypeTag = TypeTag(*b"flt ");
    /// Unsigned integers, big-endian, 1/2/4 bytes.
    pub const UI8: TypeTag = TypeTag(*b"ui8 ");
    pub const UI16: TypeTag = TypeTag(*b"ui16");
    pub const UI32: TypeTag = TypeTag(*b"ui32");

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// What the SMC knows about a key: payload size in bytes (at most 32), the
/// type tag governing decoding, and an attribute bitfield.
///
/// Produced by [`SmcClient::read_key_info`] and passed unchanged to
/// [`SmcClient::read_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyInfo {
    pub data_size: u32,
    pub data_type: TypeTag,
    pub attributes: u8,
}

/// The raw outcome of reading one key: the key echoed back, the size and
/// type it was read with, and up to 32 payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmcReading {
    pub key: SmcKey,
    pub data_size: u32,
    pub data_type: TypeTag,
    pub bytes: [u8; SMC_BYTES_LEN],
}

impl SmcReading {
    /// The declared-size prefix of the payload.
    pub fn valid_bytes(&self) -> &[u8] {
        let len = (self.data_size as usize).min(SMC_BYTES_LEN);
        &self.bytes[..len]
    }

    /// Interprets the payload according to the type tag.
    ///
    /// `sp78` is a signed 7.8 fixed-point value: the first byte is the
    /// signed integer part, the second byte counts 1/256ths. The unsigned
    /// integer types are big-endian; `flt ` is a native-order `f32`.
    pub fn decode(&self) -> Result<f64> {
        fn need(data: &[u8], tag: TypeTag, n: usize) -> Result<&[u8]> {
            if data.len() < n {
                return Err(Error::truncated(tag, n, data.len()));
            }
            Ok(&data[..n])
        }

        let data = self.valid_bytes();
        let need = |n: usize| need(data, self.data_type, n);
        match self.data_type {
            TypeTag::SP78 => {
                let b = need(2)?;
                Ok(f64::from(b[0] as i8) + f64::from(b[1]) / 256.0)
            }
            TypeTag::UI8 => {
                let b = need(1)?;
                Ok(f64::from(b[0]))
            }
            TypeTag::UI16 => {
                let b = need(2)?;
                Ok(f64::from(u16::from_be_bytes([b[0], b[1]])))
            }
            TypeTag::UI32 => {
                let b = need(4)?;
                Ok(f64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])))
            }
            TypeTag::FLT => {
                let b = need(4)?;
                Ok(f64::from(f32::from_ne_bytes([b[0], b[1], b[2], b[3]])))
            }
            other => Err(Error::unsupported_type(other)),
        }
    }
}

/// Client for the SMC query protocol, generic over the transport that
/// carries the structured calls.
///
/// [`SmcClient::new`] talks to the real AppleSMC service; tests inject a
/// mock or scripted transport through [`SmcClient::with_transport`].
pub struct SmcClient {
    transport: Box<dyn SmcTransport>,
}

impl SmcClient {
    /// Client backed by the AppleSMC kernel extension.
    #[cfg(target_os = "macos")]
    pub fn new() -> Self {
        Self::with_transport(Box::new(transport::SystemTransport))
    }

    pub fn with_transport(transport: Box<dyn SmcTransport>) -> Self {
        Self { transport }
    }

    /// Opens a connection to the SMC service.
    ///
    /// Every successful `open` must be paired with exactly one
    /// [`SmcClient::close`]; the connection's `Drop` releases the handle as
    /// a backstop but does not report close failures.
    pub fn open(&self) -> Result<SmcConnection> {
        self.transport.open()
    }

    /// Closes a connection obtained from [`SmcClient::open`].
    pub fn close(&self, connection: SmcConnection) -> Result<()> {
        self.transport.close(connection)
    }

    /// Asks the SMC for a key's size, type and attributes (command 9).
    pub fn read_key_info(&self, connection: &SmcConnection, key: SmcKey) -> Result<KeyInfo> {
        let request = KernelRecord {
            key,
            command: SMC_CMD_READ_KEYINFO,
            ..KernelRecord::default()
        };
        let response = self.transport.call(connection, KERNEL_INDEX_SMC, &request)?;
        if response.result != SMC_RESULT_OK {
            return Err(Error::unknown_key(key, response.result));
        }
        trace!(
            %key,
            data_size = response.key_info.data_size,
            data_type = %response.key_info.data_type,
            "key info"
        );
        Ok(response.key_info)
    }

    /// Fetches a key's raw bytes (command 5).
    ///
    /// The request carries `info`'s size and type verbatim; the SMC rejects
    /// reads whose declared size or type disagrees with what it reported,
    /// so these fields always come from [`SmcClient::read_key_info`].
    pub fn read_value(
        &self,
        connection: &SmcConnection,
        key: SmcKey,
        info: &KeyInfo,
    ) -> Result<SmcReading> {
        let request = KernelRecord {
            key,
            key_info: KeyInfo {
                data_size: info.data_size,
                data_type: info.data_type,
                attributes: 0,
            },
            command: SMC_CMD_READ_BYTES,
            ..KernelRecord::default()
        };
        let response = self.transport.call(connection, KERNEL_INDEX_SMC, &request)?;
        if response.result != SMC_RESULT_OK {
            return Err(Error::unknown_key(key, response.result));
        }
        let len = (info.data_size as usize).min(SMC_BYTES_LEN);
        let mut bytes = [0u8; SMC_BYTES_LEN];
        bytes[..len].copy_from_slice(&response.bytes[..len]);
        Ok(SmcReading {
            key,
            data_size: len as u32,
            data_type: info.data_type,
            bytes,
        })
    }

    /// Decodes a reading into a number. See [`SmcReading::decode`].
    pub fn decode(&self, reading: &SmcReading) -> Result<f64> {
        reading.decode()
    }

    /// Full two-step read of one key on an already open connection.
    pub fn read(&self, connection: &SmcConnection, key: SmcKey) -> Result<f64> {
        let info = self.read_key_info(connection, key)?;
        let reading = self.read_value(connection, key, &info)?;
        reading.decode()
    }

    /// Opens a connection, reads one key, and closes the connection again
    /// on every path, including decode failures.
    #[instrument(level = "debug", skip(self))]
    pub fn read_one(&self, key: SmcKey) -> Result<f64> {
        let connection = self.open()?;
        let value = self.read(&connection, key);
        let closed = self.close(connection);
        let value = value?;
        closed?;
        Ok(value)
    }

    /// CPU proximity temperature in °C (`TC0P`).
    pub fn cpu_temperature(&self) -> Result<f64> {
        self.read_one(keys::CPU_TEMP)
    }

    /// CPU core voltage in V (`VC0C`).
    pub fn cpu_voltage(&self) -> Result<f64> {
        self.read_one(keys::CPU_VOLTAGE)
    }

    /// Number of fans (`FNum`), on an open connection.
    pub fn fan_count(&self, connection: &SmcConnection) -> Result<u32> {
        Ok(self.read(connection, keys::FAN_COUNT)? as u32)
    }

    /// Actual speed of fan `index` in rpm, on an open connection.
    pub fn fan_speed(&self, connection: &SmcConnection, index: u32) -> Result<f64> {
        self.read(connection, SmcKey::fan_speed(index)?)
    }

    /// Actual speeds of all fans in index order, in rpm.
    #[instrument(level = "debug", skip(self))]
    pub fn fan_speeds(&self) -> Result<Vec<f64>> {
        let connection = self.open()?;
        let speeds = self.fan_speeds_on(&connection);
        let closed = self.close(connection);
        let speeds = speeds?;
        closed?;
        Ok(speeds)
    }

    fn fan_speeds_on(&self, connection: &SmcConnection) -> Result<Vec<f64>> {
        let count = self.fan_count(connection)?;
        let mut speeds = Vec::with_capacity(count as usize);
        for index in 0..count {
            speeds.push(self.fan_speed(connection, index)?);
        }
        Ok(speeds)
    }
}

#[cfg(target_os = "macos")]
impl Default for SmcClient {
    fn default() -> Self {
        Self::new()
    }
}
