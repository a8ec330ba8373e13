//! Sequential binary codec for session packets.
//!
//! A packet is a kind tag followed by fields in a fixed order agreed on by
//! both peers. There is no schema on the wire, so the reader must issue the
//! same typed reads, in the same order, that the writer issued. Running off
//! the end of the buffer therefore means the two peers disagree about the
//! protocol and is reported as a [`CodecError`] for the caller to log.
//!
//! All integers and floats are little-endian. Strings carry a `u16` byte
//! length prefix followed by UTF-8. Colors are four bytes (RGBA).

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::protocol::PacketKind;

pub const MAX_STRING_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("read past end of packet: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },
    #[error("unknown packet kind {0}")]
    UnknownKind(u8),
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("string of {0} bytes exceeds the length prefix")]
    StringTooLong(usize),
    #[error("invalid field value: {0}")]
    InvalidValue(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color32 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color32 {
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const RED: Self = Self::rgb(255, 0, 0);
    pub const YELLOW: Self = Self::rgb(255, 235, 4);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// Write-only packet under construction.
#[derive(Debug, Clone)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new(kind: PacketKind) -> Self {
        Self::with_capacity(kind, 64)
    }

    pub fn with_capacity(kind: PacketKind, capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(capacity.max(1));
        buf.push(kind as u8);
        Self { buf }
    }

    pub fn write_byte(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn write_int(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_float(&mut self, value: f32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_string(&mut self, value: &str) -> Result<&mut Self, CodecError> {
        let bytes = value.as_bytes();
        if bytes.len() > MAX_STRING_LEN {
            return Err(CodecError::StringTooLong(bytes.len()));
        }
        self.buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
        self.buf.extend_from_slice(bytes);
        Ok(self)
    }

    pub fn write_color(&mut self, color: Color32) -> &mut Self {
        self.buf.extend_from_slice(&[color.r, color.g, color.b, color.a]);
        self
    }

    pub fn write_vector3(&mut self, value: Vec3) -> &mut Self {
        self.write_float(value.x)
            .write_float(value.y)
            .write_float(value.z)
    }

    pub fn write_bytes(&mut self, values: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(values);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Read-only view over a received packet. The cursor only moves forward.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], CodecError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(CodecError::UnexpectedEnd { needed, remaining });
        }
        let slice = &self.data[self.cursor..self.cursor + needed];
        self.cursor += needed;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_kind(&mut self) -> Result<PacketKind, CodecError> {
        let tag = self.read_byte()?;
        PacketKind::try_from(tag)
    }

    pub fn read_byte(&mut self) -> Result<u8, CodecError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_int(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_float(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = u16::from_le_bytes(self.take_array()?) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    pub fn read_color(&mut self) -> Result<Color32, CodecError> {
        let [r, g, b, a] = self.take_array()?;
        Ok(Color32 { r, g, b, a })
    }

    pub fn read_vector3(&mut self) -> Result<Vec3, CodecError> {
        let x = self.read_float()?;
        let y = self.read_float()?;
        let z = self.read_float()?;
        Ok(Vec3::new(x, y, z))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, CodecError> {
        Ok(self.take(len)?.to_vec())
    }

    /// Reads an `int` count and checks it is non-negative.
    pub fn read_count(&mut self) -> Result<usize, CodecError> {
        let count = self.read_int()?;
        usize::try_from(count).map_err(|_| CodecError::InvalidValue("negative count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_read_back_in_order() {
        let mut writer = PacketWriter::new(PacketKind::ChatMessage);
        writer
            .write_int(-7)
            .write_float(2.5)
            .write_color(Color32::rgb(1, 2, 3))
            .write_vector3(Vec3::new(1.0, -2.0, 3.5));
        writer.write_string("héllo").unwrap();
        let bytes = writer.finish();

        let mut reader = PacketReader::new(&bytes);
        assert_eq!(reader.read_kind().unwrap(), PacketKind::ChatMessage);
        assert_eq!(reader.read_int().unwrap(), -7);
        assert_eq!(reader.read_float().unwrap(), 2.5);
        assert_eq!(reader.read_color().unwrap(), Color32::rgb(1, 2, 3));
        assert_eq!(reader.read_vector3().unwrap(), Vec3::new(1.0, -2.0, 3.5));
        assert_eq!(reader.read_string().unwrap(), "héllo");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_kind_tag_leads_buffer() {
        let bytes = PacketWriter::new(PacketKind::PlayerLeft).finish();
        assert_eq!(bytes, vec![PacketKind::PlayerLeft as u8]);
    }

    #[test]
    fn test_empty_string() {
        let mut writer = PacketWriter::new(PacketKind::Message);
        writer.write_string("").unwrap();
        let bytes = writer.finish();
        assert_eq!(bytes.len(), 3);

        let mut reader = PacketReader::new(&bytes);
        reader.read_kind().unwrap();
        assert_eq!(reader.read_string().unwrap(), "");
    }

    #[test]
    fn test_read_past_end_is_error() {
        let mut writer = PacketWriter::new(PacketKind::Login);
        writer.write_byte(9);
        let bytes = writer.finish();

        let mut reader = PacketReader::new(&bytes);
        reader.read_kind().unwrap();
        assert_eq!(
            reader.read_int(),
            Err(CodecError::UnexpectedEnd {
                needed: 4,
                remaining: 1
            })
        );
    }

    #[test]
    fn test_truncated_string_body() {
        let bytes = [PacketKind::Login as u8, 10, 0, b'a', b'b'];
        let mut reader = PacketReader::new(&bytes);
        reader.read_kind().unwrap();
        assert!(matches!(
            reader.read_string(),
            Err(CodecError::UnexpectedEnd { needed: 10, .. })
        ));
    }

    #[test]
    fn test_unknown_kind() {
        let mut reader = PacketReader::new(&[200]);
        assert_eq!(reader.read_kind(), Err(CodecError::UnknownKind(200)));
    }

    #[test]
    fn test_negative_count_rejected() {
        let mut writer = PacketWriter::new(PacketKind::StateUpdate);
        writer.write_int(-1);
        let bytes = writer.finish();
        let mut reader = PacketReader::new(&bytes);
        reader.read_kind().unwrap();
        assert!(matches!(
            reader.read_count(),
            Err(CodecError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let bytes = [PacketKind::Message as u8, 2, 0, 0xff, 0xfe];
        let mut reader = PacketReader::new(&bytes);
        reader.read_kind().unwrap();
        assert_eq!(reader.read_string(), Err(CodecError::InvalidUtf8));
    }
}
