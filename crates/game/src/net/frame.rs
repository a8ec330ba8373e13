use rkyv::util::AlignedVec;
use rkyv::{Archive, rancor};

pub const MAX_FRAME_SIZE: usize = 4096;
pub const FRAME_MAGIC: u32 = 0x424D_424C;
pub const FRAME_VERSION: u32 = 1;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub enum Channel {
    /// Resent until acknowledged and delivered in send order.
    Reliable,
    /// Best effort; anything older than the newest frame seen is dropped.
    Unreliable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct FrameHeader {
    pub magic: u32,
    pub version: u32,
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self {
            magic: FRAME_MAGIC,
            version: FRAME_VERSION,
        }
    }
}

impl FrameHeader {
    pub fn is_valid(&self) -> bool {
        self.magic == FRAME_MAGIC && self.version == FRAME_VERSION
    }
}

#[derive(Debug, Clone, PartialEq, Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub enum FrameBody {
    ConnectRequest,
    ConnectAccept {
        connection_id: u32,
    },
    ConnectReject {
        reason: String,
    },
    Data {
        channel: Channel,
        sequence: u32,
        payload: Vec<u8>,
    },
    Ack {
        sequence: u32,
    },
    Ping,
    Disconnect,
    Broadcast {
        key: u32,
        version: u32,
        subversion: u32,
        payload: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct Frame {
    pub header: FrameHeader,
    pub body: FrameBody,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("bad frame header (magic {magic:#x}, version {version})")]
    BadHeader { magic: u32, version: u32 },
    #[error("frame of {0} bytes exceeds the datagram limit")]
    TooLarge(usize),
}

impl Frame {
    pub fn new(body: FrameBody) -> Self {
        Self {
            header: FrameHeader::default(),
            body,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, FrameError> {
        let bytes = rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(FrameError::Serialize)?;
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, FrameError> {
        // Receive buffers carry no alignment guarantee.
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);

        let frame =
            rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(FrameError::Deserialize)?;
        if !frame.header.is_valid() {
            return Err(FrameError::BadHeader {
                magic: frame.header.magic,
                version: frame.header.version,
            });
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_frame_survives_serialization() {
        let frame = Frame::new(FrameBody::Data {
            channel: Channel::Reliable,
            sequence: 42,
            payload: vec![0, 3, 0, b'a', b'b', b'c'],
        });
        let bytes = frame.serialize().unwrap();
        assert_eq!(Frame::deserialize(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_unaligned_input_is_accepted() {
        let frame = Frame::new(FrameBody::Ack { sequence: 7 });
        let bytes = frame.serialize().unwrap();

        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&bytes);
        assert_eq!(Frame::deserialize(&shifted[1..]).unwrap(), frame);
    }

    #[test]
    fn test_wrong_magic_is_rejected() {
        let frame = Frame {
            header: FrameHeader {
                magic: 0xDEAD_BEEF,
                version: FRAME_VERSION,
            },
            body: FrameBody::Ping,
        };
        let bytes = frame.serialize().unwrap();
        assert!(matches!(
            Frame::deserialize(&bytes),
            Err(FrameError::BadHeader { magic: 0xDEAD_BEEF, .. })
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Frame::deserialize(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let frame = Frame::new(FrameBody::Data {
            channel: Channel::Unreliable,
            sequence: 0,
            payload: vec![0; MAX_FRAME_SIZE],
        });
        assert!(matches!(frame.serialize(), Err(FrameError::TooLarge(_))));
    }
}
