//! Node metadata codec.
//!
//! The service describes every node with a fixed-size big-endian record:
//!
//! ```text
//! czxid:i64 mzxid:i64 ctime:i64 mtime:i64
//! version:i32 cversion:i32 aversion:i32
//! ephemeralOwner:i64 dataLength:i32 numChildren:i32 pzxid:i64
//! ```

use crate::error::DecodeError;
use chrono::{DateTime, Local, Utc};

/// Byte length of an encoded stat record.
pub const STAT_LEN: usize = 68;

/// Undecoded metadata as handed over by the client library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStat(pub Vec<u8>);

impl RawStat {
    /// The undecoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Decoded metadata snapshot for one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    /// Transaction id that created the node.
    pub czxid: i64,
    /// Transaction id of the last data change.
    pub mzxid: i64,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at_millis: i64,
    /// Last modification time, milliseconds since the Unix epoch.
    pub modified_at_millis: i64,
    /// Data version.
    pub version: i32,
    /// Children version.
    pub child_version: i32,
    /// ACL version.
    pub acl_version: i32,
    /// Session id owning an ephemeral node, zero for persistent nodes.
    pub ephemeral_owner_id: i64,
    /// Payload length in bytes.
    pub data_length: i32,
    /// Number of direct children.
    pub num_children: i32,
    /// Transaction id of the last child change.
    pub pzxid: i64,
}

impl Stat {
    /// Decode a raw record. `None` means the service sent no metadata.
    pub fn decode(raw: Option<&RawStat>) -> Result<Self, DecodeError> {
        let bytes = raw.ok_or(DecodeError::Missing)?.as_bytes();
        if bytes.len() < STAT_LEN {
            return Err(DecodeError::Truncated {
                expected: STAT_LEN,
                actual: bytes.len(),
            });
        }

        let mut reader = Reader { bytes, pos: 0 };
        Ok(Self {
            czxid: reader.i64(),
            mzxid: reader.i64(),
            created_at_millis: reader.i64(),
            modified_at_millis: reader.i64(),
            version: reader.i32(),
            child_version: reader.i32(),
            acl_version: reader.i32(),
            ephemeral_owner_id: reader.i64(),
            data_length: reader.i32(),
            num_children: reader.i32(),
            pzxid: reader.i64(),
        })
    }

    /// Encode into the wire layout accepted by [`Stat::decode`].
    pub fn encode(&self) -> RawStat {
        let mut out = Vec::with_capacity(STAT_LEN);
        out.extend_from_slice(&self.czxid.to_be_bytes());
        out.extend_from_slice(&self.mzxid.to_be_bytes());
        out.extend_from_slice(&self.created_at_millis.to_be_bytes());
        out.extend_from_slice(&self.modified_at_millis.to_be_bytes());
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.child_version.to_be_bytes());
        out.extend_from_slice(&self.acl_version.to_be_bytes());
        out.extend_from_slice(&self.ephemeral_owner_id.to_be_bytes());
        out.extend_from_slice(&self.data_length.to_be_bytes());
        out.extend_from_slice(&self.num_children.to_be_bytes());
        out.extend_from_slice(&self.pzxid.to_be_bytes());
        RawStat(out)
    }

    /// Whether a session owns this node.
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral_owner_id != 0
    }

    /// Creation time as `YYYY/MM/DD HH:mm:ss` in local time.
    pub fn created_display(&self) -> String {
        format_millis(self.created_at_millis)
    }

    /// Modification time as `YYYY/MM/DD HH:mm:ss` in local time.
    pub fn modified_display(&self) -> String {
        format_millis(self.modified_at_millis)
    }
}

fn format_millis(millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(utc) => utc
            .with_timezone(&Local)
            .format("%Y/%m/%d %H:%M:%S")
            .to_string(),
        None => millis.to_string(),
    }
}

/// Cursor over a buffer whose length was checked up front.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        buf
    }

    fn i64(&mut self) -> i64 {
        i64::from_be_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_be_bytes(self.take())
    }
}
