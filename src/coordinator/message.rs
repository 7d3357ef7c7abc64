//! Wire format shared by every protocol message
//!
//! ```text
//! ┌──────────┬──────────────────┬─────────────────┐
//! │ cmd (4)  │ sender id (16)   │ payload (0..)   │
//! └──────────┴──────────────────┴─────────────────┘
//! ```

use crate::common::Result;
use crate::coordinator::identity::{PeerId, ID_LEN};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::SocketAddr;

/// Length of the command tag
pub const TAG_LEN: usize = 4;

/// Fixed header: tag + sender identity
pub const HEADER_LEN: usize = TAG_LEN + ID_LEN;

/// Receive buffer size and default frame capacity
pub const DATAGRAM_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// `KNCK` discovery announcement
    Knock,
    /// `WLCM` discovery acknowledgment
    Welcome,
    /// `WANT` candidacy request for a key
    Want,
    /// `CAND` candidacy granted
    Candidate,
    /// `MINE` final ownership assertion
    Mine,
    /// `SAVD` ownership acknowledged
    Saved,
    /// `REGD` key already registered here
    Registered,
    /// `RSET` revoke every ownership of a key
    Reset,
    /// `CMPI` membership digest comparison request
    Compare,
    /// `CMPO` membership digest matched
    Compared,
    Unknown([u8; TAG_LEN]),
}

impl Command {
    pub fn tag(&self) -> [u8; TAG_LEN] {
        match self {
            Command::Knock => *b"KNCK",
            Command::Welcome => *b"WLCM",
            Command::Want => *b"WANT",
            Command::Candidate => *b"CAND",
            Command::Mine => *b"MINE",
            Command::Saved => *b"SAVD",
            Command::Registered => *b"REGD",
            Command::Reset => *b"RSET",
            Command::Compare => *b"CMPI",
            Command::Compared => *b"CMPO",
            Command::Unknown(tag) => *tag,
        }
    }

    pub fn from_tag(tag: [u8; TAG_LEN]) -> Self {
        match &tag {
            b"KNCK" => Command::Knock,
            b"WLCM" => Command::Welcome,
            b"WANT" => Command::Want,
            b"CAND" => Command::Candidate,
            b"MINE" => Command::Mine,
            b"SAVD" => Command::Saved,
            b"REGD" => Command::Registered,
            b"RSET" => Command::Reset,
            b"CMPI" => Command::Compare,
            b"CMPO" => Command::Compared,
            _ => Command::Unknown(tag),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.tag()))
    }
}

/// Build a frame
pub fn encode(command: Command, sender: &PeerId, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(DATAGRAM_SIZE.max(HEADER_LEN + payload.len()));
    buf.put_slice(&command.tag());
    buf.put_slice(sender.as_bytes());
    buf.put_slice(payload);
    buf.freeze()
}

/// Payload of `CAND` / `SAVD`: the claimant identity followed by the key
pub fn claim_payload(claimant: &PeerId, key: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(ID_LEN + key.len());
    buf.put_slice(claimant.as_bytes());
    buf.put_slice(key.as_bytes());
    buf.freeze()
}

/// A decoded datagram, borrowing the receive buffer
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    pub command: Command,
    pub sender: PeerId,
    pub payload: &'a [u8],
    pub addr: SocketAddr,
}

impl<'a> Message<'a> {
    pub fn decode(datagram: &'a [u8], addr: SocketAddr) -> Result<Self> {
        if datagram.len() < HEADER_LEN {
            return Err(crate::Error::MalformedMessage {
                len: datagram.len(),
            });
        }
        let (header, payload) = datagram.split_at(HEADER_LEN);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&header[..TAG_LEN]);
        let sender = PeerId::from_slice(&header[TAG_LEN..]).ok_or(
            crate::Error::MalformedMessage {
                len: datagram.len(),
            },
        )?;
        Ok(Self {
            command: Command::from_tag(tag),
            sender,
            payload,
            addr,
        })
    }

    /// Payload read as a key
    pub fn key(&self) -> String {
        String::from_utf8_lossy(self.payload).into_owned()
    }
}
