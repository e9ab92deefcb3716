//! Text tokens exchanged between program leaders during setup.
//!
//! Tokens are fixed-width: each message fills a 33-byte buffer, NUL padded,
//! of which 32 bytes travel on the wire. Longer text is truncated.

use crate::channel::Channel;

use super::CouplingError;

/// Significant token bytes sent on the wire.
pub const TOKEN_LEN: usize = 32;

const TYPE_PREFIX: &str = "coupling:type:";
const START: &str = "coupling:start";

/// Byte position of the conservativity flag in a coupling type token.
const CONSERVATIVITY_FLAG: usize = 16;

/// A handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Coupling type announcement: `coupling:type:<b| ><v| ><1|0>`.
    CouplingType {
        surface: bool,
        volume: bool,
        conservativity: bool,
    },

    /// Ready to start time iterations: `coupling:start`.
    Start,

    /// Any other token, kept verbatim.
    Other(String),
}

impl Message {
    /// Text form of the message.
    ///
    /// ```
    /// use conjugate_coupling::coupling::handshake::Message;
    ///
    /// let message = Message::CouplingType {
    ///     surface: true,
    ///     volume: false,
    ///     conservativity: true,
    /// };
    /// assert_eq!(message.token(), "coupling:type:b 1");
    /// ```
    #[must_use]
    pub fn token(&self) -> String {
        match self {
            Self::CouplingType {
                surface,
                volume,
                conservativity,
            } => format!(
                "{TYPE_PREFIX}{}{}{}",
                if *surface { 'b' } else { ' ' },
                if *volume { 'v' } else { ' ' },
                if *conservativity { '1' } else { '0' },
            ),
            Self::Start => START.to_string(),
            Self::Other(text) => text.clone(),
        }
    }

    /// Fixed-width buffer form of the message.
    #[must_use]
    pub fn encode(&self) -> [u8; TOKEN_LEN + 1] {
        let mut buffer = [0u8; TOKEN_LEN + 1];
        let token = self.token();
        let len = token.len().min(TOKEN_LEN);
        buffer[..len].copy_from_slice(&token.as_bytes()[..len]);
        buffer
    }

    /// Parses a received buffer, reading up to the first NUL byte.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        let bytes = &bytes[..bytes.len().min(TOKEN_LEN)];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Self::parse(&String::from_utf8_lossy(&bytes[..end]))
    }

    fn parse(token: &str) -> Self {
        if token == START {
            return Self::Start;
        }

        let flags = token.strip_prefix(TYPE_PREFIX).map(str::as_bytes);
        if let Some(&[surface, volume, conservativity]) = flags {
            let flag = |byte: u8, set: u8, unset: u8| match byte {
                b if b == set => Some(true),
                b if b == unset => Some(false),
                _ => None,
            };
            if let (Some(surface), Some(volume), Some(conservativity)) = (
                flag(surface, b'b', b' '),
                flag(volume, b'v', b' '),
                flag(conservativity, b'1', b'0'),
            ) {
                return Self::CouplingType {
                    surface,
                    volume,
                    conservativity,
                };
            }
        }

        Self::Other(token.to_string())
    }
}

/// Checks a partner's coupling type against the local one.
///
/// Only this side decides on conservativity, so the partner's flag is
/// replaced with the local one before comparing.
///
/// # Errors
///
/// Returns [`CouplingError::Negotiation`] with both tokens if they differ.
pub fn check_compatible(local: &Message, remote: &Message) -> Result<(), CouplingError> {
    let expected = local.encode();
    let mut received = remote.encode();
    received[CONSERVATIVITY_FLAG] = expected[CONSERVATIVITY_FLAG];

    if received == expected {
        Ok(())
    } else {
        Err(CouplingError::Negotiation {
            local: local.token(),
            remote: remote.token(),
        })
    }
}

/// Sends a message through the local leader and returns the partner's reply.
///
/// Every local rank receives the same reply.
///
/// # Errors
///
/// Returns a [`CouplingError`] if a message fails.
pub(crate) fn exchange(channel: &Channel, message: &Message) -> Result<Message, CouplingError> {
    let buffer = message.encode();
    let reply = channel.exchange_with_partner(buffer[..TOKEN_LEN].to_vec())?;
    Ok(Message::decode(&reply))
}
