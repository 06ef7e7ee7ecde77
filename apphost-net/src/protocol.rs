//! Node-to-node wire protocol: message types and version.

use apphost_core::Identity;
use serde::{Deserialize, Serialize};

/// Current protocol version. Carried in every query.
pub const PROTOCOL_VERSION: u8 = 1;

/// Identities travel as their 32 raw bytes on the wire; hex is for config and JSON.
mod identity_bytes {
    use apphost_core::Identity;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(id: &Identity, serializer: S) -> Result<S::Ok, S::Error> {
        id.as_bytes().as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Identity, D::Error> {
        let buf: Vec<u8> = Deserialize::deserialize(d)?;
        let bytes: [u8; 32] = buf
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 identity bytes"))?;
        Ok(Identity::from_bytes(bytes))
    }
}

/// All wire message types. Encoding is bincode; framing is length-prefix (see wire module).
/// A stream starts with exactly one `Query` from the caller and one reply from the node;
/// after an `Accept` the socket carries raw application bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Open a stream to the named service on the receiving node.
    Query {
        protocol_version: u8,
        #[serde(with = "identity_bytes")]
        caller: Identity,
        query: String,
    },
    /// Service found; the stream now belongs to its listener.
    Accept,
    /// No such service, or the query could not be honoured.
    Reject { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_is_encoded_as_raw_bytes() {
        let caller = Identity::from_bytes([0xab; 32]);
        let msg = Message::Query {
            protocol_version: PROTOCOL_VERSION,
            caller,
            query: String::new(),
        };
        let encoded = bincode::serialize(&msg).unwrap();
        // variant tag + version + (length prefix + 32 bytes) + empty string
        assert_eq!(encoded.len(), 4 + 1 + 8 + 32 + 8);
        assert!(encoded.windows(32).any(|w| w == caller.as_bytes()));
        assert_eq!(bincode::deserialize::<Message>(&encoded).unwrap(), msg);
    }

    #[test]
    fn short_caller_is_rejected() {
        let mut encoded = bincode::serialize(&Message::Query {
            protocol_version: PROTOCOL_VERSION,
            caller: Identity::from_bytes([1; 32]),
            query: String::new(),
        })
        .unwrap();
        // Shrink the caller's length prefix from 32 to 31.
        encoded[5] = 31;
        assert!(bincode::deserialize::<Message>(&encoded).is_err());
    }
}
