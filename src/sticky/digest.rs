//! Peer identity digests.
//!
//! Each peer of a sticky upstream gets a string identity computed once from
//! its address; the routing cookie carries that string. Hash and HMAC
//! identities digest the binary address (IP octets followed by the port in
//! network byte order), text identities use the `ip:port` form.

use crate::config::{DigestAlgorithm, Identity};
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::{Digest, Sha1};
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

type HmacMd5 = Hmac<Md5>;
type HmacSha1 = Hmac<Sha1>;

/// Errors computing a peer digest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    #[error("invalid HMAC key")]
    InvalidKey,
}

fn address_bytes(address: &SocketAddr) -> Vec<u8> {
    let mut bytes = match address.ip() {
        IpAddr::V4(ip) => ip.octets().to_vec(),
        IpAddr::V6(ip) => ip.octets().to_vec(),
    };
    bytes.extend_from_slice(&address.port().to_be_bytes());
    bytes
}

fn hex_digest(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    match algorithm {
        DigestAlgorithm::Md5 => hex::encode(Md5::digest(data)),
        DigestAlgorithm::Sha1 => hex::encode(Sha1::digest(data)),
    }
}

fn hex_hmac(algorithm: DigestAlgorithm, key: &[u8], data: &[u8]) -> Result<String, DigestError> {
    let bytes = match algorithm {
        DigestAlgorithm::Md5 => {
            let mut mac = HmacMd5::new_from_slice(key).map_err(|_| DigestError::InvalidKey)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        DigestAlgorithm::Sha1 => {
            let mut mac = HmacSha1::new_from_slice(key).map_err(|_| DigestError::InvalidKey)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(hex::encode(bytes))
}

impl Identity {
    /// Cookie identity of a peer, or `None` in index mode.
    pub fn digest(&self, address: &SocketAddr) -> Result<Option<String>, DigestError> {
        let digest = match self {
            Identity::Index => return Ok(None),
            Identity::Hash(algorithm) => hex_digest(*algorithm, &address_bytes(address)),
            Identity::Text(None) => address.to_string(),
            Identity::Text(Some(algorithm)) => hex_digest(*algorithm, address.to_string().as_bytes()),
            Identity::Hmac { algorithm, key } => {
                hex_hmac(*algorithm, key.as_bytes(), &address_bytes(address))?
            }
        };
        Ok(Some(digest))
    }
}

/// Index-aligned peer identities of one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestTable {
    entries: Vec<String>,
}

impl DigestTable {
    /// Compute the identity of every peer.
    ///
    /// Returns `None` in index mode, where no table is needed.
    pub fn build(identity: &Identity, addresses: &[SocketAddr]) -> Result<Option<Self>, DigestError> {
        if !identity.uses_digest() {
            return Ok(None);
        }

        let mut entries = Vec::with_capacity(addresses.len());
        for address in addresses {
            entries.push(identity.digest(address)?.unwrap_or_default());
        }

        Ok(Some(Self { entries }))
    }

    /// Identity of peer `index`.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    /// Index of the first peer whose identity equals `value` byte for byte.
    pub fn find(&self, value: &str) -> Option<usize> {
        if value.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .position(|entry| entry.len() == value.len() && entry.as_bytes() == value.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}
