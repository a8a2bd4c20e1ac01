//! Provable data possession algorithms.
//!
//! A file is protected by exactly one algorithm chosen at write time. The
//! public side of that choice is stored on the file record as [`PdpParams`];
//! every setup/challenge/answer/verify site matches on it.

pub mod merkle;
pub mod pairing;

#[cfg(test)]
mod proptest;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Algorithm tag carried by files and challenges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    Pairing,
    Merkle,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algorithm::Pairing => write!(f, "Pairing"),
            Algorithm::Merkle => write!(f, "Merkle"),
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pairing" => Ok(Algorithm::Pairing),
            "merkle" => Ok(Algorithm::Merkle),
            other => Err(Error::config(format!("unknown pdp algorithm: {}", other))),
        }
    }
}

/// Public PDP parameters stored alongside a file record.
///
/// Merkle material never leaves the owner, so its variant carries nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm")]
pub enum PdpParams {
    Pairing {
        #[serde(with = "crate::crypto::hex_serde")]
        pubkey: Vec<u8>,
        #[serde(with = "crate::crypto::hex_serde")]
        rand_u: Vec<u8>,
        #[serde(with = "crate::crypto::hex_serde")]
        rand_v: Vec<u8>,
    },
    Merkle,
}

impl PdpParams {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            PdpParams::Pairing { .. } => Algorithm::Pairing,
            PdpParams::Merkle => Algorithm::Merkle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("Pairing".parse::<Algorithm>().unwrap(), Algorithm::Pairing);
        assert_eq!("merkle".parse::<Algorithm>().unwrap(), Algorithm::Merkle);
        assert!("bn256".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_params_tagged_json() {
        let p = PdpParams::Pairing {
            pubkey: vec![1],
            rand_u: vec![2],
            rand_v: vec![3],
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["algorithm"], "Pairing");
        assert_eq!(json["rand_u"], "02");
        assert_eq!(
            serde_json::to_value(PdpParams::Merkle).unwrap()["algorithm"],
            "Merkle"
        );
        assert_eq!(p.algorithm(), Algorithm::Pairing);
    }
}
