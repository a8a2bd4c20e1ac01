//! Serde adapters that encode binary fields as lowercase hex strings.
//!
//! Use with `#[serde(with = "crate::crypto::hex_serde")]` for `Vec<u8>` and
//! `#[serde(with = "crate::crypto::hex_serde::list")]` for `Vec<Vec<u8>>`.

use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
    let s = String::deserialize(d)?;
    hex::decode(&s).map_err(D::Error::custom)
}

pub mod list {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(
        items: &[Vec<u8>],
        s: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&hex::encode(item))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<Vec<Vec<u8>>, D::Error> {
        let raw = Vec::<String>::deserialize(d)?;
        raw.iter()
            .map(|s| hex::decode(s).map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        #[serde(with = "super")]
        one: Vec<u8>,
        #[serde(with = "super::list")]
        many: Vec<Vec<u8>>,
    }

    #[test]
    fn test_hex_fields() {
        let s = Sample {
            one: vec![0xde, 0xad],
            many: vec![vec![1], vec![0xff, 0]],
        };
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"one":"dead","many":["01","ff00"]}"#);
        assert_eq!(serde_json::from_str::<Sample>(&json).unwrap(), s);
    }

    #[test]
    fn test_bad_hex_rejected() {
        assert!(serde_json::from_str::<Sample>(r#"{"one":"zz","many":[]}"#).is_err());
    }
}
