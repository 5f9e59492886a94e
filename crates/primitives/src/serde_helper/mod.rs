//! [serde] helpers for foreign types.

/// (De)serializes a [`cid::Cid`] through its canonical string form.
pub mod cid_as_string {
    use cid::Cid;
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serializes the cid with its `Display` impl.
    pub fn serialize<S: Serializer>(cid: &Cid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(cid)
    }

    /// Parses the cid from a string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Cid, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// (De)serializes an [`Address`](crate::Address) as `f0...` instead of its byte form.
pub mod address_as_string {
    use crate::Address;
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serializes the address with its `Display` impl.
    pub fn serialize<S: Serializer>(addr: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(addr)
    }

    /// Parses and validates the address.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// (De)serializes a map keyed by [`Address`](crate::Address) with string keys, as required by
/// JSON objects.
pub mod address_map {
    use crate::Address;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;

    /// Serializes the map with stringified keys.
    pub fn serialize<S, V>(map: &HashMap<Address, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        serializer.collect_map(map.iter().map(|(addr, value)| (addr.to_string(), value)))
    }

    /// Parses every key, failing on the first invalid address.
    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<HashMap<Address, V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        HashMap::<String, V>::deserialize(deserializer)?
            .into_iter()
            .map(|(addr, value)| Ok((addr.parse().map_err(de::Error::custom)?, value)))
            .collect()
    }
}
