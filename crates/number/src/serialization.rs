use {
    serde::{
        Deserializer,
        Serializer,
        de::{self, Visitor},
    },
    serde_with::{DeserializeAs, SerializeAs},
    std::fmt,
};

/// Serialize [`alloy::primitives::U256`] as a decimal string and deserialize
/// it from a decimal or a hex string prefixed with 0x.
///
/// Checkpoint documents and dataset columns carry large integers as decimal
/// strings to avoid precision loss in tooling that treats JSON numbers as
/// floats.
pub struct U256;

impl SerializeAs<alloy::primitives::U256> for U256 {
    fn serialize_as<S: Serializer>(
        source: &alloy::primitives::U256,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&source.to_string())
    }
}

impl<'de> DeserializeAs<'de, alloy::primitives::U256> for U256 {
    fn deserialize_as<D>(deserializer: D) -> Result<alloy::primitives::U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct U256Visitor;

        impl Visitor<'_> for U256Visitor {
            type Value = alloy::primitives::U256;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(
                    formatter,
                    "a u256 encoded either as 0x hex prefixed or decimal encoded string"
                )
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let s = s.trim();
                if let Some(hex) = s.strip_prefix("0x") {
                    alloy::primitives::U256::from_str_radix(hex, 16).map_err(|err| {
                        E::custom(format!("failed to decode {s:?} as hex u256: {err}"))
                    })
                } else {
                    alloy::primitives::U256::from_str_radix(s, 10).map_err(|err| {
                        E::custom(format!("failed to decode {s:?} as decimal u256: {err}"))
                    })
                }
            }
        }

        deserializer.deserialize_str(U256Visitor)
    }
}
