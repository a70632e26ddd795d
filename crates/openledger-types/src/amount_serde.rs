//! Serde adapters that encode [`Amount`] as a decimal string.
//!
//! Serde's internally tagged enums cannot buffer `u128`, so event payloads
//! carry amounts as strings.
//!
//! ```ignore
//! #[serde(with = "crate::amount_serde")]
//! value: Amount,
//! #[serde(with = "crate::amount_serde::many")]
//! amounts: Vec<Amount>,
//! ```

use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

use crate::Amount;

pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
    let text = String::deserialize(deserializer)?;
    text.parse().map_err(|_| D::Error::custom(format!("invalid amount: {text:?}")))
}

/// The same encoding for a list of amounts.
pub mod many {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    use crate::Amount;

    pub fn serialize<S: Serializer>(values: &[Amount], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(ToString::to_string))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Amount>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|text| {
                text.parse()
                    .map_err(|_| D::Error::custom(format!("invalid amount: {text:?}")))
            })
            .collect()
    }
}
