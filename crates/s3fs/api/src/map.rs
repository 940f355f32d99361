//! Conversions between typed records and the flat `string -> string` maps
//! Kubernetes uses for annotations, storage class parameters and FlexVolume
//! options.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub type StringMap = BTreeMap<String, String>;

pub fn from_string_map<T>(map: &StringMap) -> Result<T>
where
    T: DeserializeOwned,
{
    let value = ::serde_json::to_value(map)?;
    ::serde_json::from_value(value).map_err(|error| anyhow!("cannot unmarshal {map:?}: {error}"))
}

pub fn to_string_map<T>(value: &T) -> Result<StringMap>
where
    T: ?Sized + Serialize,
{
    match ::serde_json::to_value(value)? {
        Value::Object(object) => object
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(value) => Ok((key, value)),
                value => bail!("cannot convert value to string ({key}): {value}"),
            })
            .collect(),
        value => bail!("cannot marshal non-object value to map: {value}"),
    }
}

/// Serializes a `Display` value as a string, mirroring how FlexVolume options
/// carry numbers and booleans.
pub mod as_string {
    use std::{fmt, str::FromStr};

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: fmt::Display,
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        <T as FromStr>::Err: fmt::Display,
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }

    pub mod option {
        use std::{fmt, str::FromStr};

        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
        where
            T: fmt::Display,
            S: Serializer,
        {
            match value {
                Some(value) => serializer.collect_str(value),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
        where
            T: FromStr,
            <T as FromStr>::Err: fmt::Display,
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|value| value.parse().map_err(de::Error::custom))
                .transpose()
        }
    }
}
