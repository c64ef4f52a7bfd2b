/// Serde helper functions for custom serialization/deserialization
use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Serialize Option<Duration> as Option<milliseconds>
pub mod optional_duration_millis {
    use super::*;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<u64>::deserialize(deserializer)?;
        Ok(opt.map(Duration::from_millis))
    }
}

/// Skip serializing if value is default (for use with skip_serializing_if)
pub fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    value == &T::default()
}
