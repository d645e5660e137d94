use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};

// Backend ids are opaque; some deployments emit numbers, others strings. Both compare as text
// and are written back in the form they arrived in.
macro_rules! define_backend_id {
    ($name:ident) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            raw: String,
            number: Option<Number>,
        }

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self {
                    raw: raw.into(),
                    number: None,
                }
            }

            pub fn as_str(&self) -> &str {
                &self.raw
            }

            /// True when the backend sent this id as a JSON number.
            pub fn is_numeric(&self) -> bool {
                self.number.is_some()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.raw == other.raw
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.raw.hash(state);
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.raw.cmp(&other.raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.raw)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                match &self.number {
                    Some(number) => number.serialize(serializer),
                    None => serializer.serialize_str(&self.raw),
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                match Value::deserialize(deserializer)? {
                    Value::String(raw) => Ok(Self::new(raw)),
                    Value::Number(number) => Ok(Self {
                        raw: number.to_string(),
                        number: Some(number),
                    }),
                    other => Err(serde::de::Error::custom(format!(
                        "expected string or number id, found {other}"
                    ))),
                }
            }
        }
    };
}

define_backend_id!(ChatId);
define_backend_id!(AssistantId);
