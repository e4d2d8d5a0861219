//! Identifier types used throughout the modflow core.
//!
//! Generated identifiers are UUID v7 in simple (unhyphenated) form so they
//! sort by creation time. Identifiers supplied by callers are accepted as-is
//! as long as they are non-empty and free of `$` and whitespace, the
//! characters reserved by the `$<module>-$<field>` reference format.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

fn validate(raw: &str) -> crate::Result<()> {
    if raw.is_empty() || raw.contains('$') || raw.chars().any(char::is_whitespace) {
        return Err(Error::InvalidId(raw.to_string()));
    }
    Ok(())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new time-ordered identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7().simple().to_string())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid.simple().to_string())
            }

            /// Parses an identifier, rejecting empty strings and reserved characters.
            pub fn parse(s: &str) -> crate::Result<Self> {
                validate(s)?;
                Ok(Self(s.to_string()))
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                validate(&value)?;
                Ok(Self(value))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Identifier of a data type in the type catalog.
    DataTypeId
}

string_id! {
    /// Identifier of a tenant-defined module.
    ModuleId
}

string_id! {
    /// Identifier of a field. Unique within the whole registry, not just its module.
    FieldId
}

string_id! {
    /// Identifier of a module data record.
    RecordId
}
