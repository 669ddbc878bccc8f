//! Strongly-typed identifiers used across the client.
//!
//! Both identifiers are issued by the remote service and are opaque to us.
//! They end up in URL paths, so construction rejects empty values and path
//! separators.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a server-tracked analysis job (e.g. `job_1a2b3c4d`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

/// Identifier of an uploaded dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetId(String);

fn check_opaque_id(raw: &str, name: &str) -> Result<(), DomainError> {
    if raw.trim().is_empty() {
        return Err(DomainError::invalid_id(format!("{name}: must not be empty")));
    }
    if raw.contains('/') || raw.contains('?') || raw.contains('#') {
        return Err(DomainError::invalid_id(format!(
            "{name}: '{raw}' contains a reserved URL character"
        )));
    }
    Ok(())
}

macro_rules! impl_string_newtype {
    ($t:ident, $name:literal) => {
        impl $t {
            /// Create an identifier, validating that it is usable as a path segment.
            pub fn new(raw: impl Into<String>) -> Result<Self, DomainError> {
                let raw = raw.into();
                check_opaque_id(&raw, $name)?;
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_newtype!(JobId, "JobId");
impl_string_newtype!(DatasetId, "DatasetId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_service_issued_ids() {
        let id = JobId::new("job_1a2b3c4d").unwrap();
        assert_eq!(id.as_str(), "job_1a2b3c4d");
        assert_eq!(id.to_string(), "job_1a2b3c4d");
    }

    #[test]
    fn rejects_empty_and_path_like_ids() {
        assert!(JobId::new("").is_err());
        assert!(JobId::new("   ").is_err());
        assert!(JobId::new("../etc").is_err());
        assert!(DatasetId::new("a?b").is_err());
    }

    #[test]
    fn serde_validates_on_the_way_in() {
        let id: JobId = serde_json::from_str("\"job_42\"").unwrap();
        assert_eq!(id.as_str(), "job_42");
        assert!(serde_json::from_str::<JobId>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"job_42\"");
    }
}
