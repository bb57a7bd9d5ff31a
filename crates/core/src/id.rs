//! Strongly-typed identifiers used across the engine.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier of an aggregate row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

/// Identifier of a stored event row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

/// Failure to parse an identifier from its string form.
#[derive(Debug, Error)]
#[error("invalid {kind}: {source}")]
pub struct ParseIdError {
    kind: &'static str,
    #[source]
    source: uuid::Error,
}

macro_rules! uuid_newtype {
    ($id:ty, $label:literal) => {
        impl $id {
            /// Fresh identifier from `Uuid::now_v7`.
            ///
            /// v7 identifiers are time-ordered, so storage keeps rows roughly
            /// in creation order. Tests that need determinism should build
            /// identifiers from fixed UUIDs instead.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl core::fmt::Display for $id {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $id {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$id> for Uuid {
            fn from(value: $id) -> Self {
                value.0
            }
        }

        impl FromStr for $id {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match Uuid::from_str(s) {
                    Ok(uuid) => Ok(Self(uuid)),
                    Err(source) => Err(ParseIdError {
                        kind: $label,
                        source,
                    }),
                }
            }
        }
    };
}

uuid_newtype!(AggregateId, "AggregateId");
uuid_newtype!(EventId, "EventId");
