//! Gemeinsame Identifikationstypen fuer Voicelink
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen. Auf dem Draht
//! sind IDs 64-Bit Snowflakes, die das Relay mal als String und mal als
//! Zahl schickt. Serialisiert wird immer als String.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident, $praefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            /// Gibt den rohen Snowflake-Wert zurueck
            pub fn inner(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(wert: u64) -> Self {
                Self(wert)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($praefix, ":{}"), self.0)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(SnowflakeVisitor).map(Self)
            }
        }
    };
}

snowflake_id!(
    /// Eindeutige ID eines Gespraechsteilnehmers
    PeerId,
    "peer"
);
snowflake_id!(
    /// Eindeutige Server-ID (Gilde, fuer die die Voice-Verbindung gilt)
    ServerId,
    "server"
);
snowflake_id!(
    /// Eindeutige Kanal-ID
    ChannelId,
    "channel"
);

/// Akzeptiert Snowflakes als String oder als Zahl
struct SnowflakeVisitor;

impl<'de> Visitor<'de> for SnowflakeVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Snowflake als String oder Ganzzahl")
    }

    fn visit_u64<E: de::Error>(self, wert: u64) -> Result<u64, E> {
        Ok(wert)
    }

    fn visit_i64<E: de::Error>(self, wert: i64) -> Result<u64, E> {
        u64::try_from(wert).map_err(|_| E::custom(format!("negativer Snowflake: {wert}")))
    }

    fn visit_str<E: de::Error>(self, wert: &str) -> Result<u64, E> {
        wert.parse()
            .map_err(|_| E::custom(format!("ungueltiger Snowflake: '{wert}'")))
    }
}

/// Aufgeloester Gespraechsteilnehmer
///
/// Wird vom Host ueber den Peer-Resolver geliefert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub name: String,
}
