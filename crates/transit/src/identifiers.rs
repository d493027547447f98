//! Type-safe identifiers for tracked entities.
//!
//! All identifiers use Arc<str> so that a vehicle record, its filtering
//! decision and the route activity entry it feeds can share one allocation.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

macro_rules! impl_identifier {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialOrd, Ord)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(s: impl AsRef<str>) -> Self {
                Self(s.as_ref().into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.hash(state);
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        #[cfg(feature = "serde")]
        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok(Self::new(s))
            }
        }
    };
}

impl_identifier!(VehicleIdentifier);
impl_identifier!(StationIdentifier);
impl_identifier!(RouteIdentifier);
impl_identifier!(TripIdentifier);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_allocation() {
        let original = VehicleIdentifier::new("bus-12");
        let shared = original.clone();

        assert!(Arc::ptr_eq(&original.0, &shared.0));
        assert_eq!(original, shared);
        assert_eq!(original, VehicleIdentifier::from(String::from("bus-12")));
        assert_ne!(original, VehicleIdentifier::new("bus-13"));
    }

    #[test]
    fn test_identifier_lookup_by_str() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(RouteIdentifier::new("24"), 7);

        assert_eq!(map.get("24"), Some(&7));
        assert_eq!(map.get(&RouteIdentifier::new("24")), Some(&7));
    }

    #[test]
    fn test_blank_identifier_is_empty() {
        assert!(VehicleIdentifier::new("").is_empty());
        assert!(VehicleIdentifier::new("   ").is_empty());
        assert!(!VehicleIdentifier::new("bus-12").is_empty());
    }

    #[test]
    fn test_identifier_display() {
        let id = TripIdentifier::new("trip_1");
        assert_eq!(format!("{}", id), "trip_1");
    }
}
