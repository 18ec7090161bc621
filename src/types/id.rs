// ABOUTME: Phantom-typed identifiers for provisioned cloud resources.
// ABOUTME: Prevents accidental swapping of security group, instance, and function handles.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Marker types for phantom type parameters.
/// Using empty enums prevents instantiation and requires no trait bounds.
pub enum SecurityGroupMarker {}
pub enum InstanceMarker {}
pub enum FunctionMarker {}

/// A provider-assigned identifier tagged with the kind of resource it names.
///
/// A `SecurityGroupId` cannot be passed where an `InstanceId` is expected,
/// which matters once handles end up in failure reports for manual cleanup.
#[must_use = "IDs reference billable resources and should not be ignored"]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

// Manual impls: T is only a marker and implements nothing.

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Id").field("value", &self.value).finish()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

pub type SecurityGroupId = Id<SecurityGroupMarker>;
pub type InstanceId = Id<InstanceMarker>;
pub type FunctionName = Id<FunctionMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_compare_by_value() {
        let a = SecurityGroupId::new("sg-0abc");
        let b = SecurityGroupId::new("sg-0abc".to_string());
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "sg-0abc");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = InstanceId::new("i-123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"i-123\"");
        let back: InstanceId = serde_json::from_str("\"i-123\"").unwrap();
        assert_eq!(back.as_str(), "i-123");
    }
}
