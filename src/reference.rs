// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Directory References
//!
//! Objects that can be stored in a naming directory are encoded as a
//! [`Reference`]: the kind of the object plus a flat list of string
//! addresses. A [`ReferenceFactory`] decodes a reference back into an
//! instance by looking the kind up in a registry of constructors, each of
//! which validates the mandatory properties of its type.

use crate::{destination::{ServiceBusQueue, ServiceBusTopic}, errors::ServiceBusError};
use std::{any::Any, collections::{BTreeMap, HashMap}, fmt};
use tracing::{debug, error};

/// Name of the factory recorded in every reference produced by this crate
pub const REFERENCE_FACTORY_NAME: &str = "servicebus_jms::ReferenceFactory";

/// Decoded property bag: every value is present.
pub type Properties = BTreeMap<String, String>;

/// One string address of a reference. A missing content decodes as `""`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefAddr {
    pub addr_type: String,
    pub content: Option<String>,
}

impl RefAddr {
    /// Creates an address. `None` content is stored as an empty string when encoded.
    pub fn new(addr_type: impl Into<String>, content: Option<String>) -> Self {
        RefAddr {
            addr_type: addr_type.into(),
            content,
        }
    }
}

/// Encoded form of a storable object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    class_name: String,
    factory_name: String,
    addrs: Vec<RefAddr>,
}

impl Reference {
    /// Creates an empty reference for `class_name`, decoded by [`ReferenceFactory`].
    pub fn new(class_name: impl Into<String>) -> Self {
        Reference {
            class_name: class_name.into(),
            factory_name: REFERENCE_FACTORY_NAME.to_owned(),
            addrs: vec![],
        }
    }

    /// Appends an address. Earlier addresses of the same type are kept.
    pub fn add(&mut self, addr: RefAddr) {
        self.addrs.push(addr);
    }

    /// Kind of the stored object.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Name of the factory able to decode the reference.
    pub fn factory_name(&self) -> &str {
        &self.factory_name
    }

    /// Addresses in insertion order.
    pub fn addrs(&self) -> &[RefAddr] {
        &self.addrs
    }

    /// First address of type `addr_type`.
    pub fn get(&self, addr_type: &str) -> Option<&RefAddr> {
        self.addrs.iter().find(|a| a.addr_type == addr_type)
    }

    /// Reassembles the property bag, turning missing contents into `""`.
    pub fn properties(&self) -> Properties {
        self.addrs
            .iter()
            .map(|a| (a.addr_type.clone(), a.content.clone().unwrap_or_default()))
            .collect()
    }
}

/// Conversion of a boxed storable into `Any` for downcasting.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// An object that can be stored in a naming directory.
pub trait Storable: AsAny + Send + Sync {
    /// Name the object is registered under in a [`ReferenceFactory`].
    fn kind(&self) -> &'static str;

    /// Properties needed to rebuild the object. `None` values are encoded as `""`.
    fn properties(&self) -> BTreeMap<String, Option<String>>;

    fn reference(&self) -> Reference {
        let mut reference = Reference::new(self.kind());
        for (key, value) in self.properties() {
            reference.add(RefAddr::new(key, Some(value.unwrap_or_default())));
        }
        reference
    }
}

/// A storable that can be rebuilt from its properties alone.
pub trait Restorable: Storable + Sized {
    const KIND: &'static str;

    /// Rebuilds the object, failing on any missing mandatory property.
    fn from_properties(properties: &Properties) -> Result<Self, ServiceBusError>;
}

/// Case-insensitive lookup of a property.
pub fn find_property<'p>(properties: &'p Properties, name: &str) -> Option<&'p str> {
    properties
        .iter()
        .filter(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
        .last()
}

/// Returns a mandatory property, failing when it is absent or empty.
pub fn require_property(
    kind: &str,
    properties: &Properties,
    name: &str,
) -> Result<String, ServiceBusError> {
    match find_property(properties, name) {
        Some(value) if !value.is_empty() => Ok(value.to_owned()),
        _ => Err(ServiceBusError::RequiredProperty {
            kind: kind.to_owned(),
            property: name.to_owned(),
        }),
    }
}

type Constructor =
    Box<dyn Fn(&Properties) -> Result<Box<dyn Storable>, ServiceBusError> + Send + Sync>;

/// Registry-based decoder of references.
#[derive(Default)]
pub struct ReferenceFactory {
    constructors: HashMap<String, Constructor>,
}

impl fmt::Debug for ReferenceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.constructors.keys().collect();
        kinds.sort();
        f.debug_struct("ReferenceFactory")
            .field("kinds", &kinds)
            .finish()
    }
}

impl ReferenceFactory {
    /// Creates an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory that knows the destinations of this crate.
    pub fn with_defaults() -> Self {
        Self::new()
            .register::<ServiceBusQueue>()
            .register::<ServiceBusTopic>()
    }

    /// Registers a restorable type under its kind.
    pub fn register<T: Restorable + 'static>(self) -> Self {
        self.register_with(T::KIND, |properties| {
            T::from_properties(properties).map(|v| Box::new(v) as Box<dyn Storable>)
        })
    }

    /// Registers a constructor for `kind`, replacing any previous one.
    pub fn register_with<F>(mut self, kind: &str, constructor: F) -> Self
    where
        F: Fn(&Properties) -> Result<Box<dyn Storable>, ServiceBusError> + Send + Sync + 'static,
    {
        self.constructors
            .insert(kind.to_owned(), Box::new(constructor));
        self
    }

    /// Whether a constructor is registered for `kind`.
    pub fn is_registered(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Decodes `obj`, which must be a [`Reference`].
    pub fn get_object_instance(&self, obj: &dyn Any) -> Result<Box<dyn Storable>, ServiceBusError> {
        let Some(reference) = obj.downcast_ref::<Reference>() else {
            error!("object handed to the reference factory is not a reference");
            return Err(ServiceBusError::NotAReference);
        };

        self.decode(reference)
    }

    /// Decodes a reference into the instance registered for its kind.
    pub fn decode(&self, reference: &Reference) -> Result<Box<dyn Storable>, ServiceBusError> {
        let kind = reference.class_name();
        let Some(constructor) = self.constructors.get(kind) else {
            error!(kind = kind, "unknown storable kind");
            return Err(ServiceBusError::UnknownKind(kind.to_owned()));
        };

        debug!(kind = kind, "decoding reference");
        constructor(&reference.properties())
    }

    /// Decodes a reference into a concrete type.
    pub fn get_instance<T: Storable + 'static>(
        &self,
        reference: &Reference,
    ) -> Result<T, ServiceBusError> {
        self.decode(reference)?
            .into_any()
            .downcast::<T>()
            .map(|v| *v)
            .map_err(|_| ServiceBusError::KindMismatch(reference.class_name().to_owned()))
    }
}
