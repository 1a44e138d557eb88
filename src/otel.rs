// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration
//!
//! Propagation of the trace context through message application properties.
//! Producers inject the current context before handing a message to the
//! client library; consumers extract it to parent their processing spans.

use crate::message::{Message, PropertyValue};
use opentelemetry::{
    global::{self, BoxedSpan, BoxedTracer},
    propagation::{Extractor, Injector},
    trace::{SpanKind, Tracer},
    Context,
};
use std::{borrow::Cow, collections::BTreeMap};

/// Writes trace context entries into message properties.
pub(crate) struct PropertyInjector<'a> {
    properties: &'a mut BTreeMap<String, PropertyValue>,
}

impl<'a> PropertyInjector<'a> {
    pub(crate) fn new(properties: &'a mut BTreeMap<String, PropertyValue>) -> Self {
        Self { properties }
    }
}

impl Injector for PropertyInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.properties
            .insert(key.to_lowercase(), PropertyValue::String(value));
    }
}

/// Reads trace context entries from message properties.
pub(crate) struct PropertyExtractor<'a> {
    properties: &'a BTreeMap<String, PropertyValue>,
}

impl<'a> PropertyExtractor<'a> {
    pub(crate) fn new(properties: &'a BTreeMap<String, PropertyValue>) -> Self {
        Self { properties }
    }
}

impl Extractor for PropertyExtractor<'_> {
    /// Only string properties can carry trace context.
    fn get(&self, key: &str) -> Option<&str> {
        match self.properties.get(key) {
            Some(PropertyValue::String(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    fn keys(&self) -> Vec<&str> {
        self.properties.keys().map(String::as_str).collect()
    }
}

/// Injects `ctx` into the properties of `message`.
pub(crate) fn inject(ctx: &Context, message: &mut Message) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut PropertyInjector::new(&mut message.properties))
    });
}

/// Extracts the trace context carried by `message`.
pub fn extract(message: &Message) -> Context {
    global::get_text_map_propagator(|propagator| {
        propagator.extract(&PropertyExtractor::new(&message.properties))
    })
}

/// Creates a consumer span for a received message, parented by the context
/// the producer propagated.
///
/// # Returns
/// A tuple containing the extracted context and the new span
pub fn new_span(message: &Message, tracer: &BoxedTracer, name: &str) -> (Context, BoxedSpan) {
    let ctx = extract(message);

    let span = tracer
        .span_builder(Cow::from(name.to_owned()))
        .with_kind(SpanKind::Consumer)
        .start_with_context(tracer, &ctx);

    (ctx, span)
}
