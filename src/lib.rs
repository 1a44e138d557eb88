// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

pub mod client;
pub mod connection;
pub mod connection_string;
pub mod context;
pub mod credential;
pub mod destination;
pub mod errors;
pub mod factory;
pub mod message;
pub mod otel;
pub mod reference;
pub mod session;
pub mod settings;
pub mod uri;
