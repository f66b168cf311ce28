//! Shared test utilities for registry client tests

#![allow(dead_code)]

pub mod mock_server;
