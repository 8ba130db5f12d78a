//! Integration tests for the cockpit application.
//!
//! These tests run a full session against local mocks:
//! - Market event stream (WebSocket)
//! - Control plane (HTTP)

pub mod common;
