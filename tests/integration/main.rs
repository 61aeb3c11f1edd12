//! Integration tests for the harvester
//!
//! These tests use wiremock to serve a small catalog and drive full harvest
//! runs through the real HTTP transport.

mod harvest_tests;
