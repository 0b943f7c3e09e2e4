//! Cross-module tests.
//!
//! `session_scenarios` drives whole sessions with in-process fakes;
//! `http_completion` runs the HTTP client against the mock completion server
//! on an ephemeral port.
