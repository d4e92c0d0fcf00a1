//! End-to-end fitting scenarios.

mod scenarios;
