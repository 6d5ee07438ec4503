//! Scenario-based tests for ci-runner
//!
//! Every scenario runs the real engine against a `MockRunner`, so no
//! database, network or test suite is needed.


mod abort_handling;
mod config_validation;
mod fetch_failure;
mod idempotence;
mod status_forwarding;
mod success_chain;
mod teardown_order;
