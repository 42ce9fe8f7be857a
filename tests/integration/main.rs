// Integration test suite for the channel mirror.
//
// Every test drives the public HTTP surface against the in-process
// platform driver. Background work (poll passes, health sweeps, session
// rescans) is triggered through the ops routes so tests stay
// deterministic. All modules share the common::TestHarness for temp-dir
// lifecycle management.

mod common;

mod add_jobs;
mod auth;
mod login_flow;
mod sessions_api;
mod status_api;
