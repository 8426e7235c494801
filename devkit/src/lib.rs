/*!
# Tracker DevKit - stubs and helpers for working on the kernel without hardware

- Scripted serial source standing in for the gateway
- Frame builders for the three payload generations
- Harness running the decode → snapshot pipeline in tests
*/

pub mod frame_builder;
pub mod serial_stub;
pub mod test_utils;

pub use frame_builder::{beacon_v1, beacon_v2, beacon_v3, FrameBuilder};
pub use serial_stub::ScriptedSource;
pub use test_utils::{RunningHarness, TestHarness};
