//! Test service and end-to-end scenarios for chanargs.
//!
//! - [`service`]: `grpc.testing.TestService` and [`start_test_server`](service::start_test_server)
//! - [`socket`]: OS-level probe of a listener's `SO_REUSEPORT` setting
//! - [`cases`]: scenarios run by the `chanargs-test` binary and by `tests/`

#[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
pub mod cases;
pub mod messages;
pub mod service;
#[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
pub mod socket;
