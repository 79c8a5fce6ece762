//! # FX stats
//!
//! The `fx-stats` crate implements the `ut_hodlong` peer extension which exchanges
//! a bounded, bencoded statistics blob between peers in 16 KiB pieces.
//! The extension is carried over an extensible peer connection protocol;
//! the host transport delivers handshake events and raw extension payloads to a
//! [stats::StatsExtension] and accepts outbound sends through the [stats::PeerChannel] boundary.
//!
//! Fetched results from multiple peer sessions are combined through a shared
//! [stats::StatsRegistry] which never overwrites a settled value.
pub mod stats;


/// Initialize the logger within a test.
#[cfg(test)]
#[macro_export]
macro_rules! init_logger {
    ($level:expr) => {
        $crate::testing::init_logger_level($level)
    };
    () => {
        $crate::testing::init_logger_level(log::LevelFilter::Trace)
    };
}

/// Receive a message from the given receiver, or panic if the timeout is reached.
#[cfg(test)]
#[macro_export]
macro_rules! recv_timeout {
    ($receiver:expr, $timeout:expr) => {
        $crate::testing::recv_timeout($receiver, $timeout, "expected to receive an instance").await
    };
    ($receiver:expr, $timeout:expr, $message:expr) => {
        $crate::testing::recv_timeout($receiver, $timeout, $message).await
    };
}
