//! Host collectors reported next to the process data.
//!
//! - `netdev`: Network interface throughput from /proc/net/dev

pub mod netdev;

pub use netdev::{parse_netdev, InterfaceSpeed, NetDevCounters, NetworkSampler, NetworkUsage};
