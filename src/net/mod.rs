pub mod port_waiter;

pub use port_waiter::{probe, PortWaiter, Target};
