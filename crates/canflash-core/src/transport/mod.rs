//! Transport layer module.

pub mod clock;
pub mod mock;
#[cfg(target_os = "linux")]
pub mod socket;
pub mod traits;

pub use clock::{Clock, SimClock, SystemClock};
pub use mock::MockTransport;
#[cfg(target_os = "linux")]
pub use socket::SocketCanTransport;
pub use traits::{CanTransport, TransportError};

/// Open the platform CAN backend for `interface`.
#[cfg(target_os = "linux")]
pub fn open(interface: &str) -> Result<Box<dyn CanTransport>, TransportError> {
    Ok(Box::new(SocketCanTransport::open(interface)?))
}

/// Open the platform CAN backend for `interface`.
#[cfg(not(target_os = "linux"))]
pub fn open(_interface: &str) -> Result<Box<dyn CanTransport>, TransportError> {
    Err(TransportError::Unsupported)
}

/// CAN network interfaces present on this host (`can0`, `vcan0`, ...).
pub fn list_interfaces() -> Vec<String> {
    list_interfaces_in(std::path::Path::new("/sys/class/net"))
}

fn list_interfaces_in(root: &std::path::Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with("can") || name.starts_with("vcan"))
        .collect();
    names.sort();
    names
}
