// Budev Core Library
// libudev-style device enumeration, classification and hotplug monitoring
// over a devd-style event broadcast host

pub mod context;
pub mod device;
pub mod enumerate;
pub mod list;
pub mod monitor;
pub mod probe;

mod classify;
mod devd;
mod filter;
mod util;

pub use context::{Udev, UdevBuilder};
pub use device::{Action, Device};
pub use enumerate::{Enumerator, ScanError};
pub use list::{Entry, EntryList};
pub use monitor::{Monitor, MonitorError};
pub use probe::{DeviceTree, InputCaps, InputProbe, KernConf, NullInputProbe, NullKernConf};

#[cfg(feature = "evdev")]
pub use probe::EvdevProbe;
#[cfg(target_os = "freebsd")]
pub use probe::SysctlConf;
