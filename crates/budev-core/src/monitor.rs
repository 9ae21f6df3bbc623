// Budev Monitor
// Background devd client: reconnecting reader, filter, FIFO delivery queue

use std::collections::VecDeque;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::context::Udev;
use crate::devd;
use crate::device::Device;
use crate::filter::{FilterChain, FilterKind};
use crate::util::{pipe_cloexec, read_event_line};

/// Fixed delay before another connection attempt to the broadcast socket.
const RECONNECT_INTERVAL_MS: i32 = 1000;

/// Errors setting up a monitor.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("monitor is already receiving")]
    AlreadyEnabled,
}

/// Queue and wake channel shared between the worker and consumers.
///
/// The invariant maintained on every path: the number of unread bytes in
/// the wake pipe equals the number of devices in the queue.
struct Shared {
    queue: Mutex<VecDeque<Device>>,
    wake_tx: OwnedFd,
}

impl Shared {
    /// Construct and enqueue a device, waking one blocked consumer.
    ///
    /// Push and wake-byte write happen under a single mutex hold; when the
    /// write fails the entry is popped back off and dropped before the
    /// lock is released.
    fn send_device(&self, udev: &Udev, syspath: &str, action: crate::device::Action) {
        let device = Device::with_action(udev, syspath, action);
        let mut queue = self.queue.lock();
        queue.push_back(device);
        let wrote = unsafe {
            libc::write(
                self.wake_tx.as_raw_fd(),
                b"*".as_ptr() as *const libc::c_void,
                1,
            )
        };
        if wrote != 1 {
            log::warn!("wake channel write failed, dropping event for {syspath}");
            queue.pop_back();
        }
    }
}

/// Subscription to hotplug events.
///
/// A background worker keeps a connection to the host's event broadcast
/// socket, retrying every second for as long as the socket is unreachable;
/// outages are invisible to the consumer beyond the absence of events.
/// Matching events become [`Device`]s delivered strictly in production
/// order through [`Monitor::receive_device`]. The descriptor exposed via
/// [`AsRawFd`] polls readable exactly when a device is waiting.
pub struct Monitor {
    udev: Udev,
    filters: FilterChain,
    shared: Arc<Shared>,
    wake_rx: OwnedFd,
    shutdown_tx: Option<OwnedFd>,
    worker: Option<JoinHandle<()>>,
}

impl Monitor {
    pub fn new(udev: &Udev) -> Result<Self, MonitorError> {
        let (wake_rx, wake_tx) = pipe_cloexec()?;
        Ok(Self {
            udev: udev.clone(),
            filters: FilterChain::new(),
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                wake_tx,
            }),
            wake_rx,
            shutdown_tx: None,
            worker: None,
        })
    }

    pub fn udev(&self) -> &Udev {
        &self.udev
    }

    /// Only deliver events whose subsystem matches a glob pattern.
    ///
    /// Chain semantics apply: with no match rules installed at all the
    /// monitor delivers nothing, so at least one is required in practice.
    /// Rules must be added before [`Monitor::enable_receiving`].
    pub fn filter_add_match_subsystem(&mut self, subsystem: &str) {
        self.filters.add(FilterKind::Subsystem, false, subsystem);
    }

    /// Start the background worker. The filter chain is frozen into the
    /// worker at this point.
    pub fn enable_receiving(&mut self) -> Result<(), MonitorError> {
        if self.worker.is_some() {
            return Err(MonitorError::AlreadyEnabled);
        }
        let (shutdown_rx, shutdown_tx) = pipe_cloexec()?;
        let worker = Worker {
            udev: self.udev.clone(),
            filters: self.filters.clone(),
            shared: Arc::clone(&self.shared),
            shutdown_rx,
        };
        let handle = std::thread::Builder::new()
            .name("budev-monitor".to_string())
            .spawn(move || worker.run())
            .map_err(MonitorError::Io)?;
        self.shutdown_tx = Some(shutdown_tx);
        self.worker = Some(handle);
        Ok(())
    }

    /// Block until the next device arrives and return it.
    ///
    /// `None` when the wake-channel read fails or the queue is
    /// unexpectedly empty.
    pub fn receive_device(&self) -> Option<Device> {
        let mut byte = [0u8; 1];
        let read = unsafe {
            libc::read(
                self.wake_rx.as_raw_fd(),
                byte.as_mut_ptr() as *mut libc::c_void,
                1,
            )
        };
        if read < 1 {
            return None;
        }
        self.shared.queue.lock().pop_front()
    }
}

impl AsRawFd for Monitor {
    /// The wake channel's read end, for caller-side multiplexing.
    fn as_raw_fd(&self) -> RawFd {
        self.wake_rx.as_raw_fd()
    }
}

impl AsFd for Monitor {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.wake_rx.as_fd()
    }
}

impl Drop for Monitor {
    /// Synchronous teardown: signal the worker, wait for it to exit, then
    /// drop every still-queued device.
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            unsafe {
                libc::write(
                    shutdown_tx.as_raw_fd(),
                    b"!".as_ptr() as *const libc::c_void,
                    1,
                );
            }
            drop(shutdown_tx);
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.shared.queue.lock().clear();
    }
}

struct Worker {
    udev: Udev,
    filters: FilterChain,
    shared: Arc<Shared>,
    shutdown_rx: OwnedFd,
}

impl Worker {
    /// Worker loop: reconnect, multiplex, read, parse, filter, enqueue.
    ///
    /// States: disconnected (poll the shutdown end with the retry
    /// timeout), connected (poll shutdown end and socket with no timeout).
    /// Every transport failure returns to disconnected; only the shutdown
    /// signal or a poll failure ends the loop.
    fn run(self) {
        let socket_path = self.udev.devd_socket().to_path_buf();
        let dev_root = self.udev.dev_path().to_path_buf();
        let have_tree = self.udev.has_device_tree();
        let mut conn: Option<UnixStream> = None;

        loop {
            if conn.is_none() {
                conn = match UnixStream::connect(&socket_path) {
                    Ok(stream) => {
                        log::debug!("connected to {}", socket_path.display());
                        Some(stream)
                    }
                    Err(err) => {
                        log::debug!("connect to {} failed: {}", socket_path.display(), err);
                        None
                    }
                };
            }

            let mut fds = [
                libc::pollfd {
                    fd: self.shutdown_rx.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: conn.as_ref().map_or(-1, |c| c.as_raw_fd()),
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];
            let (nfds, timeout) = match conn {
                Some(_) => (2, -1),
                None => (1, RECONNECT_INTERVAL_MS),
            };

            let ready = unsafe { libc::poll(fds.as_mut_ptr(), nfds as libc::nfds_t, timeout) };
            if ready < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                log::warn!("monitor poll failed: {err}");
                break;
            }
            if ready == 0 {
                // Retry timer expired; reconnect at the top of the loop.
                continue;
            }
            if fds[0].revents != 0 {
                break;
            }
            if fds[1].revents == 0 {
                continue;
            }

            if let Some(stream) = conn.as_mut() {
                match read_event_line(stream) {
                    Ok(line) => self.handle_line(&line, &dev_root, have_tree),
                    Err(err) => {
                        log::debug!("event stream dropped: {err}");
                        conn = None;
                    }
                }
            }
        }
    }

    fn handle_line(&self, line: &str, dev_root: &std::path::Path, have_tree: bool) {
        let Some((action, syspath)) = devd::parse_event_line(line, dev_root, have_tree) else {
            return;
        };
        if self.filters.matches(&self.udev, &syspath) {
            self.shared.send_device(&self.udev, &syspath, action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_twice_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let udev = Udev::builder()
            .dev_root(dir.path())
            .devd_socket(dir.path().join("missing.pipe"))
            .build();
        let mut monitor = Monitor::new(&udev).unwrap();
        monitor.enable_receiving().unwrap();
        assert!(matches!(
            monitor.enable_receiving(),
            Err(MonitorError::AlreadyEnabled)
        ));
    }

    #[test]
    fn test_drop_without_enabling() {
        let udev = Udev::new();
        let monitor = Monitor::new(&udev).unwrap();
        drop(monitor);
    }

    #[test]
    fn test_drop_joins_disconnected_worker() {
        let dir = tempfile::tempdir().unwrap();
        let udev = Udev::builder()
            .dev_root(dir.path())
            .devd_socket(dir.path().join("missing.pipe"))
            .build();
        let mut monitor = Monitor::new(&udev).unwrap();
        monitor.enable_receiving().unwrap();
        // The worker is parked in its retry cycle; teardown must still be
        // prompt.
        drop(monitor);
    }
}
