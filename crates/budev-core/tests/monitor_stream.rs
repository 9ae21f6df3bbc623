// End-to-end monitor tests against a scripted devd socket

use std::io::Write;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixListener;
use std::time::{Duration, Instant};

use budev_core::{Action, Monitor, Udev};

/// Whether the monitor's pollable descriptor currently reads ready.
fn wake_pending(monitor: &Monitor) -> bool {
    let mut fds = [libc::pollfd {
        fd: monitor.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    }];
    unsafe { libc::poll(fds.as_mut_ptr(), 1, 0) > 0 }
}

fn wait_for_wake(monitor: &Monitor) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !wake_pending(monitor) {
        assert!(Instant::now() < deadline, "no event arrived in time");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_events_delivered_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("devd.pipe");
    let listener = UnixListener::bind(&sock).unwrap();

    let udev = Udev::builder().dev_root("/dev").devd_socket(&sock).build();
    let mut monitor = Monitor::new(&udev).unwrap();
    monitor.filter_add_match_subsystem("input");
    monitor.enable_receiving().unwrap();

    let (mut stream, _) = listener.accept().unwrap();
    stream
        .write_all(
            b"!system=DEVFS subsystem=CDEV type=CREATE cdev=psm0\n\
              !system=DEVFS subsystem=CDEV type=CREATE cdev=ukbd0\n\
              !system=DEVFS subsystem=CDEV type=FROB cdev=psm1\n\
              ?unrecognized line\n\
              !system=DEVFS subsystem=CDEV type=CREATE cdev=ttyu0\n\
              !system=DEVFS subsystem=CDEV type=DESTROY cdev=psm0\n",
        )
        .unwrap();

    let first = monitor.receive_device().expect("first event");
    assert_eq!(first.syspath(), "/dev/psm0");
    assert_eq!(first.action(), Action::Add);
    assert_eq!(first.property_value("ID_INPUT"), Some("1"));
    assert_eq!(first.property_value("ID_INPUT_MOUSE"), Some("1"));

    let second = monitor.receive_device().expect("second event");
    assert_eq!(second.syspath(), "/dev/ukbd0");
    assert_eq!(second.action(), Action::Add);
    assert_eq!(second.property_value("ID_INPUT_KEYBOARD"), Some("1"));

    // The malformed notice, the unknown sigil and the unfilterable ttyu0
    // event all vanished; the next delivery is the removal.
    let third = monitor.receive_device().expect("third event");
    assert_eq!(third.syspath(), "/dev/psm0");
    assert_eq!(third.action(), Action::Remove);
    assert!(third.properties().is_empty());

    // Every queued device has been received; no wake bytes may linger.
    std::thread::sleep(Duration::from_millis(100));
    assert!(!wake_pending(&monitor));
}

#[test]
fn test_worker_reconnects_after_outage() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("devd.pipe");

    let udev = Udev::builder().dev_root("/dev").devd_socket(&sock).build();
    let mut monitor = Monitor::new(&udev).unwrap();
    monitor.filter_add_match_subsystem("input");
    // Nothing is listening yet; the worker enters its retry cycle.
    monitor.enable_receiving().unwrap();
    std::thread::sleep(Duration::from_millis(300));

    let listener = UnixListener::bind(&sock).unwrap();

    // First connection: one event, then EOF.
    let (mut stream, _) = listener.accept().unwrap();
    stream
        .write_all(b"!system=DEVFS subsystem=CDEV type=CREATE cdev=psm0\n")
        .unwrap();
    let dev = monitor.receive_device().expect("event after first connect");
    assert_eq!(dev.syspath(), "/dev/psm0");
    assert_eq!(dev.action(), Action::Add);
    drop(stream);

    // The EOF sends the worker back through the retry path; it must come
    // back on its own and keep delivering.
    let (mut stream, _) = listener.accept().unwrap();
    stream
        .write_all(b"!system=DEVFS subsystem=CDEV type=DESTROY cdev=psm0\n")
        .unwrap();
    let dev = monitor.receive_device().expect("event after reconnect");
    assert_eq!(dev.action(), Action::Remove);
}

#[test]
fn test_teardown_with_undelivered_events() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("devd.pipe");
    let listener = UnixListener::bind(&sock).unwrap();

    let udev = Udev::builder().dev_root("/dev").devd_socket(&sock).build();
    let mut monitor = Monitor::new(&udev).unwrap();
    monitor.filter_add_match_subsystem("input");
    monitor.enable_receiving().unwrap();

    let (mut stream, _) = listener.accept().unwrap();
    stream
        .write_all(
            b"!system=DEVFS subsystem=CDEV type=CREATE cdev=psm0\n\
              !system=DEVFS subsystem=CDEV type=CREATE cdev=ukbd0\n",
        )
        .unwrap();

    // Let the events reach the queue, then tear down without receiving
    // them; the drop must join the worker and release the queue.
    wait_for_wake(&monitor);
    drop(monitor);
}
