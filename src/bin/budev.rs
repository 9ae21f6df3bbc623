// Budev CLI
// Enumerate present devices or stream hotplug events from the terminal

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use budev_core::{Device, Enumerator, Monitor, Udev};

/// Device enumeration and hotplug monitoring front end
#[derive(Parser, Debug)]
#[command(name = "budev")]
#[command(about = "List devices and watch hotplug events", long_about = None)]
struct Args {
    /// Root of the device-node namespace
    #[arg(long, value_name = "DIR")]
    dev_root: Option<PathBuf>,

    /// Path of the event broadcast socket
    #[arg(long, value_name = "SOCKET")]
    devd_socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enumerate matching devices and print their identity
    List {
        /// Subsystem glob to match (repeatable)
        #[arg(short, long, default_value = "input")]
        subsystem: Vec<String>,

        /// Device name glob to match (repeatable)
        #[arg(short = 'n', long)]
        sysname: Vec<String>,

        /// Also print properties and the synthesized parent
        #[arg(short, long)]
        verbose: bool,
    },
    /// Stream hotplug events until interrupted
    Monitor {
        /// Subsystem glob to deliver (repeatable)
        #[arg(short, long, default_value = "input")]
        subsystem: Vec<String>,
    },
}

fn build_udev(args: &Args) -> Udev {
    let mut builder = Udev::builder();
    if let Some(root) = &args.dev_root {
        builder = builder.dev_root(root);
    }
    if let Some(socket) = &args.devd_socket {
        builder = builder.devd_socket(socket);
    }
    builder.build()
}

fn print_device(device: &Device, verbose: bool) {
    println!("{}", device.syspath());
    if !verbose {
        return;
    }
    for entry in device.properties() {
        println!("  {}={}", entry.name(), entry.value().unwrap_or(""));
    }
    if let Some(parent) = device.parent() {
        println!(
            "  parent: {} ({})",
            parent.syspath(),
            parent.property_value("NAME").unwrap_or("?")
        );
    }
}

fn list(udev: &Udev, subsystems: &[String], sysnames: &[String], verbose: bool) -> anyhow::Result<()> {
    let mut enumerator = Enumerator::new(udev);
    for subsystem in subsystems {
        enumerator.match_subsystem(subsystem);
    }
    for sysname in sysnames {
        enumerator.match_sysname(sysname);
    }
    enumerator
        .scan_devices()
        .context("device scan failed")?;

    for syspath in enumerator.iter() {
        let device = Device::from_syspath(udev, syspath);
        print_device(&device, verbose);
    }
    Ok(())
}

fn monitor(udev: &Udev, subsystems: &[String]) -> anyhow::Result<()> {
    let mut monitor = Monitor::new(udev).context("monitor setup failed")?;
    for subsystem in subsystems {
        monitor.filter_add_match_subsystem(subsystem);
    }
    monitor
        .enable_receiving()
        .context("could not start monitoring")?;
    log::info!("watching {}", udev.devd_socket().display());

    while let Some(device) = monitor.receive_device() {
        println!("{} {}", device.action(), device.syspath());
        for entry in device.properties() {
            println!("  {}={}", entry.name(), entry.value().unwrap_or(""));
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let udev = build_udev(&args);

    match &args.command {
        Command::List {
            subsystem,
            sysname,
            verbose,
        } => list(&udev, subsystem, sysname, *verbose),
        Command::Monitor { subsystem } => monitor(&udev, subsystem),
    }
}
