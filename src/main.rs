use anyhow::{Context, Result};
use clap::Parser;
use crossbeam::channel::RecvTimeoutError;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use claroute::bus::cpal_host::CpalHost;
use claroute::directory::DeviceDirectory;
use claroute::directory::system::CpalDirectory;
use claroute::directory::watcher::DeviceWatcher;
use claroute::dsp::StreamFormat;
use claroute::dsp::equalizer::Equalizer;
use claroute::profile::Profile;
use claroute::router::{Category, Router};

#[derive(Parser, Debug)]
#[command(name = "claroute")]
#[command(version)]
#[command(about = "Enhances and reroutes live audio across devices, buses and app sessions.")]
struct Args {
    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,

    /// List active audio sessions and exit
    #[arg(long)]
    list_sessions: bool,

    /// Profile file to load and save (defaults to the XDG config dir)
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    duration: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let directory: Arc<dyn DeviceDirectory> = Arc::new(CpalDirectory::new());

    if args.list_devices {
        print_devices(directory.as_ref());
        return Ok(());
    }
    if args.list_sessions {
        print_sessions(directory.as_ref());
        return Ok(());
    }

    let profile_path = args.profile.clone().unwrap_or_else(Profile::default_path);
    let profile = Profile::load_or_default(&profile_path);

    let mut router = Router::new(Arc::clone(&directory), StreamFormat::default());
    router.apply_profile(&profile);

    // Default routes: every output category through its own bus on the
    // first output device, microphone on the first input device.
    let first_output = router.output_devices().first().map(|d| d.index);
    let first_input = router.input_devices().first().map(|d| d.index);

    match first_output {
        Some(device) => {
            for category in Category::OUTPUTS {
                let bus_name = format!("bus_{category}");
                if let Err(e) = router.create_route(category, device, &bus_name) {
                    warn!("could not route {category}: {e}");
                }
            }
        }
        None => warn!("no output devices available, nothing to route"),
    }
    if let Some(device) = first_input
        && let Err(e) = router.create_route(Category::Microphone, device, "bus_microphone")
    {
        warn!("could not route microphone: {e}");
    }

    // One equalizer per routed output category, gains from the profile.
    let mut eq_handles = Vec::new();
    for category in Category::OUTPUTS {
        if router.route(category).is_none() {
            continue;
        }
        let (eq, handle) = Equalizer::new(profile.band_count.max(1));
        if let Some(gains) = profile.category_gains.get(&category) {
            handle.set_gains(gains);
        }
        handle.set_output_gain(profile.output_gain_db);
        router
            .apply_processing(category, Box::new(eq))
            .with_context(|| format!("failed to attach equalizer for {category}"))?;
        eq_handles.push((category, handle));
    }

    let host = CpalHost::new();
    if let Err(e) = router.start_routing(&host) {
        warn!("some buses failed to start: {e}");
    }

    let (mut watcher, deltas) =
        DeviceWatcher::spawn(Arc::clone(&directory), DeviceWatcher::DEFAULT_PERIOD);

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("shutdown requested");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    info!("routing active, press Ctrl+C to stop");
    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    while running.load(Ordering::SeqCst) {
        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            break;
        }
        match deltas.recv_timeout(Duration::from_millis(500)) {
            Ok(delta) => {
                info!(
                    "devices changed: {} added, {} removed",
                    delta.added.len(),
                    delta.removed.len()
                );
                router.refresh_devices();
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    watcher.stop();
    router.stop_routing();

    // Read engine state back into the profile and save it.
    let mut snapshot = router.profile_snapshot(&profile);
    if let Some((_, handle)) = eq_handles.first() {
        snapshot.band_count = handle.band_count();
        snapshot.output_gain_db = handle.output_gain();
    }
    for (category, handle) in &eq_handles {
        snapshot.category_gains.insert(*category, handle.gains());
    }
    if let Err(e) = snapshot.save(&profile_path) {
        warn!("could not save profile: {e}");
    }

    Ok(())
}

fn print_devices(directory: &dyn DeviceDirectory) {
    println!("Output devices:");
    for device in directory.list_output_devices() {
        println!(
            "  [{}] {} ({} ch, {} Hz)",
            device.index, device.name, device.channels, device.default_sample_rate
        );
    }
    println!("Input devices:");
    for device in directory.list_input_devices() {
        println!(
            "  [{}] {} ({} ch, {} Hz)",
            device.index, device.name, device.channels, device.default_sample_rate
        );
    }
}

fn print_sessions(directory: &dyn DeviceDirectory) {
    let sessions = directory.list_active_sessions();
    if sessions.is_empty() {
        println!("No active audio sessions reported.");
        return;
    }
    for session in sessions {
        let volume = session
            .volume_percent
            .map_or_else(|| "?".to_string(), |v| format!("{v}%"));
        println!("  [{}] {} ({volume})", session.pid, session.name);
    }
}
