//! Routing lifecycle against the manual stream host and mock directory.

use std::sync::Arc;

use claroute::bus::BusState;
use claroute::bus::host::ManualHost;
use claroute::directory::DeviceDirectory;
use claroute::directory::mock::MockDirectory;
use claroute::dsp::StreamFormat;
use claroute::dsp::equalizer::Equalizer;
use claroute::error::EngineError;
use claroute::router::{Category, Router};

fn directory() -> Arc<MockDirectory> {
    let directory = MockDirectory::new();
    directory.add_output(0, "Speakers");
    directory.add_output(1, "Headphones");
    directory.add_input(2, "Microphone");
    Arc::new(directory)
}

fn router(directory: &Arc<MockDirectory>) -> Router {
    Router::new(
        Arc::clone(directory) as Arc<dyn DeviceDirectory>,
        StreamFormat::default(),
    )
}

#[test]
fn start_routing_activates_every_routed_bus() {
    let directory = directory();
    let mut router = router(&directory);
    let host = ManualHost::new();

    router.create_route(Category::Game, 0, "bus_game").unwrap();
    router.create_route(Category::Chat, 1, "bus_chat").unwrap();
    router
        .create_route(Category::Microphone, 2, "bus_microphone")
        .unwrap();

    router.start_routing(&host).unwrap();
    assert_eq!(host.open_count(), 3);
    assert!(router.bus("bus_game").unwrap().is_active());

    router.stop_routing();
    assert_eq!(host.open_count(), 0);
    assert_eq!(host.closed(), 3);
    assert_eq!(router.bus("bus_game").unwrap().state(), BusState::Stopped);

    // Stopping again is a no-op, not a double release.
    router.stop_routing();
    assert_eq!(host.closed(), 3);
}

#[test]
fn failed_stream_open_surfaces_and_leaves_bus_stopped() {
    let directory = directory();
    let mut router = router(&directory);
    let host = ManualHost::new();

    router.create_route(Category::Game, 0, "bus_game").unwrap();
    host.fail_next_open();

    let result = router.start_routing(&host);
    assert!(matches!(result, Err(EngineError::StreamFailed(_))));
    assert_eq!(router.bus("bus_game").unwrap().state(), BusState::Stopped);

    // The next attempt succeeds once the host recovers.
    router.start_routing(&host).unwrap();
    assert!(router.bus("bus_game").unwrap().is_active());
}

#[test]
fn chain_edits_land_on_a_running_bus() {
    let directory = directory();
    let mut router = router(&directory);
    let host = ManualHost::new();

    router.create_route(Category::Game, 0, "bus_game").unwrap();
    router.start_routing(&host).unwrap();

    // Attach an equalizer while the stream is live and drive a tick.
    let (eq, handle) = Equalizer::new(10);
    router.apply_processing(Category::Game, Box::new(eq)).unwrap();
    handle.set_output_gain(-6.0);

    let input = vec![0.5f32; 2048];
    let mut output = vec![0.0f32; 2048];
    assert!(host.drive("bus_game", &input, &mut output));
    let expected = 0.5 * 10f32.powf(-6.0 / 20.0);
    assert!(
        output.iter().all(|&s| (s - expected).abs() < 1e-3),
        "output gain not applied: got {}",
        output[0]
    );

    assert!(router.remove_processing(Category::Game, "equalizer").unwrap());
    assert!(host.drive("bus_game", &input, &mut output));
    assert!(output.iter().all(|&s| s == 0.5));
}

#[test]
fn removing_a_shared_bus_drops_both_routes_and_stops_once() {
    let directory = directory();
    let mut router = router(&directory);
    let host = ManualHost::new();

    router.create_route(Category::Game, 0, "bus_shared").unwrap();
    router.create_route(Category::System, 0, "bus_shared").unwrap();
    router.start_routing(&host).unwrap();

    assert!(router.remove_bus("bus_shared"));
    assert!(router.route(Category::Game).is_none());
    assert!(router.route(Category::System).is_none());
    assert_eq!(host.closed(), 1);
}

#[test]
fn unified_mode_forces_devices_end_to_end() {
    let directory = directory();
    let mut router = router(&directory);

    router.set_unified_device_mode(true, Some(0), Some(2));
    router.create_route(Category::Chat, 1, "bus_chat").unwrap();
    router
        .create_route(Category::Microphone, 2, "bus_microphone")
        .unwrap();

    assert_eq!(router.route(Category::Chat).unwrap().device_index, 0);
    assert_eq!(router.device_for_category(Category::Chat).unwrap().index, 0);

    let (enabled, out, inp) = router.unified_config();
    assert!(enabled);
    assert_eq!(out, Some(0));
    assert_eq!(inp, Some(2));
}

#[test]
fn enumeration_failure_unresolves_routes_without_erroring() {
    let directory = directory();
    let mut router = router(&directory);

    router.create_route(Category::Game, 0, "bus_game").unwrap();
    assert!(router.is_route_resolved(Category::Game));

    directory.set_fail_enumeration(true);
    router.refresh_devices();

    assert!(!router.is_route_resolved(Category::Game));

    // Devices come back; a fresh refresh does not resurrect assignments on
    // its own, but re-creating the route does.
    directory.set_fail_enumeration(false);
    router.refresh_devices();
    router.create_route(Category::Game, 0, "bus_game").unwrap();
    assert!(router.is_route_resolved(Category::Game));
}
