mod app;
mod platform;

use app::PlaypenApp;
use eframe::egui;
use platform::LocalUser;
use platform::PreviewFactory;
use platform::Shelf;
use pp_hub::Hub;
use pp_hub::HubConfig;
use pp_hub::telemetry;

fn main() -> Result<(), eframe::Error> {
    let config = match HubConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Playpen startup error: {error}");
            return Ok(());
        }
    };

    if let Err(error) = telemetry::initialise(&config) {
        eprintln!("Playpen logging disabled: {error}");
    }

    let factory = PreviewFactory::default();
    let preview = factory.latest();
    let hub = match Hub::new(config, Shelf, LocalUser, factory) {
        Ok(hub) => hub,
        Err(error) => {
            tracing::error!(%error, "hub failed to start");
            return Ok(());
        }
    };

    let summary = hub.summary();
    tracing::info!(
        tabs = summary.tabs,
        durable_session = summary.durable_session,
        capture_guard = summary.capture_guard_installed,
        "playpen started"
    );

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Playpen")
            .with_inner_size([1180.0, 800.0])
            .with_min_inner_size([640.0, 480.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Playpen",
        native_options,
        Box::new(move |_cc| Ok(Box::new(PlaypenApp::new(hub, preview)))),
    )
}
