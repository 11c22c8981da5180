use std::sync::{Arc, Mutex};
use std::thread;

use tracing::info;

use monitor_module::browser::WebDriverSession;
use monitor_module::config::MonitorConfig;
use monitor_module::connection::ConnectionManager;
use monitor_module::service::start_monitor_threads;
use monitor_module::storage::MessageStore;
use monitor_module::whatsapp_web::WhatsAppWebSource;
use monitor_module::{Monitor, MonitorEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_target(false).init();
    dotenvy::dotenv().ok();

    let config = MonitorConfig::from_env()?;
    config.validate()?;
    config.ensure_dirs()?;
    info!(
        "starting monitor (check every {}m, summarize every {}m)",
        config.check_interval_minutes, config.summary_interval_minutes
    );

    let store = MessageStore::new(config.db_path())?;

    let driver_config = config.driver_config();
    let factory = move || WebDriverSession::new(&driver_config);
    let options = WhatsAppWebSource::<WebDriverSession>::connect_options(
        config.service_url.clone(),
        config.connect_timeout(),
        config.auth_timeout(),
    );
    let connection = ConnectionManager::new(Box::new(factory), options);
    let source = WhatsAppWebSource::new(
        connection,
        config.conversation_load_timeout(),
        config.recent_window,
    );

    let (event_sender, event_receiver) = crossbeam_channel::unbounded();
    let monitor = Monitor::new(config.clone(), source)
        .with_store(store)
        .with_events(event_sender);
    let monitor = Arc::new(Mutex::new(monitor));

    // Host-side event surface: this binary just logs what a hosting
    // application would consume.
    let event_logger = thread::spawn(move || {
        for event in event_receiver {
            match event {
                MonitorEvent::NewImportantMessages { count, .. } => {
                    info!("event: {} new important message(s)", count);
                }
                MonitorEvent::NewSummary {
                    file,
                    message_count,
                    ..
                } => {
                    info!(
                        "event: summary with {} message(s) at {}",
                        message_count,
                        file.display()
                    );
                }
                MonitorEvent::ConnectionChanged { connected } => {
                    info!(
                        "event: {}",
                        if connected { "connected" } else { "disconnected" }
                    );
                }
            }
        }
    });

    let mut control = start_monitor_threads(
        monitor.clone(),
        config.check_interval(),
        config.summary_interval(),
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    control.stop_and_join();

    {
        let mut monitor = monitor.lock().unwrap_or_else(|poison| poison.into_inner());
        monitor.disconnect();
    }
    drop(monitor);
    let _ = event_logger.join();

    Ok(())
}
