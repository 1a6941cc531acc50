use std::sync::Arc;

use crate::core::{
    alerts::{service::AlertService, store::{AlertStore, JsonAlertStore}},
    clock::{Clock, SystemClock},
    config::{default_config_dir, ConfigManager, Settings},
    error::AlertResult,
    notifications::{
        events::{ChannelListener, NotificationEvent},
        manager::NotificationManager,
        scheduler::NotificationScheduler,
    },
    presentation::Presenter,
};

/// Everything the shell wires together, owned by the composition root.
pub struct AppServices {
    pub settings: Settings,
    pub store: Arc<JsonAlertStore>,
    pub manager: Arc<NotificationManager>,
    pub scheduler: Arc<NotificationScheduler>,
    pub alerts: AlertService,
    pub presenter: Arc<Presenter>,
}

impl AppServices {
    /// Build the service graph from settings. Does not start any task.
    pub fn build(settings: Settings, clock: Arc<dyn Clock>) -> AlertResult<(Self, tokio::sync::mpsc::UnboundedReceiver<NotificationEvent>)> {
        let store = Arc::new(JsonAlertStore::open(settings.alerts_path(), clock.clone())?);
        if settings.seed_default_alerts && store.is_empty() {
            let seeded = store.create_default_water_alerts()?;
            log::info!("Seeded {} default water reminders", seeded.len());
        }

        let manager = Arc::new(NotificationManager::new(store.clone(), clock.clone()));
        let scheduler = Arc::new(
            NotificationScheduler::new(manager.clone(), store.clone(), clock)
                .with_poll_interval(settings.poll_interval())
                .with_debounce(settings.debounce()),
        );
        let alerts = AlertService::new(store.clone(), scheduler.clone());

        let (listener, events) = ChannelListener::new();
        let _ui = manager.add_listener(listener);
        let _diagnostics = manager.add_listener(|event: &NotificationEvent| {
            log::info!("{} alert={} message={:?}", event.kind(), event.alert().id, event.alert().message);
        });
        let presenter = Arc::new(Presenter::new(manager.clone(), settings.settle_delay()));

        Ok((
            Self {
                settings,
                store,
                manager,
                scheduler,
                alerts,
                presenter,
            },
            events,
        ))
    }
}

async fn serve(services: AppServices, events: tokio::sync::mpsc::UnboundedReceiver<NotificationEvent>) -> AlertResult<()> {
    let presenter = services.presenter.clone();
    let ui_task = tokio::spawn(async move { presenter.run(events).await });

    let active = services.store.get_active_alerts().await?;
    services.scheduler.schedule_all_alerts(active);

    services
        .scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::warn!("Ctrl-C handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    ui_task.abort();
    Ok(())
}

pub fn run() -> AlertResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init().ok();

    let config_dir = default_config_dir();
    let config_manager = ConfigManager::new(config_dir.clone());
    let settings = config_manager.load();
    if !config_dir.join("settings.json").exists() {
        if let Err(e) = config_manager.save(&settings) {
            log::warn!("Could not write default settings to {:?}: {}", config_dir, e);
        }
    }
    log::info!("Using alerts at {:?}", settings.alerts_path());

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let (services, events) = AppServices::build(settings, Arc::new(SystemClock))?;
        serve(services, events).await
    })
}
