use std::{sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    bus::{self, EventBus, LifecycleEvent},
    cores::CoreRegistry,
    error::{LifecycleError, StarterError},
    instance::{LifecycleState, ServerInstance},
    paths::DataDirs,
    render::ConfigRenderer,
    starter::StarterRegistry,
    store::InstanceStore,
    utils,
};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub dirs: DataDirs,
    /// A starter invocation not answering within this window counts as a
    /// fault (fail-closed).
    pub starter_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn new(dirs: DataDirs) -> Self {
        Self {
            dirs,
            starter_timeout: Duration::from_secs(30),
        }
    }
}

/// The per-instance lifecycle state machine.
///
/// `Stopped -> Starting -> Running -> Stopping -> Stopped`, with every
/// failure during `Starting` landing back on `Stopped`. All collaborators
/// are explicit constructor arguments; nothing is resolved through globals.
/// Operations on one instance are serialized by its transition guard,
/// operations across instances run independently.
pub struct Orchestrator {
    cores: Arc<CoreRegistry>,
    starters: Arc<StarterRegistry>,
    bus: Arc<EventBus>,
    store: Arc<dyn InstanceStore>,
    renderer: ConfigRenderer,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        cores: Arc<CoreRegistry>,
        starters: Arc<StarterRegistry>,
        bus: Arc<EventBus>,
        store: Arc<dyn InstanceStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        let renderer = ConfigRenderer::new(cores.clone(), settings.dirs.clone());
        Self {
            cores,
            starters,
            bus,
            store,
            renderer,
            settings,
        }
    }

    pub fn renderer(&self) -> &ConfigRenderer {
        &self.renderer
    }

    /// Brings an instance from `Stopped` to `Running`.
    ///
    /// Check order is fixed: expiry, core lookup, starter lookup, plugin
    /// veto. Only then do side effects begin (core file copy, config
    /// rendering, starter launch). On every failure path the instance is
    /// left `Stopped` and untouched beyond its console log.
    pub async fn start(&self, instance: &Arc<ServerInstance>) -> Result<(), LifecycleError> {
        let _guard = instance.transition_guard().await;
        let id = instance.data.id;

        if instance.data.expired() {
            instance
                .console
                .output(format!("Server expired at {}.", instance.data.expires_at))
                .await;
            return Err(LifecycleError::Expired(instance.data.expires_at));
        }

        let start = instance.start.read().await.clone();

        let Some(core) = self.cores.get(&start.core) else {
            instance
                .console
                .output(format!("Launch core {} does not exist.", start.core))
                .await;
            return Err(LifecycleError::CoreNotFound(start.core));
        };

        let Some(starter) = self.starters.resolve(&start.starter) else {
            instance
                .console
                .output(format!("Starter {} does not exist.", start.starter))
                .await;
            return Err(LifecycleError::StarterNotFound(start.starter));
        };

        let verdicts = self.bus.broadcast(&LifecycleEvent::new(bus::WILL_START, id)).await;
        if let Some(blocker) = bus::first_veto(&verdicts) {
            instance
                .console
                .output(format!("Start rejected by plugin {blocker}."))
                .await;
            return Err(LifecycleError::PluginRejected(blocker.to_string()));
        }

        if start.last_core != start.core {
            instance
                .console
                .output("Launch core changed, copying core files.")
                .await;
            utils::copy_dir_all(
                self.settings.dirs.core_files(&start.core),
                instance.dir(&self.settings.dirs),
            )
            .await
            .map_err(|err| {
                warn!(server = id, core = %start.core, %err, "core file copy failed");
                LifecycleError::Internal("failed to copy core files".to_string())
            })?;

            {
                let mut start = instance.start.write().await;
                start.last_core = start.core.clone();
            }
            let updated = instance.start.read().await.clone();
            self.store.persist_start(id, &updated).await.map_err(|err| {
                warn!(server = id, %err, "failed to persist launch attributes");
                LifecycleError::Internal("failed to persist launch attributes".to_string())
            })?;
        }

        instance.console.output("Rendering config files.").await;
        self.renderer.ensure_files(instance).await.map_err(|err| {
            warn!(server = id, %err, "config rendering failed");
            LifecycleError::Internal("failed to render config files".to_string())
        })?;

        instance
            .console
            .output(format!("Invoking starter {}.", start.starter))
            .await;
        instance.set_state(LifecycleState::Starting).await;

        let scope = instance.var_scope(&self.settings.dirs).await;
        let program = scope.substitute(&core.start.program);
        let args: Vec<String> = scope
            .substitute(&core.start.args)
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let launched = self
            .invoke(id, "start", starter.start(instance.clone(), program, args))
            .await;
        if !launched {
            instance.set_state(LifecycleState::Stopped).await;
            instance.console.output("Starter failed to launch the server.").await;
            return Err(LifecycleError::LaunchFailed);
        }

        instance.set_state(LifecycleState::Running).await;
        self.bus.notify(LifecycleEvent::new(bus::STARTED, id));
        instance.console.output("Server started.").await;
        info!(server = id, "server started");

        Ok(())
    }

    /// Stops a running instance through its starter.
    ///
    /// The starter owns the authoritative terminal-state signal; this core
    /// only moves the instance to `Stopping` around the call and restores
    /// the previous state when the starter refuses.
    pub async fn stop(&self, instance: &Arc<ServerInstance>) -> Result<(), LifecycleError> {
        let _guard = instance.transition_guard().await;
        let id = instance.data.id;

        let verdicts = self.bus.broadcast(&LifecycleEvent::new(bus::WILL_STOP, id)).await;
        if let Some(blocker) = bus::first_veto(&verdicts) {
            instance
                .console
                .output(format!("Stop rejected by plugin {blocker}."))
                .await;
            return Err(LifecycleError::PluginRejected(blocker.to_string()));
        }

        let start = instance.start.read().await.clone();
        let Some(starter) = self.starters.resolve(&start.starter) else {
            return Err(LifecycleError::StarterNotFound(start.starter));
        };

        let previous = instance.state().await;
        instance.set_state(LifecycleState::Stopping).await;

        let stopped = self.invoke(id, "stop", starter.stop(instance.clone())).await;
        if !stopped {
            instance.set_state(previous).await;
            instance.console.output("Starter failed to stop the server.").await;
            return Err(LifecycleError::StopFailed);
        }

        self.bus.notify(LifecycleEvent::new(bus::STOPPED, id));
        info!(server = id, "server stopped");

        Ok(())
    }

    /// Forwards free-form input to a running instance; on delivery, plugins
    /// are notified with the text attached.
    pub async fn send_input(
        &self,
        instance: &Arc<ServerInstance>,
        text: &str,
    ) -> Result<(), LifecycleError> {
        let _guard = instance.transition_guard().await;
        let id = instance.data.id;

        let start = instance.start.read().await.clone();
        let Some(starter) = self.starters.resolve(&start.starter) else {
            return Err(LifecycleError::StarterNotFound(start.starter));
        };

        if instance.state().await != LifecycleState::Running {
            return Err(LifecycleError::NotRunning);
        }

        let delivered = self
            .invoke(id, "send_input", starter.send_input(instance.clone(), text))
            .await;
        if !delivered {
            return Err(LifecycleError::InputFailed);
        }

        self.bus
            .notify(LifecycleEvent::new(bus::INPUT, id).with_input(text));

        Ok(())
    }

    /// Starts every auto-start instance, logging failures and carrying on.
    /// Meant for process boot after `load_all`.
    pub async fn autostart(&self, instances: &[Arc<ServerInstance>]) {
        for instance in instances {
            if !instance.data.auto_start {
                continue;
            }
            if let Err(err) = self.start(instance).await {
                warn!(server = instance.data.id, %err, "autostart failed");
            }
        }
    }

    /// Bounds a starter invocation and degrades faults and timeouts to a
    /// `false` verdict, keeping the cause in the log only.
    async fn invoke<F>(&self, id: i64, op: &str, call: F) -> bool
    where
        F: Future<Output = Result<bool, StarterError>>,
    {
        match timeout(self.settings.starter_timeout, call).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(err)) => {
                warn!(server = id, %op, %err, "starter fault");
                false
            }
            Err(_) => {
                warn!(server = id, %op, "starter invocation timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    use crate::{
        bus::EventSubscriber,
        cores::LaunchCore,
        error::{StoreError, SubscriberError},
        instance::{InstanceData, StartData},
        starter::Starter,
    };

    #[derive(Clone, Copy)]
    enum Behavior {
        Verdict(bool),
        Fault,
        Hang,
    }

    struct FakeStarter {
        start_behavior: Behavior,
        stop_behavior: Behavior,
        input_behavior: Behavior,
        calls: Mutex<Vec<String>>,
    }

    impl FakeStarter {
        fn with(start: Behavior, stop: Behavior, input: Behavior) -> Arc<Self> {
            Arc::new(Self {
                start_behavior: start,
                stop_behavior: stop,
                input_behavior: input,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn happy() -> Arc<Self> {
            Self::with(
                Behavior::Verdict(true),
                Behavior::Verdict(true),
                Behavior::Verdict(true),
            )
        }

        async fn record(&self, call: String) {
            self.calls.lock().await.push(call);
        }

        async fn calls(&self) -> Vec<String> {
            self.calls.lock().await.clone()
        }

        async fn apply(&self, behavior: Behavior) -> Result<bool, StarterError> {
            match behavior {
                Behavior::Verdict(v) => Ok(v),
                Behavior::Fault => Err(StarterError::Fault("injected".to_string())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(true)
                }
            }
        }
    }

    #[async_trait]
    impl Starter for FakeStarter {
        async fn start(
            &self,
            _instance: Arc<ServerInstance>,
            program: String,
            args: Vec<String>,
        ) -> Result<bool, StarterError> {
            self.record(format!("start {program} {}", args.join(" "))).await;
            self.apply(self.start_behavior).await
        }

        async fn stop(&self, _instance: Arc<ServerInstance>) -> Result<bool, StarterError> {
            self.record("stop".to_string()).await;
            self.apply(self.stop_behavior).await
        }

        async fn send_input(
            &self,
            _instance: Arc<ServerInstance>,
            text: &str,
        ) -> Result<bool, StarterError> {
            self.record(format!("input {text}")).await;
            self.apply(self.input_behavior).await
        }
    }

    struct CountingSubscriber {
        verdict: bool,
        hits: AtomicUsize,
    }

    impl CountingSubscriber {
        fn new(verdict: bool) -> Arc<Self> {
            Arc::new(Self {
                verdict,
                hits: AtomicUsize::new(0),
            })
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventSubscriber for CountingSubscriber {
        async fn handle(&self, _event: LifecycleEvent) -> Result<bool, SubscriberError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(self.verdict)
        }
    }

    #[derive(Default)]
    struct MemStore {
        persisted: Mutex<Vec<(i64, StartData)>>,
    }

    #[async_trait]
    impl InstanceStore for MemStore {
        async fn persist_start(&self, id: i64, start: &StartData) -> Result<(), StoreError> {
            self.persisted.lock().await.push((id, start.clone()));
            Ok(())
        }
    }

    fn sample_core() -> LaunchCore {
        serde_json::from_value(serde_json::json!({
            "name": "vanilla",
            "start": {
                "program": "java",
                "args": "-Xmx{{PLAYER}}M -jar server.jar --port {{PORT}}"
            },
            "configs": [
                {
                    "filename": "server.properties",
                    "required": true,
                    "known": [
                        { "key": "server-port", "value": "{{PORT}}", "force": true },
                        { "key": "max-players", "value": "{{PLAYER}}" }
                    ]
                }
            ]
        }))
        .expect("core should parse")
    }

    fn sample_instance(expired: bool) -> Arc<ServerInstance> {
        let offset = if expired {
            -chrono::Duration::hours(1)
        } else {
            chrono::Duration::days(30)
        };
        Arc::new(ServerInstance::new(
            InstanceData {
                id: 7,
                name: "lobby".to_string(),
                port: 25565,
                max_players: 20,
                memory_mb: 2048,
                expires_at: Utc::now() + offset,
                auto_start: false,
            },
            StartData {
                core: "vanilla".to_string(),
                last_core: "vanilla".to_string(),
                starter: "fake".to_string(),
                world: "world".to_string(),
            },
        ))
    }

    struct Fixture {
        _tmp: TempDir,
        orchestrator: Orchestrator,
        starter: Arc<FakeStarter>,
        subscriber: Arc<CountingSubscriber>,
        store: Arc<MemStore>,
        dirs: DataDirs,
    }

    fn fixture(starter: Arc<FakeStarter>, subscriber: Arc<CountingSubscriber>) -> Fixture {
        let tmp = TempDir::new().expect("tempdir");
        let dirs = DataDirs::new(tmp.path());

        let mut cores = CoreRegistry::new();
        cores.register(sample_core()).expect("register core");

        let mut starters = StarterRegistry::new();
        starters.register("fake", starter.clone());

        let mut bus = EventBus::new();
        bus.register(bus::WILL_START, "gatekeeper", subscriber.clone());
        bus.register(bus::WILL_STOP, "gatekeeper", subscriber.clone());

        let store = Arc::new(MemStore::default());

        let mut settings = OrchestratorSettings::new(dirs.clone());
        settings.starter_timeout = Duration::from_millis(200);

        let orchestrator = Orchestrator::new(
            Arc::new(cores),
            Arc::new(starters),
            Arc::new(bus),
            store.clone(),
            settings,
        );

        Fixture {
            _tmp: tmp,
            orchestrator,
            starter,
            subscriber,
            store,
            dirs,
        }
    }

    #[tokio::test]
    async fn expired_instance_is_rejected_before_anything_else() {
        let f = fixture(FakeStarter::happy(), CountingSubscriber::new(true));
        let instance = sample_instance(true);

        let err = f.orchestrator.start(&instance).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Expired(_)));
        assert_eq!(err.code(), 461);

        assert_eq!(f.subscriber.hits(), 0);
        assert!(f.starter.calls().await.is_empty());
        assert!(!instance.dir(&f.dirs).exists());
        assert_eq!(instance.state().await, LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn unknown_core_fails_before_veto_broadcast() {
        let f = fixture(FakeStarter::happy(), CountingSubscriber::new(true));
        let instance = sample_instance(false);
        instance.start.write().await.core = "missing".to_string();

        let err = f.orchestrator.start(&instance).await.unwrap_err();
        assert!(matches!(err, LifecycleError::CoreNotFound(name) if name == "missing"));
        assert_eq!(f.subscriber.hits(), 0);
    }

    #[tokio::test]
    async fn unknown_starter_fails_before_veto_broadcast() {
        let f = fixture(FakeStarter::happy(), CountingSubscriber::new(true));
        let instance = sample_instance(false);
        instance.start.write().await.starter = "docker".to_string();

        let err = f.orchestrator.start(&instance).await.unwrap_err();
        assert!(matches!(err, LifecycleError::StarterNotFound(name) if name == "docker"));
        assert_eq!(f.subscriber.hits(), 0);
    }

    #[tokio::test]
    async fn veto_blocks_start_before_any_side_effect() {
        let f = fixture(FakeStarter::happy(), CountingSubscriber::new(false));
        let instance = sample_instance(false);
        instance.start.write().await.last_core = "forge".to_string();

        let err = f.orchestrator.start(&instance).await.unwrap_err();
        assert!(matches!(err, LifecycleError::PluginRejected(name) if name == "gatekeeper"));

        assert!(f.starter.calls().await.is_empty());
        assert!(!instance.dir(&f.dirs).exists());
        assert!(f.store.persisted.lock().await.is_empty());
        assert_eq!(instance.state().await, LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn successful_start_renders_and_launches_with_substituted_command() {
        let f = fixture(FakeStarter::happy(), CountingSubscriber::new(true));
        let instance = sample_instance(false);

        f.orchestrator.start(&instance).await.expect("start");

        assert_eq!(instance.state().await, LifecycleState::Running);
        assert_eq!(
            f.starter.calls().await,
            vec!["start java -Xmx20M -jar server.jar --port 25565".to_string()]
        );

        let rendered = tokio::fs::read_to_string(
            instance.dir(&f.dirs).join("server.properties"),
        )
        .await
        .expect("rendered file");
        assert_eq!(rendered, "server-port=25565\nmax-players=20\n");

        // No core change, nothing persisted.
        assert!(f.store.persisted.lock().await.is_empty());

        let console = instance.console.snapshot().await;
        assert!(console.iter().any(|l| l.line == "Server started."));
    }

    #[tokio::test]
    async fn core_change_copies_files_and_persists_marker() {
        let f = fixture(FakeStarter::happy(), CountingSubscriber::new(true));
        let instance = sample_instance(false);
        instance.start.write().await.last_core = "forge".to_string();

        let core_files = f.dirs.core_files("vanilla");
        tokio::fs::create_dir_all(&core_files).await.expect("mkdir");
        tokio::fs::write(core_files.join("server.jar"), b"jar")
            .await
            .expect("seed core file");

        f.orchestrator.start(&instance).await.expect("start");

        assert!(instance.dir(&f.dirs).join("server.jar").exists());
        assert_eq!(instance.start.read().await.last_core, "vanilla");

        let persisted = f.store.persisted.lock().await;
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].0, 7);
        assert_eq!(persisted[0].1.last_core, "vanilla");
    }

    #[tokio::test]
    async fn missing_core_files_abort_with_internal_error() {
        let f = fixture(FakeStarter::happy(), CountingSubscriber::new(true));
        let instance = sample_instance(false);
        instance.start.write().await.last_core = "forge".to_string();
        // No cores/vanilla/files directory seeded.

        let err = f.orchestrator.start(&instance).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Internal(_)));
        assert!(f.starter.calls().await.is_empty());
        assert_eq!(instance.state().await, LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn launch_refusal_leaves_instance_stopped() {
        let starter = FakeStarter::with(
            Behavior::Verdict(false),
            Behavior::Verdict(true),
            Behavior::Verdict(true),
        );
        let f = fixture(starter, CountingSubscriber::new(true));
        let instance = sample_instance(false);

        let err = f.orchestrator.start(&instance).await.unwrap_err();
        assert!(matches!(err, LifecycleError::LaunchFailed));
        assert_eq!(instance.state().await, LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn starter_fault_degrades_to_launch_failure() {
        let starter = FakeStarter::with(
            Behavior::Fault,
            Behavior::Verdict(true),
            Behavior::Verdict(true),
        );
        let f = fixture(starter, CountingSubscriber::new(true));
        let instance = sample_instance(false);

        let err = f.orchestrator.start(&instance).await.unwrap_err();
        assert!(matches!(err, LifecycleError::LaunchFailed));
        assert_eq!(instance.state().await, LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn hung_starter_times_out_as_launch_failure() {
        let starter = FakeStarter::with(
            Behavior::Hang,
            Behavior::Verdict(true),
            Behavior::Verdict(true),
        );
        let f = fixture(starter, CountingSubscriber::new(true));
        let instance = sample_instance(false);

        let err = f.orchestrator.start(&instance).await.unwrap_err();
        assert!(matches!(err, LifecycleError::LaunchFailed));
        assert_eq!(instance.state().await, LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn stop_veto_keeps_current_state() {
        let f = fixture(FakeStarter::happy(), CountingSubscriber::new(true));
        let instance = sample_instance(false);
        f.orchestrator.start(&instance).await.expect("start");

        // Same gatekeeper, now vetoing stops as well.
        let veto = fixture(FakeStarter::happy(), CountingSubscriber::new(false));
        let err = veto.orchestrator.stop(&instance).await.unwrap_err();
        assert!(matches!(err, LifecycleError::PluginRejected(_)));
        assert_eq!(instance.state().await, LifecycleState::Running);
    }

    #[tokio::test]
    async fn stop_failure_restores_previous_state() {
        let starter = FakeStarter::with(
            Behavior::Verdict(true),
            Behavior::Verdict(false),
            Behavior::Verdict(true),
        );
        let f = fixture(starter, CountingSubscriber::new(true));
        let instance = sample_instance(false);
        f.orchestrator.start(&instance).await.expect("start");

        let err = f.orchestrator.stop(&instance).await.unwrap_err();
        assert!(matches!(err, LifecycleError::StopFailed));
        assert_eq!(instance.state().await, LifecycleState::Running);
    }

    #[tokio::test]
    async fn stop_succeeds_through_the_starter() {
        let f = fixture(FakeStarter::happy(), CountingSubscriber::new(true));
        let instance = sample_instance(false);
        f.orchestrator.start(&instance).await.expect("start");

        f.orchestrator.stop(&instance).await.expect("stop");
        assert!(f.starter.calls().await.contains(&"stop".to_string()));
    }

    #[tokio::test]
    async fn send_input_requires_running_state() {
        let f = fixture(FakeStarter::happy(), CountingSubscriber::new(true));
        let instance = sample_instance(false);

        let err = f.orchestrator.send_input(&instance, "say hi").await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotRunning));
        assert!(f.starter.calls().await.is_empty());

        f.orchestrator.start(&instance).await.expect("start");
        f.orchestrator
            .send_input(&instance, "say hi")
            .await
            .expect("send input");
        assert!(f.starter.calls().await.contains(&"input say hi".to_string()));
    }

    #[tokio::test]
    async fn started_notification_reaches_subscribers_eventually() {
        let started = CountingSubscriber::new(true);
        let f = fixture(FakeStarter::happy(), CountingSubscriber::new(true));

        // Rebuild the fixture's bus with an extra subscriber on "started".
        let mut bus = EventBus::new();
        bus.register(bus::STARTED, "observer", started.clone());
        let orchestrator = Orchestrator::new(
            f.orchestrator.cores.clone(),
            f.orchestrator.starters.clone(),
            Arc::new(bus),
            f.orchestrator.store.clone(),
            f.orchestrator.settings.clone(),
        );

        let instance = sample_instance(false);
        orchestrator.start(&instance).await.expect("start");

        let mut seen = false;
        for _ in 0..50 {
            if started.hits() > 0 {
                seen = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(seen, "started notification never arrived");
    }

    #[tokio::test]
    async fn input_notification_carries_the_delivered_text() {
        struct CapturingSubscriber {
            events: Mutex<Vec<LifecycleEvent>>,
        }

        #[async_trait]
        impl EventSubscriber for CapturingSubscriber {
            async fn handle(&self, event: LifecycleEvent) -> Result<bool, SubscriberError> {
                self.events.lock().await.push(event);
                Ok(true)
            }
        }

        let observer = Arc::new(CapturingSubscriber {
            events: Mutex::new(Vec::new()),
        });
        let f = fixture(FakeStarter::happy(), CountingSubscriber::new(true));

        let mut bus = EventBus::new();
        bus.register(bus::INPUT, "observer", observer.clone());
        let orchestrator = Orchestrator::new(
            f.orchestrator.cores.clone(),
            f.orchestrator.starters.clone(),
            Arc::new(bus),
            f.orchestrator.store.clone(),
            f.orchestrator.settings.clone(),
        );

        let instance = sample_instance(false);
        orchestrator.start(&instance).await.expect("start");
        orchestrator
            .send_input(&instance, "say hi")
            .await
            .expect("send input");

        let mut captured = None;
        for _ in 0..50 {
            if let Some(event) = observer.events.lock().await.first().cloned() {
                captured = Some(event);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let event = captured.expect("input notification never arrived");
        assert_eq!(event.name, bus::INPUT);
        assert_eq!(event.server_id, 7);
        assert_eq!(event.input.as_deref(), Some("say hi"));
    }

    #[tokio::test]
    async fn autostart_only_touches_flagged_instances() {
        let f = fixture(FakeStarter::happy(), CountingSubscriber::new(true));

        let flagged = sample_instance(false);
        let mut data = flagged.data.clone();
        data.auto_start = true;
        data.id = 8;
        let flagged = Arc::new(ServerInstance::new(
            data,
            flagged.start.read().await.clone(),
        ));
        let unflagged = sample_instance(false);

        f.orchestrator
            .autostart(&[flagged.clone(), unflagged.clone()])
            .await;

        assert_eq!(flagged.state().await, LifecycleState::Running);
        assert_eq!(unflagged.state().await, LifecycleState::Stopped);
    }
}
