//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use yagpdb_runner::cli::RunFlags;
use yagpdb_runner::common::StopSignal;
use yagpdb_runner::config::schema::StoreConfig;
use yagpdb_runner::config::AppConfig;
use yagpdb_runner::lifecycle::{initialize, Dependencies, Initialized, RunMode};
use yagpdb_runner::plugins::builtin::plugins_for;
use yagpdb_runner::plugins::{Plugin, PluginError, PluginRegistry, RegistrationContext};
use yagpdb_runner::subsystems::{Subsystem, SubsystemError, SubsystemKind, SubsystemProvider};

/// Timestamped log shared by fakes.
#[derive(Default)]
pub struct Recorder {
    entries: Mutex<Vec<(Instant, String)>>,
}

impl Recorder {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap()
            .push((Instant::now(), entry.into()));
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn time_of(&self, entry: &str) -> Option<Instant> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|(_, e)| e == entry)
            .map(|(t, _)| *t)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().unwrap().iter().filter(|(_, e)| e == entry).count()
    }
}

/// How a fake subsystem behaves when stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBehavior {
    #[default]
    Clean,
    /// `stop()` returns an error, but the subsystem still exits.
    Fails,
    /// `stop()` succeeds, but `run()` never returns.
    Hangs,
}

pub struct FakeSubsystem {
    kind: SubsystemKind,
    behavior: StopBehavior,
    recorder: Arc<Recorder>,
    stop: StopSignal,
    pub stops: AtomicUsize,
}

#[async_trait]
impl Subsystem for FakeSubsystem {
    fn kind(&self) -> SubsystemKind {
        self.kind
    }

    async fn run(self: Arc<Self>) -> Result<(), SubsystemError> {
        self.recorder.record(format!("run:{}", self.kind));
        if self.behavior == StopBehavior::Hangs {
            std::future::pending::<()>().await;
        }
        self.stop.wait().await;
        self.recorder.record(format!("exit:{}", self.kind));
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.recorder.record(format!("stop:{}", self.kind));
        self.stop.trigger();
        match self.behavior {
            StopBehavior::Fails => Err(SubsystemError::Other("stop failed".into())),
            _ => Ok(()),
        }
    }
}

/// Builds fake subsystems and remembers them.
#[derive(Default)]
pub struct FakeProvider {
    pub recorder: Arc<Recorder>,
    pub behaviors: Vec<(SubsystemKind, StopBehavior)>,
    pub built: Mutex<Vec<Arc<FakeSubsystem>>>,
}

impl FakeProvider {
    pub fn with_behavior(kind: SubsystemKind, behavior: StopBehavior) -> Self {
        Self {
            behaviors: vec![(kind, behavior)],
            ..Default::default()
        }
    }

    fn build(&self, kind: SubsystemKind) -> Result<Arc<dyn Subsystem>, SubsystemError> {
        let behavior = self
            .behaviors
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, b)| *b)
            .unwrap_or_default();
        let subsystem = Arc::new(FakeSubsystem {
            kind,
            behavior,
            recorder: self.recorder.clone(),
            stop: StopSignal::new(),
            stops: AtomicUsize::new(0),
        });
        self.built.lock().unwrap().push(subsystem.clone());
        Ok(subsystem)
    }

    pub fn stops(&self) -> Vec<(SubsystemKind, usize)> {
        self.built
            .lock()
            .unwrap()
            .iter()
            .map(|s| (s.kind, s.stops.load(Ordering::SeqCst)))
            .collect()
    }
}

impl SubsystemProvider for FakeProvider {
    fn bot(&self) -> Result<Arc<dyn Subsystem>, SubsystemError> {
        self.build(SubsystemKind::BotConnection)
    }

    fn web(&self) -> Result<Arc<dyn Subsystem>, SubsystemError> {
        self.build(SubsystemKind::WebServer)
    }

    fn feeds(&self, _names: &BTreeSet<String>) -> Result<Arc<dyn Subsystem>, SubsystemError> {
        self.build(SubsystemKind::FeedPool)
    }
}

/// Plugin that records its registration hook.
pub struct RecordingPlugin {
    pub name: &'static str,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn register(&self, ctx: &RegistrationContext<'_>) -> Result<(), PluginError> {
        ctx.table(&format!("{}_settings", self.name))?;
        self.log.lock().unwrap().push(self.name.to_string());
        Ok(())
    }
}

/// Config rooted in `dir`, bound to an ephemeral port, in testing mode.
pub fn test_config(dir: &tempfile::TempDir) -> AppConfig {
    let mut config = AppConfig {
        store: StoreConfig {
            data_dir: dir.path().to_string_lossy().into_owned(),
        },
        testing: true,
        ..Default::default()
    };
    config.web.bind_address = "127.0.0.1:0".into();
    config
}

pub fn flags(bot: bool, web: bool, feeds: Option<&str>) -> RunFlags {
    RunFlags {
        bot,
        web,
        feeds: feeds.map(String::from),
        ..Default::default()
    }
}

pub fn resolve(config: &AppConfig, flags: &RunFlags) -> RunMode {
    RunMode::resolve(flags, &config.pool, &config.feeds).unwrap()
}

/// Fully initialized dependencies with the built-in plugins.
pub async fn ready_deps(config: &AppConfig, flags: &RunFlags) -> Arc<Dependencies> {
    let mode = resolve(config, flags);
    let registry = PluginRegistry::from_plugins(plugins_for(&mode)).unwrap();
    match initialize(&mode, config, registry).await.unwrap() {
        Initialized::Ready(deps) => Arc::new(deps),
        Initialized::DryRun(_) => panic!("expected a non-dry run"),
    }
}
