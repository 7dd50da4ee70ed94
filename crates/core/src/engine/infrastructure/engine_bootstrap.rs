use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::detection::domain::face_detector::DetectorError;
use crate::engine::domain::asset_fetcher::ProgressFn;
use crate::engine::domain::engine_slot::EngineSlot;
use crate::engine::infrastructure::asset_loader::AssetLoader;
use crate::shared::engine_kind::EngineKind;

/// Lifecycle notifications emitted while engines load.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Progress {
        engine: EngineKind,
        downloaded: u64,
        total: u64,
    },
    Ready(EngineKind),
    Failed { engine: EngineKind, reason: String },
}

impl EngineEvent {
    pub fn engine(&self) -> EngineKind {
        match self {
            EngineEvent::Progress { engine, .. } | EngineEvent::Failed { engine, .. } => *engine,
            EngineEvent::Ready(engine) => *engine,
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, EngineEvent::Progress { .. })
    }
}

/// Hands a builder a way to report download progress for its engine.
#[derive(Clone)]
pub struct ProgressReporter {
    engine: EngineKind,
    events: Sender<EngineEvent>,
}

impl ProgressReporter {
    pub fn report(&self, downloaded: u64, total: u64) {
        let _ = self.events.send(EngineEvent::Progress {
            engine: self.engine,
            downloaded,
            total,
        });
    }

    pub fn into_progress_fn(self) -> ProgressFn {
        Box::new(move |downloaded, total| self.report(downloaded, total))
    }
}

/// Builds one engine's detector, resolving assets through the shared loader.
pub type EngineBuilder<D> =
    Box<dyn FnOnce(&AssetLoader, ProgressReporter) -> Result<D, DetectorError> + Send>;

/// Loads both engines in the background at startup.
///
/// Each engine gets its own thread so a slow download for one never delays
/// the other. [`EngineBootstrap::wait`] applies exactly one status
/// transition per engine.
pub struct EngineBootstrap<C, N> {
    events: Receiver<EngineEvent>,
    classical: JoinHandle<Result<C, String>>,
    neural: JoinHandle<Result<N, String>>,
}

impl<C, N> EngineBootstrap<C, N>
where
    C: Send + 'static,
    N: Send + 'static,
{
    pub fn start(
        loader: Arc<AssetLoader>,
        classical: EngineBuilder<C>,
        neural: EngineBuilder<N>,
    ) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let classical = spawn_builder(
            EngineKind::Classical,
            Arc::clone(&loader),
            classical,
            tx.clone(),
        );
        let neural = spawn_builder(EngineKind::Neural, loader, neural, tx);
        Self {
            events: rx,
            classical,
            neural,
        }
    }

    /// Blocks until both engines settle, forwarding every event to `on_event`.
    ///
    /// Both slots start out `Loading`; a terminal event joins that engine's
    /// thread and moves its slot to `Ready` or `Error`.
    pub fn wait(self, mut on_event: impl FnMut(&EngineEvent)) -> (EngineSlot<C>, EngineSlot<N>) {
        let mut classical = PendingEngine::new(EngineKind::Classical, self.classical);
        let mut neural = PendingEngine::new(EngineKind::Neural, self.neural);

        while !(classical.is_settled() && neural.is_settled()) {
            // Disconnect means both builder threads are gone (e.g. panicked).
            let Ok(event) = self.events.recv() else {
                break;
            };
            on_event(&event);
            if event.is_terminal() {
                match event.engine() {
                    EngineKind::Classical => classical.settle(),
                    EngineKind::Neural => neural.settle(),
                }
            }
        }

        // Builders that died without a terminal event settle from the join.
        classical.settle();
        neural.settle();
        (classical.slot, neural.slot)
    }
}

/// An engine slot together with the thread still building its detector.
struct PendingEngine<D> {
    slot: EngineSlot<D>,
    handle: Option<JoinHandle<Result<D, String>>>,
}

impl<D> PendingEngine<D> {
    fn new(engine: EngineKind, handle: JoinHandle<Result<D, String>>) -> Self {
        Self {
            slot: EngineSlot::loading(engine),
            handle: Some(handle),
        }
    }

    fn is_settled(&self) -> bool {
        self.slot.status().is_settled()
    }

    /// Joins the builder thread once and applies its single status transition.
    fn settle(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let label = self.slot.kind().label();
        let transition = match handle.join() {
            Ok(Ok(detector)) => {
                log::info!("{label} engine ready");
                self.slot.mark_ready(detector)
            }
            Ok(Err(reason)) => {
                log::warn!("{label} engine failed to load: {reason}");
                self.slot.mark_failed(reason)
            }
            Err(_) => {
                log::warn!("{label} engine loader panicked");
                self.slot.mark_failed("engine loader panicked")
            }
        };
        if let Err(e) = transition {
            log::error!("{label} engine: {e}");
        }
    }
}

fn spawn_builder<D: Send + 'static>(
    engine: EngineKind,
    loader: Arc<AssetLoader>,
    builder: EngineBuilder<D>,
    events: Sender<EngineEvent>,
) -> JoinHandle<Result<D, String>> {
    thread::spawn(move || {
        let reporter = ProgressReporter {
            engine,
            events: events.clone(),
        };
        let result = builder(&loader, reporter).map_err(|e| e.to_string());
        let event = match &result {
            Ok(_) => EngineEvent::Ready(engine),
            Err(reason) => EngineEvent::Failed {
                engine,
                reason: reason.clone(),
            },
        };
        let _ = events.send(event);
        result
    })
}
