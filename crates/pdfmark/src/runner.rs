use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pdfmark_engine::{EngineConfig, EngineError, EngineEvent, EventSink, Invocation};

use crate::prelude::{eprintln, *};
use crate::progress::Renderer;

/// Forwards engine events to the renderer and relays Ctrl-C back.
struct ChannelSink {
    tx: async_channel::Sender<EngineEvent>,
    cancel: Arc<AtomicBool>,
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: EngineEvent) {
        // A closed channel means the renderer is gone; keep working.
        let _ = self.tx.send_blocking(event);
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Validate and run one invocation, rendering its events as they arrive.
///
/// The engine is synchronous, so it runs on the blocking pool and streams its
/// events back over a channel. Ctrl-C asks the engine to stop at the next
/// page or stage and waits for it, so no output or temp file is left behind.
pub async fn execute(invocation: Invocation, global: &crate::Global) -> Result<()> {
    let mut renderer = Renderer::new(global.json);

    let config = match EngineConfig::from_invocation(&invocation) {
        Ok(config) => config,
        Err(err) => {
            let failure = err.to_failure();
            renderer.render(&EngineEvent::Failed {
                failure: failure.clone(),
            });
            return Err(run_failed(&failure));
        }
    };

    let (tx, rx) = async_channel::unbounded::<EngineEvent>();
    let cancel = Arc::new(AtomicBool::new(false));
    let mut sink = ChannelSink {
        tx,
        cancel: Arc::clone(&cancel),
    };
    let worker = tokio::task::spawn_blocking(move || pdfmark_engine::run(&config, &mut sink));

    let render = async {
        while let Ok(event) = rx.recv().await {
            renderer.render(&event);
        }
    };

    let run = async { tokio::join!(worker, render) };
    tokio::pin!(run);
    let (outcome, ()) = tokio::select! {
        finished = &mut run => finished,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Cancelling...");
            cancel.store(true, Ordering::SeqCst);
            run.await
        }
    };

    match outcome {
        Ok(Ok(_summary)) => Ok(()),
        Ok(Err(EngineError::Cancelled)) => Err(Error::Cancelled.into()),
        Ok(Err(err)) => Err(run_failed(&err.to_failure())),
        Err(join_error) => Err(Error::WorkerCrashed(join_error.to_string()).into()),
    }
}

fn run_failed(failure: &pdfmark_engine::Failure) -> color_eyre::eyre::Report {
    let kind = serde_json::to_value(failure.error_kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| f!("{:?}", failure.error_kind));
    Error::RunFailed {
        kind,
        message: failure.message.clone(),
    }
    .into()
}
