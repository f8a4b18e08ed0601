// src/engine.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info, warn};

use crate::config::PipelineConfig;
use crate::dsp::{FlowPipeline, PipelineError, SampleChunk, SampleSource};
use crate::types::{EngineCommand, EngineEvent};

// Chunks in flight between the ingestion and processing threads
const QUEUE_DEPTH: usize = 16;

/// Owner-side handle to a running ingestion/processing thread pair.
pub struct PipelineHandle {
    stop: Arc<AtomicBool>,
    commands: Sender<EngineCommand>,
    events: Receiver<EngineEvent>,
    ingest: Option<JoinHandle<()>>,
    process: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn events(&self) -> &Receiver<EngineEvent> {
        &self.events
    }

    pub fn send(&self, command: EngineCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Stops pulling samples, lets the in-flight epoch finish, then joins both threads.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.join_threads();
    }

    /// Waits for the source to run dry.
    pub fn join(mut self) {
        self.join_threads();
    }

    fn join_threads(&mut self) {
        for handle in [self.ingest.take(), self.process.take()].into_iter().flatten() {
            if handle.join().is_err() {
                error!("pipeline thread panicked");
            }
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.join_threads();
    }
}

/// Builds the pipeline (failing fast on bad configuration) and starts both threads.
pub fn spawn_pipeline<S>(config: PipelineConfig, source: S) -> Result<PipelineHandle, PipelineError>
where
    S: SampleSource + Send + 'static,
{
    let pipeline = FlowPipeline::new(config)?;
    let stop = Arc::new(AtomicBool::new(false));
    let (chunk_tx, chunk_rx) = mpsc::sync_channel::<SampleChunk>(QUEUE_DEPTH);
    let (cmd_tx, cmd_rx) = mpsc::channel::<EngineCommand>();
    let (event_tx, event_rx) = mpsc::channel::<EngineEvent>();

    let ingest_stop = Arc::clone(&stop);
    let ingest = thread::spawn(move || ingest_loop(source, chunk_tx, ingest_stop));
    let process_stop = Arc::clone(&stop);
    let process =
        thread::spawn(move || process_loop(pipeline, chunk_rx, cmd_rx, event_tx, process_stop));

    Ok(PipelineHandle {
        stop,
        commands: cmd_tx,
        events: event_rx,
        ingest: Some(ingest),
        process: Some(process),
    })
}

fn ingest_loop<S: SampleSource>(mut source: S, tx: SyncSender<SampleChunk>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        match source.next_chunk() {
            Ok(Some(chunk)) => {
                if tx.send(chunk).is_err() {
                    break;
                }
            }
            Ok(None) => {
                info!("sample source exhausted");
                break;
            }
            Err(err) => {
                error!("sample source failed: {err}");
                break;
            }
        }
    }
    // Dropping the sender closes the channel; the processor sees end-of-stream.
}

fn process_loop(
    mut pipeline: FlowPipeline,
    rx: Receiver<SampleChunk>,
    commands: Receiver<EngineCommand>,
    events: Sender<EngineEvent>,
    stop: Arc<AtomicBool>,
) {
    'outer: while let Ok(chunk) = rx.recv() {
        loop {
            match commands.try_recv() {
                Ok(EngineCommand::SetMode(mode)) => pipeline.set_mode(mode),
                Ok(EngineCommand::SetRecoveryScore(score)) => pipeline.set_recovery_score(score),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if let Err(err) = pipeline.push_samples(&chunk) {
            warn!("dropping chunk at {:.3}s: {err}", chunk.started_at);
            continue;
        }
        if pipeline.latest_metrics().is_none() && pipeline.samples_until_ready() > 0 {
            let required = pipeline.config().epoch_samples();
            let available = pipeline.buffered_samples();
            if events.send(EngineEvent::Buffering { available, required }).is_err() {
                break;
            }
        }
        while pipeline.samples_until_ready() == 0 {
            match pipeline.process_epoch() {
                Ok(report) => {
                    if events.send(EngineEvent::Epoch(Box::new(report))).is_err() {
                        break 'outer;
                    }
                }
                Err(PipelineError::InsufficientData { required, available }) => {
                    if events.send(EngineEvent::Buffering { available, required }).is_err() {
                        break 'outer;
                    }
                    break;
                }
                Err(err) => {
                    warn!("epoch skipped: {err}");
                    break;
                }
            }
            thread::yield_now();
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }
    }
    let epochs = pipeline.epochs_processed();
    pipeline.reset();
    info!("pipeline stopped after {epochs} epochs");
    events.send(EngineEvent::Stopped { epochs }).ok();
}
