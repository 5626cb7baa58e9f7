//! Background duration probing.
//!
//! Newly dropped audio clips get a placeholder duration. A worker thread
//! measures the real one and reports it through the session inbox, where it
//! is applied on the next frame.

use crossbeam_channel::{unbounded, Sender};
use std::thread;
use tracing::{debug, warn};
use vjstudio_core::{InboundMessage, Result, VjError};
use vjstudio_timeline::ProbeRequest;

/// Measures the natural duration of a media file.
pub trait DurationProbe: Send + 'static {
    fn probe(&self, path: &str) -> Result<f64>;
}

impl<F> DurationProbe for F
where
    F: Fn(&str) -> Result<f64> + Send + 'static,
{
    fn probe(&self, path: &str) -> Result<f64> {
        self(path)
    }
}

/// Owns the probe thread. Dropping it stops the thread.
pub struct ProbeWorker {
    requests: Option<Sender<ProbeRequest>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ProbeWorker {
    /// Start the worker. Results go to `inbox` as
    /// [`InboundMessage::DurationProbed`].
    pub fn spawn(probe: impl DurationProbe, inbox: Sender<InboundMessage>) -> Result<Self> {
        let (tx, rx) = unbounded::<ProbeRequest>();
        let handle = thread::Builder::new()
            .name("duration-probe".into())
            .spawn(move || {
                for request in rx {
                    match probe.probe(&request.path) {
                        Ok(duration) if duration.is_finite() && duration > 0.0 => {
                            debug!(
                                "Probed {}: {:.3}s for clip {}",
                                request.path, duration, request.clip_id
                            );
                            let message = InboundMessage::DurationProbed {
                                clip_id: request.clip_id,
                                duration,
                            };
                            if inbox.send(message).is_err() {
                                break;
                            }
                        }
                        Ok(duration) => {
                            debug!("Ignoring probed duration {} for {}", duration, request.path)
                        }
                        Err(e) => warn!("Duration probe failed for {}: {}", request.path, e),
                    }
                }
            })
            .map_err(|e| VjError::Media(format!("Failed to start duration probe: {}", e)))?;
        Ok(Self {
            requests: Some(tx),
            handle: Some(handle),
        })
    }

    /// Queue a request. Returns false once the worker has stopped.
    pub fn request(&self, request: ProbeRequest) -> bool {
        self.requests
            .as_ref()
            .is_some_and(|tx| tx.send(request).is_ok())
    }

    /// Stop accepting requests and wait for the thread to finish.
    pub fn shutdown(&mut self) {
        self.requests = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Duration probe thread panicked");
            }
        }
    }
}

impl Drop for ProbeWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
