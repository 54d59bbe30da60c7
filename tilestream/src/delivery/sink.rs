//! Delivery channel between worker threads and the consumer thread.

use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::chain::TileError;
use crate::coord::TileKey;
use crate::tile::TileImage;

/// Result handed to a tile consumer.
pub type TileOutcome = Result<TileImage, TileError>;

/// Consumer callback. Runs exactly once, on the delivery thread.
///
/// Callbacks wait in the shared in-flight table, hence `Sync`.
pub type TileCallback = Box<dyn FnOnce(TileOutcome) + Send + Sync>;

/// One finished request and everyone waiting on it.
pub struct TileDelivery {
    pub key: TileKey,
    pub outcome: TileOutcome,
    pub callbacks: Vec<TileCallback>,
}

/// Events posted to the delivery thread.
pub enum DeliveryEvent {
    /// A request finished.
    Tile(TileDelivery),
    /// A tile was invalidated and must be repainted.
    Invalidated(TileKey),
    /// The pipeline went from idle to busy.
    LoadingStarted,
    /// The pipeline drained.
    LoadingFinished,
}

/// Cloneable sending half, held by the chain and its workers.
#[derive(Clone)]
pub struct DeliverySink {
    tx: UnboundedSender<DeliveryEvent>,
}

impl DeliverySink {
    /// Post a finished request.
    pub fn deliver(&self, key: TileKey, outcome: TileOutcome, callbacks: Vec<TileCallback>) {
        self.send(DeliveryEvent::Tile(TileDelivery {
            key,
            outcome,
            callbacks,
        }));
    }

    pub fn invalidate(&self, key: TileKey) {
        self.send(DeliveryEvent::Invalidated(key));
    }

    pub fn loading_started(&self) {
        self.send(DeliveryEvent::LoadingStarted);
    }

    pub fn loading_finished(&self) {
        self.send(DeliveryEvent::LoadingFinished);
    }

    fn send(&self, event: DeliveryEvent) {
        // The receiver is gone once the consumer shut down; nothing to notify
        if self.tx.send(event).is_err() {
            trace!("Delivery receiver dropped, event discarded");
        }
    }
}

/// Screen-side hooks run on the delivery thread.
pub trait RepaintHook: Send {
    /// A tile is ready; mark its screen rectangle dirty.
    fn tile_ready(&mut self, key: &TileKey);

    /// A tile was invalidated.
    fn region_invalidated(&mut self, _key: &TileKey) {}

    fn loading_started(&mut self) {}

    fn loading_finished(&mut self) {}
}

/// Hook that does nothing.
#[derive(Debug, Default)]
pub struct NoRepaint;

impl RepaintHook for NoRepaint {
    fn tile_ready(&mut self, _key: &TileKey) {}
}

/// Receiving half, owned by the single consumer (UI) thread.
///
/// Every callback and hook runs inside one of the `dispatch_*` methods, on
/// the thread that calls them.
pub struct DeliveryReceiver {
    rx: UnboundedReceiver<DeliveryEvent>,
    hook: Box<dyn RepaintHook>,
}

/// Unparks the dispatching thread when the channel has a new event.
struct ThreadWaker(Thread);

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}

/// Create a connected sink and receiver.
pub fn delivery_channel() -> (DeliverySink, DeliveryReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        DeliverySink { tx },
        DeliveryReceiver {
            rx,
            hook: Box::new(NoRepaint),
        },
    )
}

impl DeliveryReceiver {
    pub fn set_repaint_hook(&mut self, hook: impl RepaintHook + 'static) {
        self.hook = Box::new(hook);
    }

    /// Run everything already queued without waiting.
    ///
    /// Returns the number of events handled.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    /// Wait for one event and run it.
    ///
    /// Returns false once every sink has been dropped and the queue is
    /// empty. Must not be called from inside an async runtime.
    pub fn dispatch_blocking(&mut self) -> bool {
        match self.rx.blocking_recv() {
            Some(event) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    /// Wait up to `timeout` for at least one event, then run everything
    /// queued.
    ///
    /// The calling thread parks until a sink posts or the deadline passes.
    /// Returns the number of events handled (0 on timeout or disconnect).
    pub fn dispatch_timeout(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
        let mut cx = Context::from_waker(&waker);

        loop {
            match self.rx.poll_recv(&mut cx) {
                Poll::Ready(Some(event)) => {
                    self.handle(event);
                    return 1 + self.dispatch_pending();
                }
                Poll::Ready(None) => return 0,
                Poll::Pending => {
                    let now = Instant::now();
                    if now >= deadline {
                        return 0;
                    }
                    // Spurious unparks just re-poll
                    thread::park_timeout(deadline - now);
                }
            }
        }
    }

    fn handle(&mut self, event: DeliveryEvent) {
        match event {
            DeliveryEvent::Tile(delivery) => {
                let TileDelivery {
                    key,
                    outcome,
                    callbacks,
                } = delivery;
                trace!(tile = %key, consumers = callbacks.len(), ok = outcome.is_ok(), "Delivering tile");
                let success = outcome.is_ok();
                for callback in callbacks {
                    callback(outcome.clone());
                }
                if success {
                    self.hook.tile_ready(&key);
                }
            }
            DeliveryEvent::Invalidated(key) => self.hook.region_invalidated(&key),
            DeliveryEvent::LoadingStarted => self.hook.loading_started(),
            DeliveryEvent::LoadingFinished => self.hook.loading_finished(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::Provenance;
    use image::{Rgba, RgbaImage};
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl RepaintHook for Recorder {
        fn tile_ready(&mut self, key: &TileKey) {
            self.events.lock().unwrap().push(format!("ready {}", key));
        }

        fn region_invalidated(&mut self, key: &TileKey) {
            self.events.lock().unwrap().push(format!("invalidated {}", key));
        }

        fn loading_started(&mut self) {
            self.events.lock().unwrap().push("started".into());
        }

        fn loading_finished(&mut self) {
            self.events.lock().unwrap().push("finished".into());
        }
    }

    fn tile() -> TileImage {
        TileImage::new(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255])), Provenance::Fetched)
    }

    #[test]
    fn test_callbacks_run_on_dispatching_thread() {
        let (sink, mut receiver) = delivery_channel();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let worker = {
            let sink = sink.clone();
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                let callback: TileCallback = Box::new(move |outcome| {
                    seen.lock()
                        .unwrap()
                        .push((thread::current().id(), outcome.is_ok()));
                });
                sink.deliver(TileKey::new("s", 0, 0, 0), Ok(tile()), vec![callback]);
            })
        };
        worker.join().unwrap();

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(receiver.dispatch_pending(), 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], (thread::current().id(), true));
    }

    #[test]
    fn test_every_consumer_gets_the_outcome() {
        let (sink, mut receiver) = delivery_channel();
        let count = Arc::new(Mutex::new(0));
        let callbacks: Vec<TileCallback> = (0..3)
            .map(|_| {
                let count = Arc::clone(&count);
                Box::new(move |outcome: TileOutcome| {
                    assert!(matches!(outcome, Err(TileError::Dropped)));
                    *count.lock().unwrap() += 1;
                }) as TileCallback
            })
            .collect();

        sink.deliver(TileKey::new("s", 1, 0, 0), Err(TileError::Dropped), callbacks);
        receiver.dispatch_pending();
        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[test]
    fn test_repaint_hook_events() {
        let (sink, mut receiver) = delivery_channel();
        let recorder = Recorder::default();
        receiver.set_repaint_hook(recorder.clone());

        sink.loading_started();
        sink.deliver(TileKey::new("s", 1, 1, 1), Ok(tile()), Vec::new());
        sink.deliver(TileKey::new("s", 1, 0, 1), Err(TileError::NoProviders), Vec::new());
        sink.invalidate(TileKey::new("s", 1, 1, 0));
        sink.loading_finished();
        receiver.dispatch_pending();

        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["started", "ready s/1/1/1", "invalidated s/1/1/0", "finished"]
        );
    }

    #[test]
    fn test_dispatch_timeout() {
        let (sink, mut receiver) = delivery_channel();
        assert_eq!(receiver.dispatch_timeout(Duration::from_millis(10)), 0);

        let delayed = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sink.loading_started();
            sink.loading_finished();
        });
        let started = Instant::now();
        let handled = receiver.dispatch_timeout(Duration::from_secs(30));
        delayed.join().unwrap();
        assert!(handled >= 1);
        // Woken by the post, not by the deadline
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_dispatch_timeout_returns_on_disconnect() {
        let (sink, mut receiver) = delivery_channel();
        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(sink);
        });

        let started = Instant::now();
        assert_eq!(receiver.dispatch_timeout(Duration::from_secs(30)), 0);
        closer.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_dispatch_blocking_ends_when_sinks_dropped() {
        let (sink, mut receiver) = delivery_channel();
        sink.loading_started();
        drop(sink);

        assert!(receiver.dispatch_blocking());
        assert!(!receiver.dispatch_blocking());
    }
}
