//! Single-flight, coalescing recognition queue.
//!
//! Each preview owns one [`DispatchQueue`]: a worker thread and the channel
//! feeding it. Interactive edits can fire many requests per second, but only
//! the newest matters, so [`DispatchQueue::submit`] first drains every request
//! the worker has not started yet and then enqueues the new one. A request
//! already running is never interrupted.
//!
//! Backend failures never reach the producer. The worker logs them and
//! reports empty text, then carries on with the next request.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use camera_ocr::dispatch::{DispatchQueue, Request};
//! # use camera_ocr::engine::{Engines, Recognizer};
//! # use camera_ocr::imaging::ImageContainer;
//! let engines = Arc::new(Engines::default());
//! let mut queue = DispatchQueue::new(Duration::from_secs(10)).unwrap();
//! let image = ImageContainer::decode("meter.jpg").unwrap();
//! queue.submit(Request::new(engines, image, Recognizer::default()));
//! let text = queue.results().recv().unwrap();
//! queue.shutdown();
//! ```

use crate::engine::{Recognize, Recognizer};
use crate::imaging::ImageContainer;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One recognition job: which engine, which image, which options.
#[derive(Clone)]
pub struct Request {
    pub engine: Arc<dyn Recognize>,
    pub image: ImageContainer,
    pub recognizer: Recognizer,
}

impl Request {
    pub fn new(engine: Arc<dyn Recognize>, image: ImageContainer, recognizer: Recognizer) -> Self {
        Self {
            engine,
            image,
            recognizer,
        }
    }
}

enum Message {
    Recognize(Request),
    Shutdown,
}

/// Producer side of a preview's recognition worker.
pub struct DispatchQueue {
    sender: Sender<Message>,
    /// Producer's handle on the queue, used only to drain stale requests.
    pending: Receiver<Message>,
    results: Receiver<String>,
    /// Requests queued or running. Non-zero means busy.
    outstanding: Arc<AtomicUsize>,
    exited: Receiver<()>,
    worker: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl DispatchQueue {
    /// Start the worker thread.
    pub fn new(shutdown_timeout: Duration) -> std::io::Result<Self> {
        let (sender, requests) = unbounded();
        let (result_tx, results) = unbounded();
        let (exit_tx, exited) = unbounded::<()>();
        let outstanding = Arc::new(AtomicUsize::new(0));

        let worker = {
            let requests = requests.clone();
            let outstanding = Arc::clone(&outstanding);
            thread::Builder::new()
                .name("ocr-dispatch".into())
                .spawn(move || {
                    // Dropped on exit, which is what `shutdown` waits for.
                    let _exit = exit_tx;
                    work(requests, result_tx, outstanding);
                })?
        };

        Ok(Self {
            sender,
            pending: requests,
            results,
            outstanding,
            exited,
            worker: Some(worker),
            shutdown_timeout,
        })
    }

    /// Replace whatever is waiting with `request`. Returns how many stale
    /// requests were discarded.
    pub fn submit(&self, request: Request) -> usize {
        if self.worker.is_none() {
            log::warn!("Dispatch queue is shut down, dropping request");
            return 0;
        }
        let discarded = self.discard_pending();
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(Message::Recognize(request)).is_err() {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            log::error!("Dispatch worker is gone, dropping request");
        }
        discarded
    }

    fn discard_pending(&self) -> usize {
        let mut discarded = 0;
        while let Ok(message) = self.pending.try_recv() {
            if let Message::Recognize(_) = message {
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
                discarded += 1;
            }
        }
        if discarded > 0 {
            log::debug!("Discarded {discarded} stale recognition request(s)");
        }
        discarded
    }

    /// Whether a request is queued or running.
    pub fn is_busy(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) > 0
    }

    /// Recognized text, one message per completed request.
    pub fn results(&self) -> &Receiver<String> {
        &self.results
    }

    pub fn try_result(&self) -> Option<String> {
        self.results.try_recv().ok()
    }

    /// Stop the worker, waiting up to the shutdown timeout for it to exit.
    ///
    /// Returns `false` if the worker was still busy when the timeout ran
    /// out; it is then left to finish on its own.
    pub fn shutdown(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return true;
        };
        self.discard_pending();
        // The worker holds the other end, so this cannot fail while it runs.
        let _ = self.sender.send(Message::Shutdown);

        match self.exited.recv_timeout(self.shutdown_timeout) {
            Err(RecvTimeoutError::Disconnected) | Ok(()) => {
                let _ = worker.join();
                log::debug!("Dispatch worker stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Dispatch worker did not stop within {:.1}s",
                    self.shutdown_timeout.as_secs_f64()
                );
                false
            }
        }
    }
}

impl Drop for DispatchQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn work(requests: Receiver<Message>, results: Sender<String>, outstanding: Arc<AtomicUsize>) {
    while let Ok(Message::Recognize(request)) = requests.recv() {
        let algorithm = request.recognizer.algorithm();
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            request.engine.recognize(&request.image, &request.recognizer)
        }));
        let text = match outcome {
            Ok(Ok(text)) => {
                log::info!(
                    "Applying OCR with {algorithm} took {:.3} seconds",
                    started.elapsed().as_secs_f64()
                );
                text
            }
            Ok(Err(e)) => {
                log::error!("{e}");
                String::new()
            }
            Err(_) => {
                log::error!("{algorithm} panicked");
                String::new()
            }
        };
        outstanding.fetch_sub(1, Ordering::SeqCst);
        if results.send(text).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::engine::ssocr::SsocrOptions;
    use crate::engine::tests::MockEngine;
    use crate::imaging::RasterFormat;
    use crate::test_helpers::gradient_grey;
    use std::sync::Mutex;

    const WAIT: Duration = Duration::from_secs(5);

    fn image() -> ImageContainer {
        ImageContainer::new(gradient_grey(8, 8), RasterFormat::Png)
    }

    fn digits(n: i32) -> Recognizer {
        Recognizer::Ssocr(SsocrOptions {
            num_digits: n,
            ..Default::default()
        })
    }

    /// Engine that reports each start and then blocks until released.
    struct GatedEngine {
        started: Sender<()>,
        gate: Receiver<()>,
        calls: Mutex<Vec<i32>>,
    }

    impl Recognize for GatedEngine {
        fn recognize(
            &self,
            _image: &ImageContainer,
            recognizer: &Recognizer,
        ) -> Result<String, EngineError> {
            let Recognizer::Ssocr(options) = recognizer else {
                return Ok(String::new());
            };
            self.calls.lock().unwrap().push(options.num_digits);
            let _ = self.started.send(());
            let _ = self.gate.recv();
            Ok(format!("digits {}", options.num_digits))
        }
    }

    fn gated() -> (Arc<GatedEngine>, Receiver<()>, Sender<()>) {
        let (started_tx, started) = unbounded();
        let (release, gate) = unbounded();
        let engine = Arc::new(GatedEngine {
            started: started_tx,
            gate,
            calls: Mutex::new(Vec::new()),
        });
        (engine, started, release)
    }

    // =========================================================================
    // coalescing
    // =========================================================================

    #[test]
    fn rapid_requests_coalesce_to_the_last() {
        let (engine, started, release) = gated();
        let queue = DispatchQueue::new(WAIT).unwrap();

        queue.submit(Request::new(engine.clone(), image(), digits(1)));
        started.recv_timeout(WAIT).unwrap();

        assert_eq!(queue.submit(Request::new(engine.clone(), image(), digits(2))), 0);
        assert_eq!(queue.submit(Request::new(engine.clone(), image(), digits(3))), 1);
        assert_eq!(queue.submit(Request::new(engine.clone(), image(), digits(4))), 1);
        assert!(queue.is_busy());

        release.send(()).unwrap();
        release.send(()).unwrap();
        assert_eq!(queue.results().recv_timeout(WAIT).unwrap(), "digits 1");
        assert_eq!(queue.results().recv_timeout(WAIT).unwrap(), "digits 4");

        assert_eq!(*engine.calls.lock().unwrap(), vec![1, 4]);
        assert!(!queue.is_busy());
    }

    #[test]
    fn idle_queue_is_not_busy() {
        let queue = DispatchQueue::new(WAIT).unwrap();
        assert!(!queue.is_busy());
        assert_eq!(queue.try_result(), None);
    }

    // =========================================================================
    // error containment
    // =========================================================================

    #[test]
    fn backend_errors_become_empty_text() {
        let engine = Arc::new(MockEngine::replying(vec![
            Err(EngineError::Runtime {
                engine: "ssocr".into(),
                message: "found only 2 of 6 digits".into(),
            }),
            Ok("123456".into()),
        ]));
        let queue = DispatchQueue::new(WAIT).unwrap();

        queue.submit(Request::new(engine.clone(), image(), digits(6)));
        assert_eq!(queue.results().recv_timeout(WAIT).unwrap(), "");
        queue.submit(Request::new(engine.clone(), image(), digits(6)));
        assert_eq!(queue.results().recv_timeout(WAIT).unwrap(), "123456");
        assert_eq!(engine.get_calls().len(), 2);
    }

    struct PanickingEngine;

    impl Recognize for PanickingEngine {
        fn recognize(&self, _: &ImageContainer, _: &Recognizer) -> Result<String, EngineError> {
            panic!("engine exploded")
        }
    }

    #[test]
    fn panicking_backend_does_not_kill_the_worker() {
        let queue = DispatchQueue::new(WAIT).unwrap();
        queue.submit(Request::new(Arc::new(PanickingEngine), image(), digits(1)));
        assert_eq!(queue.results().recv_timeout(WAIT).unwrap(), "");

        let engine = Arc::new(MockEngine::replying(vec![Ok("7".into())]));
        queue.submit(Request::new(engine, image(), digits(1)));
        assert_eq!(queue.results().recv_timeout(WAIT).unwrap(), "7");
    }

    // =========================================================================
    // shutdown
    // =========================================================================

    #[test]
    fn shutdown_stops_idle_worker() {
        let mut queue = DispatchQueue::new(WAIT).unwrap();
        assert!(queue.shutdown());
        assert!(queue.shutdown());
        let engine = Arc::new(MockEngine::default());
        assert_eq!(queue.submit(Request::new(engine.clone(), image(), digits(1))), 0);
        assert!(engine.get_calls().is_empty());
    }

    #[test]
    fn shutdown_gives_up_on_stuck_backend() {
        let (engine, started, release) = gated();
        let mut queue = DispatchQueue::new(Duration::from_millis(50)).unwrap();
        queue.submit(Request::new(engine.clone(), image(), digits(1)));
        started.recv_timeout(WAIT).unwrap();

        assert!(!queue.shutdown());
        drop(release);
    }

    #[test]
    fn shutdown_drops_requests_not_yet_started() {
        let (engine, started, release) = gated();
        let mut queue = DispatchQueue::new(WAIT).unwrap();
        queue.submit(Request::new(engine.clone(), image(), digits(1)));
        started.recv_timeout(WAIT).unwrap();
        queue.submit(Request::new(engine.clone(), image(), digits(2)));

        release.send(()).unwrap();
        assert!(queue.shutdown());
        assert_eq!(*engine.calls.lock().unwrap(), vec![1]);
    }
}
