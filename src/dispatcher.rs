//! # Dispatcher
//!
//! Feeds exactly `request_count` requests into the shared request channel.
//!
//! The generator runs sequentially on the dispatcher task, so request
//! construction sits on the critical path of feeding workers. With a
//! capacity-1 channel the dispatcher stays at most one request ahead of the
//! slowest idle worker.
//!
//! Dropping the sender when the loop ends closes the channel; workers drain
//! whatever is left and then exit.

use crate::executor::RequestGenerator;
use crate::shutdown::Shutdown;
use async_channel::Sender;
use tracing::debug;

/// How the dispatcher loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// Every request was handed to the channel
    Exhausted,
    /// Stopped early by the shutdown signal
    Cancelled,
    /// Every receiver was dropped before all requests were sent
    Disconnected,
}

/// Produces a bounded stream of requests onto a channel
pub struct Dispatcher<G> {
    request_count: u64,
    generator: G,
}

impl<G> Dispatcher<G> {
    pub fn new(request_count: u64, generator: G) -> Self {
        Self {
            request_count,
            generator,
        }
    }

    /// Generate and send every request, then close the channel
    ///
    /// Returns the number of requests sent alongside how the loop ended.
    /// A panic in the generator is not caught.
    pub async fn run<R>(
        mut self,
        requests: Sender<R>,
        shutdown: Option<Shutdown>,
    ) -> (u64, DispatchStatus)
    where
        G: RequestGenerator<R>,
        R: Send + 'static,
    {
        let mut sent = 0u64;
        let mut status = DispatchStatus::Exhausted;

        while sent < self.request_count {
            if shutdown.as_ref().is_some_and(Shutdown::is_triggered) {
                status = DispatchStatus::Cancelled;
                break;
            }

            let request = self.generator.generate();

            let delivered = match &shutdown {
                Some(signal) => tokio::select! {
                    biased;
                    _ = signal.triggered() => {
                        status = DispatchStatus::Cancelled;
                        break;
                    }
                    result = requests.send(request) => result.is_ok(),
                },
                None => requests.send(request).await.is_ok(),
            };

            if !delivered {
                status = DispatchStatus::Disconnected;
                break;
            }
            sent += 1;
        }

        requests.close();
        debug!(sent, ?status, "Dispatcher finished");
        (sent, status)
    }
}
