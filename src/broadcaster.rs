//! Multicast fan-out of market-data events to dynamic sinks.
//!
//! There is no backpressure: a sink that cannot keep up is expected to
//! report failure (e.g. a dropped receiver) and gets evicted.

use std::sync::Mutex;

use tracing::warn;

use crate::manager::MarketDataEvent;

pub trait Sink: Send {
    /// Deliver one event. An `Err` return evicts this sink.
    fn send(&mut self, event: &MarketDataEvent) -> Result<(), ()>;
}

pub struct ChannelSink(pub tokio::sync::mpsc::UnboundedSender<MarketDataEvent>);

impl Sink for ChannelSink {
    fn send(&mut self, event: &MarketDataEvent) -> Result<(), ()> {
        self.0.send(event.clone()).map_err(|_| ())
    }
}

#[derive(Default)]
pub struct Broadcaster {
    sinks: Mutex<Vec<Box<dyn Sink>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sink: Box<dyn Sink>) {
        self.sinks.lock().unwrap().push(sink);
    }

    /// Fans `event` out to every registered sink, evicting any that fail.
    pub fn publish(&self, event: &MarketDataEvent) {
        let mut sinks = self.sinks.lock().unwrap();
        sinks.retain_mut(|sink| match sink.send(event) {
            Ok(()) => true,
            Err(()) => {
                warn!("broadcaster: evicting sink after send failure");
                false
            }
        });
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }
}
