//! Progress reporting seam.
//!
//! The engine never talks to a UI directly; it reports through a
//! [`ProgressSink`]. Every method has a no-op default, so sinks only override
//! what they display.

use std::fmt;

/// The two progress indicators a front end may show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressBar {
    /// Population building.
    Primary,
    /// Per-generation evaluation.
    Secondary,
}

/// Receiver of progress notifications. Called from worker threads.
pub trait ProgressSink: Send + Sync {
    /// A loop of `max` steps starts on `bar`.
    fn init_loop(&self, _bar: ProgressBar, _max: usize) {}

    /// One step of the loop on `bar` completed.
    fn increment_loop(&self, _bar: ProgressBar) {}

    /// A short-lived status message.
    fn transient(&self, _message: &str) {}

    /// The best-results list changed.
    fn top_changed(&self) {}
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {}

/// A single notification, as delivered to [`CallbackProgress`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    InitLoop { bar: ProgressBar, max: usize },
    Increment(ProgressBar),
    Message(String),
    TopChanged,
}

/// Progress callback type.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Adapts a closure into a [`ProgressSink`].
pub struct CallbackProgress {
    callback: ProgressCallback,
}

impl CallbackProgress {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl fmt::Debug for CallbackProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackProgress").finish_non_exhaustive()
    }
}

impl ProgressSink for CallbackProgress {
    fn init_loop(&self, bar: ProgressBar, max: usize) {
        (self.callback)(ProgressEvent::InitLoop { bar, max });
    }

    fn increment_loop(&self, bar: ProgressBar) {
        (self.callback)(ProgressEvent::Increment(bar));
    }

    fn transient(&self, message: &str) {
        (self.callback)(ProgressEvent::Message(message.to_string()));
    }

    fn top_changed(&self) {
        (self.callback)(ProgressEvent::TopChanged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_callback_receives_events_in_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let events = Arc::clone(&events);
            CallbackProgress::new(move |e| events.lock().unwrap().push(e))
        };

        sink.init_loop(ProgressBar::Primary, 3);
        sink.increment_loop(ProgressBar::Primary);
        sink.transient("hello");
        sink.top_changed();

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                ProgressEvent::InitLoop {
                    bar: ProgressBar::Primary,
                    max: 3
                },
                ProgressEvent::Increment(ProgressBar::Primary),
                ProgressEvent::Message("hello".into()),
                ProgressEvent::TopChanged,
            ]
        );
    }

    #[test]
    fn test_null_progress_is_silent() {
        let sink: Box<dyn ProgressSink> = Box::new(NullProgress);
        sink.init_loop(ProgressBar::Secondary, 10);
        sink.transient("ignored");
    }
}
