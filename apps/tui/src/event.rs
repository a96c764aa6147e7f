//! Event handling for the TUI.
//!
//! Provides an event loop that captures keyboard and terminal events.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, KeyEvent, KeyEventKind};

/// Terminal events.
#[derive(Debug, Clone)]
pub enum Event {
    /// Periodic tick, drives observer draining and the progress gauge.
    Tick,
    /// Key press.
    Key(KeyEvent),
    /// Terminal resize.
    #[allow(dead_code)]
    Resize(u16, u16),
}

/// Event handler that runs in a background thread.
pub struct EventHandler {
    receiver: mpsc::Receiver<Event>,
}

impl EventHandler {
    /// Create a new event handler with the specified tick rate.
    pub fn new(tick_rate_ms: u64) -> Self {
        let tick_rate = Duration::from_millis(tick_rate_ms);
        let (sender, receiver) = mpsc::channel();

        thread::spawn(move || {
            let mut last_tick = Instant::now();
            loop {
                let timeout = tick_rate.saturating_sub(last_tick.elapsed());

                if event::poll(timeout).unwrap_or(false)
                    && let Ok(evt) = event::read()
                {
                    let event = match evt {
                        // Windows reports releases too
                        event::Event::Key(key) if key.kind == KeyEventKind::Press => {
                            Some(Event::Key(key))
                        }
                        event::Event::Resize(w, h) => Some(Event::Resize(w, h)),
                        _ => None,
                    };
                    if let Some(e) = event
                        && sender.send(e).is_err()
                    {
                        break;
                    }
                }

                if last_tick.elapsed() >= tick_rate {
                    if sender.send(Event::Tick).is_err() {
                        break;
                    }
                    last_tick = Instant::now();
                }
            }
        });

        Self { receiver }
    }

    /// Get the next event, blocking.
    pub fn next(&self) -> Result<Event> {
        Ok(self.receiver.recv()?)
    }
}
