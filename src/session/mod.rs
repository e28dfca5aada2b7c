//! Device session: feeds companion-radio events into the correlation store.
//!
//! The transport (BLE, serial, a capture file) is out of scope here. Whatever
//! reads the device pushes [`DeviceEvent`]s into an unbounded channel and
//! [`DeviceSession::run`] drains it. The session is the only producer and the
//! only caller of the startup barrier.

pub mod replay;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::correlation::{DecodedMessageEvent, RawFrameEvent};
use crate::engine::EventSink;
use crate::logutil::escape_log;
use crate::route::{Contact, ContactBook};

/// One event as reported by the device connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// Device initialisation finished (self info, channels, clock, contacts).
    SessionReady,
    RxLog(RawFrameEvent),
    ChannelMessage(DecodedMessageEvent),
    ContactMessage(DecodedMessageEvent),
    Contacts { contacts: Vec<Contact> },
    Disconnected,
}

/// What a session did, returned when it ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub frames: usize,
    pub channel_messages: usize,
    pub contact_messages: usize,
    pub contacts_added: usize,
    pub barrier_passed: bool,
}

pub struct DeviceSession<S: EventSink> {
    sink: S,
    contacts: Arc<ContactBook>,
    summary: SessionSummary,
}

impl<S: EventSink> DeviceSession<S> {
    pub fn new(sink: S, contacts: Arc<ContactBook>) -> Self {
        Self {
            sink,
            contacts,
            summary: SessionSummary::default(),
        }
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    /// Handles one event. Returns `false` once the device has disconnected.
    pub fn handle(&mut self, event: DeviceEvent) -> bool {
        match event {
            DeviceEvent::SessionReady => {
                if self.summary.barrier_passed {
                    debug!("session_ready repeated; startup barrier already passed");
                } else {
                    self.sink.clear_all();
                    self.summary.barrier_passed = true;
                }
            }
            DeviceEvent::RxLog(frame) => {
                self.summary.frames += 1;
                self.sink.on_raw_frame(frame);
            }
            DeviceEvent::ChannelMessage(mut msg) => {
                split_channel_sender(&mut msg);
                self.summary.channel_messages += 1;
                self.sink.on_decoded_message(msg);
            }
            DeviceEvent::ContactMessage(msg) => {
                self.summary.contact_messages += 1;
                self.sink.on_decoded_message(msg);
            }
            DeviceEvent::Contacts { contacts } => {
                let added = self.contacts.merge(contacts);
                self.summary.contacts_added += added;
                info!("contacts refreshed: {} new, {} cached", added, self.contacts.len());
            }
            DeviceEvent::Disconnected => {
                warn!("device disconnected");
                return false;
            }
        }
        true
    }

    /// Drains `rx` until the channel closes, the device disconnects or ctrl-c.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<DeviceEvent>) -> SessionSummary {
        loop {
            tokio::select! {
                ev = rx.recv() => {
                    match ev {
                        Some(event) => {
                            if !self.handle(event) {
                                break;
                            }
                        }
                        None => {
                            debug!("device event channel closed");
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }
        self.summary
    }
}

/// Channel text arrives as `"Name: body"`. Moves the name into the sender
/// when the protocol layer did not fill it.
fn split_channel_sender(msg: &mut DecodedMessageEvent) {
    if msg.sender.name.is_some() {
        return;
    }
    if let Some((name, body)) = msg.text.split_once(": ") {
        let name = name.trim();
        if !name.is_empty() {
            debug!("channel sender parsed from text: '{}'", escape_log(name));
            msg.sender.name = Some(name.to_string());
            msg.text = body.to_string();
        }
    }
}
