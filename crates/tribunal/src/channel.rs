//! Output channels that deliver persona lines to the realtime transport.
//!
//! The transport itself is external. A channel accepts two commands: switch the
//! active identity, then speak a line. Ordering between the two (including any
//! settling delay) is the channel's responsibility.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::catalog::{PoseId, PresetId};
use crate::error::ChannelError;
use crate::persona::{Mood, PersonaId};

/// A line of dialogue ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpokenLine {
    pub persona_id: PersonaId,
    pub speaker_name: String,
    pub preset_id: Option<PresetId>,
    pub pose_id: Option<PoseId>,
    pub mood: Mood,
    pub text: String,
}

/// Sink for a persona's identity changes and speech.
#[async_trait]
pub trait OutputChannel: Send + Sync {
    /// Switches the identity the transport presents.
    async fn change_identity(&self, preset_id: PresetId) -> Result<(), ChannelError>;

    /// Delivers one line of dialogue.
    async fn speak(&self, line: SpokenLine) -> Result<(), ChannelError>;
}

/// Command emitted by [`MpscChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCommand {
    ChangeIdentity(PresetId),
    Speak(SpokenLine),
}

/// An [`OutputChannel`] backed by a tokio mpsc queue.
///
/// The receiving half is typically drained by the transport task.
#[derive(Debug, Clone)]
pub struct MpscChannel {
    sender: mpsc::UnboundedSender<ChannelCommand>,
    settle_delay: Duration,
}

impl MpscChannel {
    /// Creates a channel and the receiver for its commands.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChannelCommand>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                settle_delay: Duration::ZERO,
            },
            receiver,
        )
    }

    /// Waits this long after an identity change before the next command.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    fn send(&self, command: ChannelCommand) -> Result<(), ChannelError> {
        self.sender.send(command).map_err(|_| ChannelError::Closed)
    }
}

#[async_trait]
impl OutputChannel for MpscChannel {
    async fn change_identity(&self, preset_id: PresetId) -> Result<(), ChannelError> {
        self.send(ChannelCommand::ChangeIdentity(preset_id))?;
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        Ok(())
    }

    async fn speak(&self, line: SpokenLine) -> Result<(), ChannelError> {
        self.send(ChannelCommand::Speak(line))
    }
}
