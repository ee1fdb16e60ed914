use colony_core::{AgentId, ColonyError, Message, Result};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Sending half of an agent's bounded mailbox. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Mailbox {
    agent_id: AgentId,
    tx: mpsc::Sender<Message>,
}

/// Create a mailbox and the receiver owned by the agent's cycle.
pub fn mailbox(agent_id: impl Into<String>, capacity: usize) -> (Mailbox, mpsc::Receiver<Message>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Mailbox {
            agent_id: agent_id.into(),
            tx,
        },
        rx,
    )
}

impl Mailbox {
    /// Place a message without waiting. Fails when the mailbox is full or its
    /// agent has gone away; the message is dropped in both cases.
    pub fn try_deliver(&self, message: Message) -> Result<()> {
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => ColonyError::MailboxFull {
                agent_id: self.agent_id.clone(),
                capacity: self.tx.max_capacity(),
            },
            TrySendError::Closed(_) => ColonyError::MailboxClosed(self.agent_id.clone()),
        })
    }

    /// Messages currently waiting.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}
