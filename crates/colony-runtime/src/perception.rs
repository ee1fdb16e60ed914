use colony_core::{Message, Task};
use serde_json::{Map, Value};

/// What an agent took in during one cycle.
#[derive(Debug, Clone, Default)]
pub struct Perception {
    /// Mailbox messages, in arrival order.
    pub messages: Vec<Message>,
    /// Tasks claimed from the store, highest priority first.
    pub tasks: Vec<Task>,
}

/// One element of a perception, tagged with where it came from.
#[derive(Debug, Clone)]
pub enum Stimulus<'a> {
    Message(&'a Message),
    Task(&'a Task),
}

impl Stimulus<'_> {
    /// The stimulus as a record for rule matching.
    pub fn record(&self) -> Map<String, Value> {
        match self {
            Stimulus::Message(m) => m.to_stimulus(),
            Stimulus::Task(t) => t.to_stimulus(),
        }
    }
}

impl Perception {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len() + self.tasks.len()
    }

    /// Messages first, then tasks.
    pub fn stimuli(&self) -> impl Iterator<Item = Stimulus<'_>> {
        self.messages
            .iter()
            .map(Stimulus::Message)
            .chain(self.tasks.iter().map(Stimulus::Task))
    }

    /// Records for every stimulus, in [`Perception::stimuli`] order.
    pub fn records(&self) -> Vec<Value> {
        self.stimuli().map(|s| Value::Object(s.record())).collect()
    }

    pub fn find_message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id.to_string() == id)
    }

    pub fn find_task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id.to_string() == id)
    }
}
