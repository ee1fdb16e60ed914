//! # Actions
//!
//! Deliberation output arrives in whatever shape the rules or the reasoner
//! produced. [`normalize_actions`] turns any JSON into an ordered list of
//! [`Action`]s; [`dispatch`] carries one out.

use colony_core::payload::{coerce_record, parse_loose_json, scalar_text};
use colony_core::{ColonyError, Event, Message, Performative, Result, TaskStatus};
use colony_store::retry_with_backoff;
use serde_json::{Map, Value, json};
use tracing::debug;
use uuid::Uuid;

use crate::agent::AgentState;
use crate::perception::Perception;
use crate::supervisor::Runtime;

/// Action type used when the output carries no usable type.
pub const EXECUTE: &str = "execute";

/// One normalized action.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub action_type: String,
    /// Every field of the action except `type`.
    pub fields: Map<String, Value>,
}

impl Action {
    pub fn new(action_type: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            action_type: action_type.into(),
            fields,
        }
    }

    fn execute(description: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("description".into(), Value::String(description.into()));
        Self::new(EXECUTE, fields)
    }

    /// A field rendered as text, if it is a scalar.
    pub fn text(&self, key: &str) -> Option<String> {
        self.fields.get(key).and_then(scalar_text)
    }

    pub fn field(&self, key: &str) -> Value {
        self.fields.get(key).cloned().unwrap_or(Value::Null)
    }

    /// The action as a single JSON object.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("type".into(), Value::String(self.action_type.clone()));
        Value::Object(map)
    }

    fn fail(&self, reason: impl Into<String>) -> ColonyError {
        ColonyError::Action {
            action_type: self.action_type.clone(),
            reason: reason.into(),
        }
    }
}

/// Turn arbitrary deliberation output into actions. Never fails.
///
/// - `null` and blank strings yield nothing,
/// - strings holding JSON are parsed, other strings become `execute` actions,
/// - arrays are flattened in order,
/// - `{"actions": [...]}` is unwrapped,
/// - objects without a string `type` become `execute` actions.
pub fn normalize_actions(output: Value) -> Vec<Action> {
    let mut actions = Vec::new();
    collect(output, &mut actions);
    actions
}

fn collect(value: Value, out: &mut Vec<Action>) {
    match value {
        Value::Null => {}
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return;
            }
            match parse_loose_json(trimmed) {
                Some(parsed) => collect(parsed, out),
                None => out.push(Action::execute(trimmed)),
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, out);
            }
        }
        Value::Object(mut map) => {
            let has_type = matches!(map.get("type"), Some(Value::String(t)) if !t.trim().is_empty());
            if !has_type && map.contains_key("actions") {
                let inner = map.remove("actions").unwrap_or(Value::Null);
                collect(inner, out);
                return;
            }
            let action_type = match map.remove("type") {
                Some(Value::String(t)) if !t.trim().is_empty() => t.trim().to_lowercase(),
                _ => EXECUTE.to_string(),
            };
            out.push(Action::new(action_type, map));
        }
        other => out.push(Action::execute(other.to_string())),
    }
}

/// Everything an action may touch.
pub(crate) struct ActionContext<'a> {
    pub agent_id: &'a str,
    pub state: &'a mut AgentState,
    pub perception: &'a Perception,
    pub runtime: &'a Runtime,
}

/// Carry out one action. Returns a short detail record for the event log.
pub(crate) async fn dispatch(action: &Action, ctx: &mut ActionContext<'_>) -> Result<Value> {
    debug!(agent_id = %ctx.agent_id, action_type = %action.action_type, "dispatching action");
    match action.action_type.as_str() {
        "send_message" => send_message(action, ctx).await,
        "respond" => respond(action, ctx).await,
        "update_belief" => update_belief(action, ctx),
        "publish_event" => publish_event(action, ctx),
        "complete_task" => finish_task(action, ctx, TaskStatus::Completed).await,
        "fail_task" => finish_task(action, ctx, TaskStatus::Failed).await,
        "adopt_desire" => adopt_desire(action, ctx),
        "drop_desire" => drop_desire(action, ctx),
        _ => Ok(Value::Object(action.fields.clone())),
    }
}

fn performative_of(action: &Action) -> Result<Performative> {
    match action.text("performative") {
        Some(p) => p.parse().map_err(|e: String| action.fail(e)),
        None => Ok(Performative::Inform),
    }
}

async fn send_message(action: &Action, ctx: &mut ActionContext<'_>) -> Result<Value> {
    let receiver = action
        .text("receiver")
        .or_else(|| action.text("to"))
        .ok_or_else(|| action.fail("missing receiver"))?;
    let performative = performative_of(action)?;
    let content = action.field("content");

    // Stay in the conversation when answering a perceived message from the receiver.
    let message = match action
        .text("in_response_to")
        .and_then(|id| ctx.perception.find_message(&id))
    {
        Some(original) if original.sender == receiver => original.reply(performative, content),
        _ => Message::new(ctx.agent_id, receiver.as_str(), performative, content),
    };

    let id = ctx.runtime.send(ctx.agent_id, &receiver, message).await?;
    Ok(json!({"message_id": id.to_string(), "receiver": receiver}))
}

async fn respond(action: &Action, ctx: &mut ActionContext<'_>) -> Result<Value> {
    let target = action
        .text("in_response_to")
        .ok_or_else(|| action.fail("nothing to respond to"))?;

    if let Some(original) = ctx.perception.find_message(&target) {
        let reply = original.reply(performative_of(action)?, action.field("content"));
        let receiver = original.sender.clone();
        let id = ctx.runtime.send(ctx.agent_id, &receiver, reply).await?;
        return Ok(json!({"message_id": id.to_string(), "receiver": receiver}));
    }

    if ctx.perception.find_task(&target).is_some() {
        return finish_task(action, ctx, TaskStatus::Completed).await;
    }

    Err(action.fail(format!("'{target}' is not a perceived message or task")))
}

fn update_belief(action: &Action, ctx: &mut ActionContext<'_>) -> Result<Value> {
    if let Some(key) = action.text("key") {
        let value = action.field("value");
        ctx.state.beliefs.insert(key.clone(), value.clone());
        return Ok(json!({"updated": [key]}));
    }
    if let Some(beliefs) = action.fields.get("beliefs") {
        let record = coerce_record(beliefs.clone());
        let keys: Vec<String> = record.keys().cloned().collect();
        ctx.state.beliefs.extend(record);
        return Ok(json!({"updated": keys}));
    }
    Err(action.fail("expected 'key' and 'value', or 'beliefs'"))
}

fn publish_event(action: &Action, ctx: &mut ActionContext<'_>) -> Result<Value> {
    let name = action.text("name").unwrap_or_else(|| "event".to_string());
    ctx.runtime.events().publish(Event::AgentEvent {
        agent_id: ctx.agent_id.to_string(),
        name: name.clone(),
        payload: action.field("payload"),
    });
    Ok(json!({"name": name}))
}

async fn finish_task(
    action: &Action,
    ctx: &mut ActionContext<'_>,
    status: TaskStatus,
) -> Result<Value> {
    let raw_id = action
        .text("task_id")
        .or_else(|| action.text("in_response_to"))
        .ok_or_else(|| action.fail("missing task_id"))?;
    let task_id =
        Uuid::parse_str(&raw_id).map_err(|e| action.fail(format!("bad task id '{raw_id}': {e}")))?;

    let result = match status {
        TaskStatus::Failed => match action.fields.get("reason").or(action.fields.get("result")) {
            Some(Value::String(reason)) => json!({"reason": reason}),
            Some(other) => other.clone(),
            None => Value::Null,
        },
        _ => action
            .fields
            .get("result")
            .or(action.fields.get("content"))
            .cloned()
            .unwrap_or(Value::Null),
    };

    let store = ctx.runtime.store();
    let policy = ctx.runtime.retry_policy();
    let task = retry_with_backoff("save_task_result", policy, || {
        store.save_task_result(task_id, result.clone(), status)
    })
    .await?;

    ctx.runtime.events().publish(Event::TaskFinished {
        agent_id: ctx.agent_id.to_string(),
        task_id,
        status: task.status.to_string(),
    });
    Ok(json!({"task_id": task_id.to_string(), "status": task.status.as_str()}))
}

fn adopt_desire(action: &Action, ctx: &mut ActionContext<'_>) -> Result<Value> {
    let desire = action
        .text("desire")
        .ok_or_else(|| action.fail("missing desire"))?;
    if !ctx.state.desires.contains(&desire) {
        ctx.state.desires.push(desire.clone());
    }
    Ok(json!({"desire": desire}))
}

fn drop_desire(action: &Action, ctx: &mut ActionContext<'_>) -> Result<Value> {
    let desire = action
        .text("desire")
        .ok_or_else(|| action.fail("missing desire"))?;
    let before = ctx.state.desires.len();
    ctx.state.desires.retain(|d| d != &desire);
    Ok(json!({"desire": desire, "dropped": before != ctx.state.desires.len()}))
}
