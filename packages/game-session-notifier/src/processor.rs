use aws_lambda_events::event::dynamodb::{Event, EventRecord};
use lambda_runtime::Error;
use serde_dynamo::aws_sdk_dynamodb_1::from_item;
use serde_json::Value;
use shared::models::game_session::GameSession;
use tracing::{error, info, warn};

use crate::activity::{describe_change, SessionActivity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Modify,
    Remove,
}

impl ChangeKind {
    pub fn from_event_name(event_name: &str) -> Option<Self> {
        match event_name {
            "INSERT" => Some(ChangeKind::Insert),
            "MODIFY" => Some(ChangeKind::Modify),
            "REMOVE" => Some(ChangeKind::Remove),
            _ => None,
        }
    }
}

#[derive(Clone, Default)]
pub struct SessionActivityProcessor;

impl SessionActivityProcessor {
    pub fn new() -> Self {
        SessionActivityProcessor
    }

    pub async fn process_event(&self, event: Event) -> Result<(), Error> {
        info!("Processing {} records", event.records.len());

        for record in event.records {
            match self.process_record(record) {
                Ok(activities) => {
                    for activity in activities {
                        info!("{}", activity);
                    }
                }
                Err(e) => error!("Failed to process record: {}", e),
            }
        }

        Ok(())
    }

    pub fn process_record(&self, record: EventRecord) -> Result<Vec<SessionActivity>, Error> {
        let Some(kind) = ChangeKind::from_event_name(&record.event_name) else {
            warn!("Unhandled event type: {}", record.event_name);
            return Ok(Vec::new());
        };

        let old: Option<GameSession<Value>> = match kind {
            ChangeKind::Insert => None,
            ChangeKind::Modify | ChangeKind::Remove => {
                Some(from_item(record.change.old_image.into())?)
            }
        };
        let new: Option<GameSession<Value>> = match kind {
            ChangeKind::Remove => None,
            ChangeKind::Insert | ChangeKind::Modify => {
                Some(from_item(record.change.new_image.into())?)
            }
        };

        Ok(describe_change(old.as_ref(), new.as_ref()))
    }
}
