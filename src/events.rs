use crate::models::{Category, Task};

pub const EVENT_STATE_UPDATED: &str = "state_updated";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StatePayload {
    pub tasks: Vec<Task>,
    pub categories: Vec<Category>,
}
