use crate::ids::{ActorId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// Who is editing, in which workspace.
///
/// Passed explicitly to every document, engine and tracker constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorContext {
    pub actor: ActorId,
    pub workspace_id: WorkspaceId,
    #[serde(default)]
    pub display_name: String,
}

impl ActorContext {
    pub fn new(actor: impl Into<ActorId>, workspace_id: impl Into<WorkspaceId>) -> Self {
        let actor = actor.into();
        Self {
            display_name: actor.to_string(),
            actor,
            workspace_id: workspace_id.into(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}
