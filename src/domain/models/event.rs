use super::ToolEffect;

/// Identifies the assistant placeholder a running turn writes into.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TurnTarget {
    pub session_id: String,
    pub message_id: String,
}

/// Messages from background chat workers to the owner of the session list.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    TextDelta(TurnTarget, String),
    ToolEffect(TurnTarget, ToolEffect),
    TurnComplete(TurnTarget),
    /// Session id and generated title.
    TitleGenerated(String, String),
}
