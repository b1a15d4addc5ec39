use async_trait::async_trait;

/// Source of user messages for a session. `Ok(None)` means the user is done.
#[async_trait]
pub trait UserInput: Send {
    async fn next_message(&mut self) -> std::io::Result<Option<String>>;
}

/// Sink for everything the loop shows the user.
pub trait ConversationOutput: Send + Sync {
    fn assistant_reply(&self, text: &str);

    fn function_failed(&self, _name: &str, _payload: &str) {}

    fn turn_abandoned(&self, _reason: &str) {}
}
