use switchboard_core::Message;

/// Ordered, append-only record of a session. The system message is always
/// first and nothing is ever reordered.
#[derive(Clone, Debug)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self { messages: vec![Message::system(system_prompt)] }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Stages `user_text` as the start of a new turn. Everything pushed
    /// through the returned guard is discarded unless it is committed.
    pub fn begin_turn(&mut self, user_text: impl Into<String>) -> Turn<'_> {
        let start = self.messages.len();
        self.messages.push(Message::user(user_text));
        Turn { history: self, start, committed: false }
    }
}

#[derive(Debug)]
pub struct Turn<'a> {
    history: &'a mut History,
    start: usize,
    committed: bool,
}

impl Turn<'_> {
    pub fn push(&mut self, message: Message) {
        self.history.messages.push(message);
    }

    /// Committed history followed by this turn's staged messages.
    pub fn messages(&self) -> &[Message] {
        &self.history.messages
    }

    pub fn staged(&self) -> &[Message] {
        &self.history.messages[self.start..]
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.history.messages.truncate(self.start);
        }
    }
}
