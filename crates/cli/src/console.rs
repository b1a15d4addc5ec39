use std::io::{self, BufRead, Write};
use std::thread;

use async_trait::async_trait;
use switchboard_agent::{ConversationOutput, UserInput};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

const EXIT_WORDS: [&str; 2] = ["exit", "quit"];
const LINE_BUFFER: usize = 16;

/// Reads one message per line. Blank lines are skipped; end of input or an
/// exit word ends the session.
/// Lines arrive over a channel; a reader still blocked on its source never
/// holds up cancellation or runtime shutdown.
pub struct ConsoleInput {
    lines: mpsc::Receiver<io::Result<String>>,
    prompt: bool,
}

impl ConsoleInput {
    /// Reads stdin on a detached thread.
    pub fn stdin() -> Self {
        let (sender, lines) = mpsc::channel(LINE_BUFFER);
        thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let failed = line.is_err();
                if sender.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        });
        Self { lines, prompt: true }
    }

    /// Reads `reader` on a runtime task. Must be called inside a tokio runtime.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (sender, lines) = mpsc::channel(LINE_BUFFER);
        tokio::spawn(async move {
            let mut reader = reader.lines();
            loop {
                let next = match reader.next_line().await {
                    Ok(Some(line)) => Ok(line),
                    Ok(None) => break,
                    Err(error) => Err(error),
                };
                let failed = next.is_err();
                if sender.send(next).await.is_err() || failed {
                    break;
                }
            }
        });
        Self { lines, prompt: false }
    }
}

#[async_trait]
impl UserInput for ConsoleInput {
    async fn next_message(&mut self) -> io::Result<Option<String>> {
        loop {
            if self.prompt {
                print!("you> ");
                io::stdout().flush()?;
            }

            let Some(line) = self.lines.recv().await else {
                return Ok(None);
            };

            let line = line?;
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if EXIT_WORDS.iter().any(|word| text.eq_ignore_ascii_case(word)) {
                return Ok(None);
            }
            return Ok(Some(text.to_string()));
        }
    }
}

#[derive(Debug, Default)]
pub struct ConsoleOutput;

impl ConversationOutput for ConsoleOutput {
    fn assistant_reply(&self, text: &str) {
        println!("assistant> {text}");
    }

    fn function_failed(&self, name: &str, payload: &str) {
        eprintln!("[{name} failed: {payload}]");
    }

    fn turn_abandoned(&self, reason: &str) {
        eprintln!("[{reason}]");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use switchboard_agent::testing::{RecordingOutput, ScriptedCompletionClient};
    use switchboard_agent::{ConversationLoop, FunctionRegistry, SessionError, UserInput};
    use tokio::io::BufReader;
    use tokio_util::sync::CancellationToken;

    use super::ConsoleInput;

    #[tokio::test]
    async fn skips_blank_lines_and_stops_on_exit_word() {
        let mut input = ConsoleInput::from_reader(&b"\n  first question  \n\nQUIT\nnever read\n"[..]);

        assert_eq!(input.next_message().await.expect("read"), Some("first question".to_string()));
        assert_eq!(input.next_message().await.expect("read"), None);
    }

    #[tokio::test]
    async fn end_of_input_ends_session() {
        let mut input = ConsoleInput::from_reader(&b"only line"[..]);

        assert_eq!(input.next_message().await.expect("read"), Some("only line".to_string()));
        assert_eq!(input.next_message().await.expect("read"), None);
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_read() {
        // The writer half stays open, so the reader never sees a line or EOF.
        let (_writer, reader) = tokio::io::duplex(64);
        let mut input = ConsoleInput::from_reader(BufReader::new(reader));
        let registry = Arc::new(FunctionRegistry::builder().build().expect("registry"));
        let cancel = CancellationToken::new();
        let mut conversation =
            ConversationLoop::new(Arc::new(ScriptedCompletionClient::default()), registry, "system")
                .with_cancellation(cancel.clone());
        let output = RecordingOutput::default();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let outcome = tokio::time::timeout(Duration::from_secs(2), conversation.run(&mut input, &output))
            .await
            .expect("run returns once cancelled");

        assert!(matches!(outcome, Err(SessionError::Cancelled)));
        assert_eq!(conversation.history().len(), 1);
    }
}
