//! Output interception with automated prompt responses.
//!
//! An [`InterceptingSink`] sits between a session's output streams and a
//! downstream consumer. Every chunk is forwarded downstream unmodified,
//! then evaluated against a [`PromptRules`] table; on a match the canned
//! response is written into the session's input stream.

use std::io::Write as _;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::rules::PromptRules;
use crate::error::Result;

/// Where forwarded output goes.
pub enum Downstream {
    /// Pass bytes through to the local terminal.
    Terminal,

    /// Accumulate bytes in memory for later retrieval.
    Capture(Vec<u8>),

    /// Drop bytes after matching.
    Discard,
}

/// How much observed output the matcher sees.
///
/// `Chunk` reproduces the historical behaviour: only the most recent write
/// is inspected, so a prompt split across two transport writes never
/// matches. `RollingTail` keeps a bounded buffer of recent bytes and
/// matches against its tail, catching split prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchWindow {
    /// Match against each chunk in isolation (historical behaviour).
    Chunk,

    /// Match against a rolling buffer of the last `n` bytes.
    RollingTail(usize),
}

impl Default for MatchWindow {
    fn default() -> Self {
        MatchWindow::Chunk
    }
}

struct SinkState<W> {
    stdin: W,
    downstream: Downstream,
    tail: Vec<u8>,
}

/// Intercepts a session's combined stdout/stderr.
///
/// One sink instance serves both output streams of a session. All state
/// sits behind one lock so the downstream write and the input injection
/// are atomic with respect to concurrent deliveries: two streams racing
/// on the same input pipe still serialize here.
pub struct InterceptingSink<W> {
    rules: PromptRules,
    window: MatchWindow,
    state: Mutex<SinkState<W>>,
}

impl<W: AsyncWrite + Unpin + Send> InterceptingSink<W> {
    /// Create a sink injecting responses into `stdin`.
    pub fn new(rules: PromptRules, stdin: W, downstream: Downstream) -> Self {
        Self::with_window(rules, stdin, downstream, MatchWindow::default())
    }

    /// Create a sink with an explicit match window.
    pub fn with_window(
        rules: PromptRules,
        stdin: W,
        downstream: Downstream,
        window: MatchWindow,
    ) -> Self {
        Self {
            rules,
            window,
            state: Mutex::new(SinkState {
                stdin,
                downstream,
                tail: Vec::new(),
            }),
        }
    }

    /// Observe one chunk of session output.
    ///
    /// The chunk is forwarded downstream exactly once before any matching
    /// decision, then at most one rule fires and its response plus newline
    /// is written to the input stream. A chunk matching no rule is not an
    /// error; the prompt simply has not appeared.
    pub async fn observe(&self, chunk: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;

        match state.downstream {
            Downstream::Terminal => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(chunk).map_err(crate::error::TransportError::Io)?;
                stdout.flush().map_err(crate::error::TransportError::Io)?;
            }
            Downstream::Capture(ref mut buf) => buf.extend_from_slice(chunk),
            Downstream::Discard => {}
        }

        let response = match self.window {
            MatchWindow::Chunk => self.rules.match_tail(chunk),
            MatchWindow::RollingTail(depth) => {
                state.tail.extend_from_slice(chunk);
                let excess = state.tail.len().saturating_sub(depth);
                if excess > 0 {
                    state.tail.drain(..excess);
                }
                self.rules.match_tail(&state.tail)
            }
        };

        if let Some(response) = response {
            let line = format!("{response}\n");
            state
                .stdin
                .write_all(line.as_bytes())
                .await
                .map_err(crate::error::TransportError::Io)?;
            state
                .stdin
                .flush()
                .await
                .map_err(crate::error::TransportError::Io)?;
            // The prompt was answered; drop it from the window so a
            // later chunk cannot re-fire against the same tail.
            state.tail.clear();
        }

        Ok(())
    }

    /// Take the captured output, leaving an empty capture buffer.
    ///
    /// Returns an empty vec for `Terminal` and `Discard` downstreams.
    pub async fn take_captured(&self) -> Vec<u8> {
        let mut state = self.state.lock().await;
        match state.downstream {
            Downstream::Capture(ref mut buf) => std::mem::take(buf),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A duplex pair: the sink writes responses into one end, the test
    /// reads what the "remote" would have received from the other.
    fn stdin_pair() -> (tokio::io::DuplexStream, tokio::io::DuplexStream) {
        tokio::io::duplex(1024)
    }

    async fn read_available(remote: &mut tokio::io::DuplexStream) -> Vec<u8> {
        use tokio::io::AsyncReadExt;
        let mut buf = vec![0u8; 256];
        match tokio::time::timeout(
            std::time::Duration::from_millis(50),
            remote.read(&mut buf),
        )
        .await
        {
            Ok(Ok(n)) => {
                buf.truncate(n);
                buf
            }
            _ => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_password_prompt_injection() {
        let (stdin, mut remote) = stdin_pair();
        let rules = PromptRules::custom([("Password: ", "secret123")]);
        let sink = InterceptingSink::new(rules, stdin, Downstream::Discard);

        sink.observe(b"login as: admin\r\nPassword: ").await.unwrap();

        assert_eq!(read_available(&mut remote).await, b"secret123\n");
    }

    #[tokio::test]
    async fn test_yes_prompt_with_trailing_newline_does_not_fire() {
        let (stdin, mut remote) = stdin_pair();
        let sink = InterceptingSink::new(PromptRules::yes(), stdin, Downstream::Discard);

        sink.observe(b"Are you sure (yes/no)? ").await.unwrap();
        assert_eq!(read_available(&mut remote).await, b"yes\n");

        sink.observe(b"Are you sure (yes/no)? \n").await.unwrap();
        assert_eq!(read_available(&mut remote).await, b"");
    }

    #[tokio::test]
    async fn test_output_forwarded_unmodified_regardless_of_match() {
        let (stdin, _remote) = stdin_pair();
        let rules = PromptRules::custom([("Password: ", "pw")]);
        let sink = InterceptingSink::new(rules, stdin, Downstream::Capture(Vec::new()));

        sink.observe(b"some output\n").await.unwrap();
        sink.observe(b"Password: ").await.unwrap();

        assert_eq!(
            sink.take_captured().await,
            b"some output\nPassword: ".to_vec()
        );
    }

    #[tokio::test]
    async fn test_first_matching_rule_only_fires_once_per_chunk() {
        let (stdin, mut remote) = stdin_pair();
        let rules = PromptRules::custom([("password: ", "first"), ("d: ", "second")]);
        let sink = InterceptingSink::new(rules, stdin, Downstream::Discard);

        sink.observe(b"password: ").await.unwrap();

        assert_eq!(read_available(&mut remote).await, b"first\n");
    }

    #[tokio::test]
    async fn test_chunk_window_misses_split_prompt() {
        let (stdin, mut remote) = stdin_pair();
        let rules = PromptRules::custom([("Password: ", "pw")]);
        let sink = InterceptingSink::new(rules, stdin, Downstream::Discard);

        sink.observe(b"Passw").await.unwrap();
        sink.observe(b"ord: ").await.unwrap();

        assert_eq!(read_available(&mut remote).await, b"");
    }

    #[tokio::test]
    async fn test_rolling_tail_catches_split_prompt() {
        let (stdin, mut remote) = stdin_pair();
        let rules = PromptRules::custom([("Password: ", "pw")]);
        let sink = InterceptingSink::with_window(
            rules,
            stdin,
            Downstream::Discard,
            MatchWindow::RollingTail(64),
        );

        sink.observe(b"Passw").await.unwrap();
        sink.observe(b"ord: ").await.unwrap();

        assert_eq!(read_available(&mut remote).await, b"pw\n");
    }

    #[tokio::test]
    async fn test_rolling_tail_does_not_refire_after_answering() {
        let (stdin, mut remote) = stdin_pair();
        let rules = PromptRules::custom([("Password: ", "pw")]);
        let sink = InterceptingSink::with_window(
            rules,
            stdin,
            Downstream::Discard,
            MatchWindow::RollingTail(64),
        );

        sink.observe(b"Password: ").await.unwrap();
        assert_eq!(read_available(&mut remote).await, b"pw\n");

        // An empty delivery leaves the answered prompt behind; it must
        // not trigger a second injection.
        sink.observe(b"").await.unwrap();
        assert_eq!(read_available(&mut remote).await, b"");

        // A fresh prompt still gets answered.
        sink.observe(b"\r\nPassword: ").await.unwrap();
        assert_eq!(read_available(&mut remote).await, b"pw\n");
    }

    #[tokio::test]
    async fn test_rolling_tail_is_bounded() {
        let (stdin, mut remote) = stdin_pair();
        let rules = PromptRules::custom([("Password: ", "pw")]);
        let sink = InterceptingSink::with_window(
            rules,
            stdin,
            Downstream::Discard,
            MatchWindow::RollingTail(4),
        );

        // The prompt is longer than the window, so it can never match.
        sink.observe(b"Password: ").await.unwrap();
        assert_eq!(read_available(&mut remote).await, b"");
    }
}
