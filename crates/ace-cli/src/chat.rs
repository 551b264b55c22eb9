//! Line-oriented chat loop.

use std::future::Future;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const PROMPT: &str = "ace> ";

fn is_exit(line: &str) -> bool {
    matches!(line, "exit" | "quit")
}

/// Answer each non-empty input line until `exit`, `quit` or end of input.
///
/// Returns the number of questions answered.
pub async fn chat_loop<R, W, F, Fut>(input: R, output: &mut W, mut answer: F) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = String>,
{
    let mut lines = input.lines();
    let mut answered = 0;

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            output.write_all(b"\n").await?;
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit(line) {
            break;
        }

        let reply = answer(line.to_string()).await;
        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n\n").await?;
        answered += 1;
    }

    output.flush().await?;
    Ok(answered)
}
