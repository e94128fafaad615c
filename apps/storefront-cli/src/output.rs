//! Line-oriented JSON output shared by the command loop and the event feed.

use std::io;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

enum Sink {
    Stdout(tokio::io::Stdout),
    Buffer(Vec<String>),
}

/// Cloneable handle; each `write_json` emits one whole line.
#[derive(Clone)]
pub struct Output {
    sink: Arc<Mutex<Sink>>,
}

impl Output {
    pub fn stdout() -> Self {
        Output {
            sink: Arc::new(Mutex::new(Sink::Stdout(tokio::io::stdout()))),
        }
    }

    /// Collects lines in memory instead of writing them.
    pub fn buffer() -> Self {
        Output {
            sink: Arc::new(Mutex::new(Sink::Buffer(Vec::new()))),
        }
    }

    pub async fn write_json<T: Serialize>(&self, value: &T) -> io::Result<()> {
        let line = serde_json::to_string(value)?;

        match &mut *self.sink.lock().await {
            Sink::Stdout(out) => {
                out.write_all(line.as_bytes()).await?;
                out.write_all(b"\n").await?;
                out.flush().await
            }
            Sink::Buffer(lines) => {
                lines.push(line);
                Ok(())
            }
        }
    }

    /// Lines collected so far by a buffer output; empty for stdout.
    pub async fn lines(&self) -> Vec<String> {
        match &*self.sink.lock().await {
            Sink::Stdout(_) => Vec::new(),
            Sink::Buffer(lines) => lines.clone(),
        }
    }
}
