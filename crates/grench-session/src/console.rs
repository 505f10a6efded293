//! Local endpoints for streamed output and solicited input.

use std::io::IsTerminal;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Source of local input: repl lines and answers to `need-input`.
///
/// Both come from the same stream, so a repl line read ahead never steals
/// text meant for the remote program.
#[async_trait]
pub trait InputSource: Send {
    /// Read the next chunk of input. Empty once input is exhausted.
    ///
    /// # Errors
    /// Returns error if the underlying read fails.
    async fn read_input(&mut self) -> std::io::Result<String>;

    /// Read one line without its terminator; `None` at end of input.
    ///
    /// # Errors
    /// Returns error if the underlying read fails.
    async fn read_line(&mut self) -> std::io::Result<Option<String>>;
}

/// Standard-input source.
///
/// An interactive terminal yields one character per request; anything else
/// is drained whole on the first request.
pub struct StdinInput<R = tokio::io::Stdin> {
    reader: BufReader<R>,
    interactive: bool,
}

impl StdinInput {
    /// Read from the process's standard input.
    #[must_use]
    pub fn new() -> Self {
        Self::from_reader(tokio::io::stdin(), std::io::stdin().is_terminal())
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> StdinInput<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Read from an arbitrary reader.
    #[must_use]
    pub fn from_reader(reader: R, interactive: bool) -> Self {
        Self {
            reader: BufReader::new(reader),
            interactive,
        }
    }
}

#[async_trait]
impl<R> InputSource for StdinInput<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_input(&mut self) -> std::io::Result<String> {
        if self.interactive {
            read_char(&mut self.reader).await
        } else {
            let mut text = String::new();
            self.reader.read_to_string(&mut text).await?;
            Ok(text)
        }
    }

    async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}

async fn read_char<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<String> {
    let mut buf = [0u8; 4];
    if reader.read(&mut buf[..1]).await? == 0 {
        return Ok(String::new());
    }
    let width = match buf[0].leading_ones() {
        2 => 2,
        3 => 3,
        4 => 4,
        _ => 1,
    };
    reader.read_exact(&mut buf[1..width]).await?;
    Ok(String::from_utf8_lossy(&buf[..width]).into_owned())
}

type Sink = Box<dyn AsyncWrite + Send + Unpin>;

/// Output sinks and input source used by one engine.
pub struct Console {
    out: Sink,
    err: Sink,
    input: Box<dyn InputSource>,
}

impl Console {
    /// Create a console from explicit endpoints.
    #[must_use]
    pub fn new(
        out: impl AsyncWrite + Send + Unpin + 'static,
        err: impl AsyncWrite + Send + Unpin + 'static,
        input: impl InputSource + 'static,
    ) -> Self {
        Self {
            out: Box::new(out),
            err: Box::new(err),
            input: Box::new(input),
        }
    }

    /// The process's stdout, stderr and stdin.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdout(), tokio::io::stderr(), StdinInput::new())
    }

    /// Write to the output stream and flush.
    ///
    /// # Errors
    /// Returns error if write fails.
    pub async fn write_out(&mut self, text: &str) -> std::io::Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await
    }

    /// Write to the error stream and flush.
    ///
    /// # Errors
    /// Returns error if write fails.
    pub async fn write_err(&mut self, text: &str) -> std::io::Result<()> {
        self.err.write_all(text.as_bytes()).await?;
        self.err.flush().await
    }

    /// Read input for a `need-input` request.
    ///
    /// # Errors
    /// Returns error if the read fails.
    pub async fn read_input(&mut self) -> std::io::Result<String> {
        self.input.read_input().await
    }

    /// Read one line of local input.
    ///
    /// # Errors
    /// Returns error if the read fails.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        self.input.read_line().await
    }
}
