//! Line-delimited stdio transport for the tool server

use super::server::ToolServer;
use crate::error::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Serve JSON-RPC messages, one per line, until the reader is exhausted
pub async fn run<R, W>(server: &ToolServer, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(response) = server.handle_text(trimmed).await {
            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }

    Ok(())
}

/// Serve on the process stdin/stdout
pub async fn run_stdio(server: &ToolServer) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run(server, stdin, tokio::io::stdout()).await
}
