//! Relay handler: hands each job to whatever reads our stdout

use async_trait::async_trait;
use feedq_core::domain::{encode, Payload};
use feedq_core::error::{AppError, Result};
use feedq_core::port::JobHandler;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Writes every job as one line of JSON (extended types as surrogates)
pub struct LineHandler<W> {
    out: Mutex<W>,
}

impl<W> LineHandler<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl LineHandler<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> JobHandler for LineHandler<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn handle(&self, job: Payload) -> Result<Option<Payload>> {
        let mut line = encode(&job)?;
        line.push('\n');

        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes())
            .await
            .map_err(|e| AppError::Handler(format!("write failed: {}", e)))?;
        out.flush()
            .await
            .map_err(|e| AppError::Handler(format!("flush failed: {}", e)))?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_writes_one_line_per_job() {
        let handler = LineHandler::new(Vec::<u8>::new());
        handler
            .handle(Payload::from(json!({"url": "http://a.com"})))
            .await
            .unwrap();
        handler.handle(Payload::Int(7)).await.unwrap();

        let written = handler.out.into_inner();
        assert_eq!(
            String::from_utf8(written).unwrap(),
            "{\"url\":\"http://a.com\"}\n7\n"
        );
    }
}
