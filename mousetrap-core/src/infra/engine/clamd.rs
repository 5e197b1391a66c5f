//! ClamAV daemon client speaking the `zINSTREAM` protocol over TCP.
//!
//! The byte stream is sent as chunks, each prefixed with its length as a
//! 4-byte big-endian integer, and terminated by a zero-length chunk. clamd
//! answers with one NUL-terminated line such as `stream: OK` or
//! `stream: Eicar-Test-Signature FOUND`.

use std::fmt;
use std::io::Cursor;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mousetrap_contracts::{BackendError, ByteStream, Result, ScanEngine};
use mousetrap_model::Verdict;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// The EICAR anti-malware test string. Every engine must report it infected.
pub const EICAR: &[u8] =
    br"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const RATE_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Parse a clamd `INSTREAM` reply.
///
/// `OK` is clean, any `FOUND` line is infected, `ERROR` is indeterminate.
pub fn parse_reply(reply: &str) -> Result<Verdict> {
    let mut signatures = Vec::new();
    let mut clean = false;
    let mut errored = false;

    for line in reply
        .split(['\0', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
    {
        let body = line.strip_prefix("stream:").map_or(line, str::trim);
        if let Some(signature) = body.strip_suffix(" FOUND") {
            signatures.push(signature.trim().to_string());
        } else if body == "OK" {
            clean = true;
        } else if body.ends_with("ERROR") {
            errored = true;
        } else {
            return Err(BackendError::Unavailable(format!(
                "unexpected clamd reply: {line}"
            )));
        }
    }

    if !signatures.is_empty() {
        Ok(Verdict::Infected(signatures))
    } else if errored {
        Ok(Verdict::Indeterminate)
    } else if clean {
        Ok(Verdict::Clean)
    } else {
        Err(BackendError::Unavailable("empty clamd reply".into()))
    }
}

#[derive(Clone)]
pub struct ClamdEngine {
    host: String,
    port: u16,
    connect_timeout: Duration,
    health_check_timeout: Duration,
    chunk_size: usize,
    eicar_infected_validation: bool,
}

impl fmt::Debug for ClamdEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClamdEngine")
            .field("addr", &format_args!("{}:{}", self.host, self.port))
            .field("connect_timeout", &self.connect_timeout)
            .field("health_check_timeout", &self.health_check_timeout)
            .field("chunk_size", &self.chunk_size)
            .field("eicar_infected_validation", &self.eicar_infected_validation)
            .finish()
    }
}

impl ClamdEngine {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(5),
            health_check_timeout: DEFAULT_HEALTH_CHECK_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            eicar_infected_validation: true,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bounds the whole health probe. Scans are bounded by the
    /// orchestrator's deadline instead.
    pub fn with_health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout = timeout;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// When false, a health probe only requires clamd to answer.
    pub fn with_eicar_validation(mut self, enabled: bool) -> Self {
        self.eicar_infected_validation = enabled;
        self
    }

    async fn connect(&self) -> Result<TcpStream> {
        let addr = format!("{}:{}", self.host, self.port);
        tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| BackendError::Timeout(format!("connecting to clamd at {addr}")))?
            .map_err(|e| BackendError::Unavailable(format!("clamd at {addr}: {e}")))
    }

    async fn instream(&self, mut source: ByteStream) -> Result<String> {
        let mut socket = self.connect().await?;
        socket.write_all(b"zINSTREAM\0").await?;

        let mut buf = vec![0u8; self.chunk_size];
        let started = Instant::now();
        let mut last_log = started;
        let mut sent: u64 = 0;

        loop {
            let read = source.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            let len = u32::try_from(read).map_err(|_| {
                BackendError::Unavailable("chunk larger than u32::MAX".into())
            })?;
            socket.write_all(&len.to_be_bytes()).await?;
            socket.write_all(&buf[..read]).await?;
            sent += read as u64;

            if last_log.elapsed() >= RATE_LOG_INTERVAL {
                last_log = Instant::now();
                let secs = started.elapsed().as_secs_f64().max(f64::EPSILON);
                debug!(
                    target: "mousetrap::scan",
                    step = "stream_data",
                    bytes = sent,
                    bytes_per_sec = (sent as f64 / secs) as u64,
                    "streaming to clamd"
                );
            }
        }
        socket.write_all(&0u32.to_be_bytes()).await?;
        socket.flush().await?;

        let mut reply = Vec::new();
        socket.read_to_end(&mut reply).await?;
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }
}

#[async_trait]
impl ScanEngine for ClamdEngine {
    async fn scan(&self, stream: ByteStream) -> Result<Verdict> {
        let reply = self.instream(stream).await?;
        let verdict = parse_reply(&reply)?;
        if verdict == Verdict::Indeterminate {
            warn!(target: "mousetrap::scan", reply = %reply.trim_end_matches('\0'), "clamd could not determine result");
        }
        Ok(verdict)
    }

    async fn health_check(&self) -> Result<bool> {
        let verdict = tokio::time::timeout(
            self.health_check_timeout,
            self.scan(Box::pin(Cursor::new(EICAR))),
        )
        .await
        .map_err(|_| {
            BackendError::Timeout(format!(
                "clamd at {}:{} did not answer the health probe within {:?}",
                self.host, self.port, self.health_check_timeout
            ))
        })??;
        let infected = matches!(verdict, Verdict::Infected(_));
        debug!(step = "scan_test_stream", infected, "clamd health probe");
        Ok(infected || !self.eicar_infected_validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn replies_map_to_verdicts() {
        assert_eq!(parse_reply("stream: OK\0").unwrap(), Verdict::Clean);
        assert_eq!(
            parse_reply("stream: Eicar-Test-Signature FOUND\0").unwrap(),
            Verdict::Infected(vec!["Eicar-Test-Signature".into()])
        );
        assert_eq!(
            parse_reply("INSTREAM size limit exceeded. ERROR\0").unwrap(),
            Verdict::Indeterminate
        );
        assert!(parse_reply("").is_err());
        assert!(parse_reply("UNKNOWN COMMAND\0").is_err());
    }

    #[test]
    fn every_found_line_is_collected() {
        let reply = "stream: Win.Test.A FOUND\nstream: Win.Test.B FOUND\n";
        assert_eq!(
            parse_reply(reply).unwrap().viruses(),
            ["Win.Test.A".to_string(), "Win.Test.B".to_string()]
        );
    }

    /// Minimal clamd: reads one zINSTREAM request and answers with
    /// `reply`. Returns the reassembled payload.
    async fn fake_clamd(reply: &'static str) -> (u16, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut command = [0u8; 10];
            socket.read_exact(&mut command).await.unwrap();
            assert_eq!(&command, b"zINSTREAM\0");

            let mut payload = Vec::new();
            loop {
                let len = socket.read_u32().await.unwrap() as usize;
                if len == 0 {
                    break;
                }
                let mut chunk = vec![0u8; len];
                socket.read_exact(&mut chunk).await.unwrap();
                payload.extend_from_slice(&chunk);
            }
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            payload
        });
        (port, handle)
    }

    #[tokio::test]
    async fn streams_chunks_and_parses_the_answer() {
        let (port, server) = fake_clamd("stream: OK\0").await;
        let engine = ClamdEngine::new("127.0.0.1", port).with_chunk_size(4);

        let verdict = engine
            .scan(Box::pin(Cursor::new(b"0123456789".to_vec())))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Clean);
        assert_eq!(server.await.unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn health_probe_requires_an_infected_eicar() {
        let (port, server) = fake_clamd("stream: OK\0").await;
        let engine = ClamdEngine::new("127.0.0.1", port);
        assert!(!engine.health_check().await.unwrap());
        assert_eq!(server.await.unwrap(), EICAR);

        let (port, _server) = fake_clamd("stream: OK\0").await;
        let lenient = ClamdEngine::new("127.0.0.1", port).with_eicar_validation(false);
        assert!(lenient.health_check().await.unwrap());

        let (port, _server) =
            fake_clamd("stream: Eicar-Test-Signature FOUND\0").await;
        let engine = ClamdEngine::new("127.0.0.1", port);
        assert!(engine.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn silent_daemon_fails_the_health_check_within_its_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accepts and reads, never replies.
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut sink = Vec::new();
            let _ = socket.read_to_end(&mut sink).await;
            std::future::pending::<()>().await;
        });

        let engine = ClamdEngine::new("127.0.0.1", port)
            .with_health_check_timeout(Duration::from_millis(200));
        let outcome =
            tokio::time::timeout(Duration::from_secs(5), engine.health_check())
                .await
                .expect("health check returned");
        assert!(matches!(outcome, Err(BackendError::Timeout(_))));
        server.abort();
    }

    #[tokio::test]
    async fn unreachable_daemon_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let engine = ClamdEngine::new("127.0.0.1", port);
        assert!(engine.health_check().await.is_err());
    }
}
