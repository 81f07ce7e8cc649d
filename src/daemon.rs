//! Line daemon
//!
//! Listens on a loopback TCP socket. Each connection gets its own task and
//! may send any number of `<verb> <unit>` lines; every line is answered with
//! exactly one response line. A request that outlives the command timeout is
//! answered with a timeout line while the operation itself runs to
//! completion in the background.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::config::{Config, MAX_LINE_LENGTH};
use crate::diagnostics::{self, FileDiagnostics};
use crate::dispatch::{dispatch, Response};
use crate::manager::{ManagerError, Supervisor};
use crate::protocol::{ProtocolError, Request};

/// State shared by every connection task
struct Shared {
    supervisor: Arc<Supervisor>,
    diagnostics: Option<FileDiagnostics>,
    command_timeout: Duration,
    idle_timeout: Duration,
}

pub struct Daemon {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl Daemon {
    /// Bind the configured listen address; only loopback addresses are allowed
    pub async fn bind(config: &Config, supervisor: Arc<Supervisor>) -> io::Result<Self> {
        if !config.listen.ip().is_loopback() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to listen on non-loopback address {}", config.listen),
            ));
        }

        let listener = TcpListener::bind(config.listen).await?;
        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                supervisor,
                diagnostics: config.diagnostics_dir.as_ref().map(FileDiagnostics::new),
                command_timeout: config.command_timeout,
                idle_timeout: config.idle_timeout,
            }),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever
    pub async fn run(self) -> io::Result<()> {
        log::info!("minitd listening on {}", self.listener.local_addr()?);
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(handle_connection(stream, peer, shared));
                }
                Err(e) => {
                    log::error!("accept error: {}", e);
                }
            }
        }
    }
}

enum Line {
    Text(String),
    TooLong,
    Eof,
}

async fn read_line<R>(reader: &mut BufReader<R>, buf: &mut Vec<u8>) -> io::Result<Line>
where
    R: tokio::io::AsyncRead + Unpin,
{
    buf.clear();
    let read = (&mut *reader)
        .take(MAX_LINE_LENGTH as u64 + 1)
        .read_until(b'\n', buf)
        .await?;
    if read == 0 {
        return Ok(Line::Eof);
    }
    if !buf.ends_with(b"\n") && buf.len() > MAX_LINE_LENGTH {
        discard_line(reader).await?;
        return Ok(Line::TooLong);
    }
    let text = String::from_utf8_lossy(buf);
    Ok(Line::Text(text.trim_end_matches(['\r', '\n']).to_string()))
}

/// Skip the rest of an over-long line without buffering it
async fn discard_line<R>(reader: &mut BufReader<R>) -> io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let len = available.len();
        reader.consume(len);
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) {
    log::debug!("connection from {}", peer);

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);

    loop {
        let next = read_line(&mut reader, &mut buf);
        let line = match tokio::time::timeout(shared.idle_timeout, next).await {
            Err(_) => {
                log::debug!("{} idle for {:?}, closing", peer, shared.idle_timeout);
                break;
            }
            Ok(Err(e)) => {
                log::debug!("read error from {}: {}", peer, e);
                break;
            }
            Ok(Ok(line)) => line,
        };

        let response = match line {
            Line::Eof => break,
            Line::TooLong => Response::Rejected(ProtocolError::MalformedCommand(format!(
                "line exceeds {} bytes",
                MAX_LINE_LENGTH
            ))),
            Line::Text(text) => match Request::parse(&text) {
                Ok(request) => handle_request(request, &shared).await,
                Err(e) => {
                    log::debug!("rejected {:?} from {}: {}", text, peer, e);
                    Response::Rejected(e)
                }
            },
        };

        let mut reply = response.to_string().replace(['\r', '\n'], " ");
        reply.push('\n');
        if let Err(e) = writer.write_all(reply.as_bytes()).await {
            log::debug!("write error to {}: {}", peer, e);
            break;
        }
    }

    let _ = writer.shutdown().await;
    log::debug!("connection from {} closed", peer);
}

/// Run one request on its own task, bounded by the command timeout
async fn handle_request(request: Request, shared: &Arc<Shared>) -> Response {
    let line = request.to_string();
    log::info!("request: {}", line);

    let task = {
        let shared = Arc::clone(shared);
        let request = request.clone();
        tokio::spawn(async move {
            let response = dispatch(&shared.supervisor, request.clone()).await;
            diagnostics::record(shared.diagnostics.as_ref(), &request, &response).await;
            response
        })
    };

    match tokio::time::timeout(shared.command_timeout, task).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            log::error!("{} panicked: {}", line, e);
            Response::Error(ManagerError::Io(io::Error::other(e)))
        }
        Err(_) => {
            log::warn!("{} still running after {:?}", line, shared.command_timeout);
            let response = Response::Timeout {
                request: line,
                after: shared.command_timeout,
            };
            diagnostics::record(shared.diagnostics.as_ref(), &request, &response).await;
            response
        }
    }
}
