//! FastCGI responder: accept loop and per-connection record handling.
//!
//! Each connection has one reader and one writer. The reader assembles
//! requests and spawns a task per request once its `STDIN` ends; every task
//! sends its output records to the writer over a channel, so multiplexed
//! requests complete independently.

use std::collections::HashMap;
use std::io;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Router;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;
use tower::ServiceExt;

use crate::http::response::failure_response;
use crate::net::fastcgi::record::{
    decode_pairs, encode_pair, read_record, write_end_request, write_record, write_stream,
    BeginRequest, ABORT_REQUEST, BEGIN_REQUEST, DATA, GET_VALUES, GET_VALUES_RESULT, PARAMS,
    REQUEST_COMPLETE, ROLE_RESPONDER, STDERR, STDIN, STDOUT, UNKNOWN_ROLE, UNKNOWN_TYPE,
};
use crate::net::fastcgi::request::build_request;
use crate::net::fastcgi::FastCgiError;

const MAX_CONNS: &str = "1024";
const MAX_REQS: &str = "1024";

/// Output records queued per connection before request tasks wait on the writer.
const OUTPUT_QUEUE: usize = 64;

/// Serves the relay router to a FastCGI front-end.
pub struct FastCgiServer {
    router: Router,
    max_body_bytes: usize,
}

impl FastCgiServer {
    /// `max_body_bytes` caps the `STDIN` buffered for a single request.
    pub fn new(router: Router, max_body_bytes: usize) -> Self {
        Self {
            router,
            max_body_bytes,
        }
    }

    /// Accept FastCGI connections until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "FastCGI server starting");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let router = self.router.clone();
                        let max_body_bytes = self.max_body_bytes;
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, router, max_body_bytes).await {
                                tracing::debug!(peer = %peer, error = %e, "FastCGI connection ended with error");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to accept FastCGI connection"),
                },
            }
        }

        tracing::info!("FastCGI server stopped");
        Ok(())
    }
}

/// Work for the connection's writer.
#[derive(Debug)]
enum Frame {
    /// A single record.
    Record {
        record_type: u8,
        request_id: u16,
        content: Vec<u8>,
    },
    /// Stream data, split into as many records as it needs.
    Stream {
        record_type: u8,
        request_id: u16,
        data: Bytes,
    },
    End {
        request_id: u16,
        protocol_status: u8,
    },
    /// Close the connection after everything queued before it.
    Close,
}

#[derive(Debug, Default)]
struct PendingRequest {
    keep_conn: bool,
    params: Vec<u8>,
    stdin: Vec<u8>,
    oversized: bool,
}

impl PendingRequest {
    fn push_stdin(&mut self, data: &[u8], limit: usize) {
        if self.oversized {
            return;
        }
        if self.stdin.len().saturating_add(data.len()) > limit {
            self.oversized = true;
            self.stdin = Vec::new();
        } else {
            self.stdin.extend_from_slice(data);
        }
    }
}

struct RunningRequest {
    keep_conn: bool,
    task: AbortHandle,
}

/// Handle every request arriving on one FastCGI connection.
///
/// Requests may be interleaved; each is dispatched on its own task once its
/// `STDIN` stream ends. The connection closes after the response to a
/// request without the keep-conn flag, or when the peer hangs up and every
/// running request has answered.
pub async fn serve_connection<S>(
    stream: S,
    router: Router,
    max_body_bytes: usize,
) -> Result<(), FastCgiError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, writer) = tokio::io::split(stream);
    let (frames, queue) = mpsc::channel(OUTPUT_QUEUE);

    let reading = read_requests(reader, frames, router, max_body_bytes);
    let writing = write_frames(writer, queue);
    tokio::pin!(reading, writing);

    tokio::select! {
        written = &mut writing => written,
        read = &mut reading => {
            read?;
            writing.await
        }
    }
}

async fn read_requests<R: AsyncRead + Unpin>(
    reader: R,
    frames: mpsc::Sender<Frame>,
    router: Router,
    max_body_bytes: usize,
) -> Result<(), FastCgiError> {
    let mut reader = BufReader::new(reader);
    let mut pending: HashMap<u16, PendingRequest> = HashMap::new();
    let mut running: HashMap<u16, RunningRequest> = HashMap::new();

    while let Some(record) = read_record(&mut reader).await? {
        let id = record.request_id;

        match record.record_type {
            BEGIN_REQUEST => {
                let begin = BeginRequest::parse(&record.content)?;
                if begin.role == ROLE_RESPONDER {
                    pending.insert(
                        id,
                        PendingRequest {
                            keep_conn: begin.keep_conn(),
                            ..Default::default()
                        },
                    );
                } else {
                    finish(&frames, id, UNKNOWN_ROLE, begin.keep_conn()).await?;
                }
            }
            ABORT_REQUEST => {
                let keep_conn = if let Some(request) = pending.remove(&id) {
                    Some(request.keep_conn)
                } else if let Some(request) = running.remove(&id) {
                    // A request that already answered has nothing left to cancel.
                    (!request.task.is_finished()).then(|| {
                        request.task.abort();
                        request.keep_conn
                    })
                } else {
                    None
                };
                if let Some(keep_conn) = keep_conn {
                    tracing::debug!(request_id = id, "FastCGI request aborted");
                    finish(&frames, id, REQUEST_COMPLETE, keep_conn).await?;
                }
            }
            PARAMS => {
                if let Some(request) = pending.get_mut(&id) {
                    request.params.extend_from_slice(&record.content);
                }
            }
            STDIN if !record.content.is_empty() => {
                if let Some(request) = pending.get_mut(&id) {
                    request.push_stdin(&record.content, max_body_bytes);
                }
            }
            STDIN => {
                if let Some(request) = pending.remove(&id) {
                    running.retain(|_, entry| !entry.task.is_finished());

                    let keep_conn = request.keep_conn;
                    let router = router.clone();
                    let frames = frames.clone();
                    let task = tokio::spawn(async move {
                        if let Err(e) = respond(id, request, router, frames).await {
                            tracing::debug!(request_id = id, error = %e, "FastCGI response not delivered");
                        }
                    });
                    running.insert(
                        id,
                        RunningRequest {
                            keep_conn,
                            task: task.abort_handle(),
                        },
                    );
                }
            }
            GET_VALUES => {
                let content = known_values(&record.content)?;
                send(
                    &frames,
                    Frame::Record {
                        record_type: GET_VALUES_RESULT,
                        request_id: 0,
                        content,
                    },
                )
                .await?;
            }
            DATA => {}
            other => {
                send(
                    &frames,
                    Frame::Record {
                        record_type: UNKNOWN_TYPE,
                        request_id: 0,
                        content: vec![other, 0, 0, 0, 0, 0, 0, 0],
                    },
                )
                .await?;
            }
        }
    }

    Ok(())
}

/// Drain `queue` onto the connection, then shut the write side down.
async fn write_frames<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut queue: mpsc::Receiver<Frame>,
) -> Result<(), FastCgiError> {
    while let Some(frame) = queue.recv().await {
        match frame {
            Frame::Record {
                record_type,
                request_id,
                content,
            } => write_record(&mut writer, record_type, request_id, &content).await?,
            Frame::Stream {
                record_type,
                request_id,
                data,
            } => write_stream(&mut writer, record_type, request_id, &data).await?,
            Frame::End {
                request_id,
                protocol_status,
            } => write_end_request(&mut writer, request_id, 0, protocol_status).await?,
            Frame::Close => break,
        }
        writer.flush().await?;
    }

    writer.shutdown().await?;
    Ok(())
}

async fn send(frames: &mpsc::Sender<Frame>, frame: Frame) -> Result<(), FastCgiError> {
    frames.send(frame).await.map_err(|_| FastCgiError::Closed)
}

/// `END_REQUEST`, then close unless the front-end asked to keep the connection.
async fn finish(
    frames: &mpsc::Sender<Frame>,
    id: u16,
    protocol_status: u8,
    keep_conn: bool,
) -> Result<(), FastCgiError> {
    send(
        frames,
        Frame::End {
            request_id: id,
            protocol_status,
        },
    )
    .await?;
    if !keep_conn {
        send(frames, Frame::Close).await?;
    }
    Ok(())
}

async fn respond(
    id: u16,
    request: PendingRequest,
    router: Router,
    frames: mpsc::Sender<Frame>,
) -> Result<(), FastCgiError> {
    let PendingRequest {
        keep_conn,
        params,
        stdin,
        oversized,
    } = request;

    let response = if oversized {
        tracing::warn!(request_id = id, "FastCGI request body exceeds limit");
        failure_response(StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new())
    } else {
        let converted = decode_pairs(&params)
            .map_err(FastCgiError::from)
            .and_then(|pairs| {
                let params: HashMap<String, String> = pairs.into_iter().collect();
                build_request(&params, Bytes::from(stdin))
            });
        match converted {
            Ok(request) => match router.oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            },
            Err(e) => {
                tracing::warn!(request_id = id, error = %e, "Malformed FastCGI request");
                report_error(&frames, id, &e).await?;
                failure_response(StatusCode::BAD_REQUEST, HeaderMap::new())
            }
        }
    };

    write_response(&frames, id, response).await?;
    send(
        &frames,
        Frame::Record {
            record_type: STDOUT,
            request_id: id,
            content: Vec::new(),
        },
    )
    .await?;
    finish(&frames, id, REQUEST_COMPLETE, keep_conn).await
}

/// Write `error` to the request's `STDERR` stream and terminate it.
async fn report_error(
    frames: &mpsc::Sender<Frame>,
    id: u16,
    error: &FastCgiError,
) -> Result<(), FastCgiError> {
    send(
        frames,
        Frame::Stream {
            record_type: STDERR,
            request_id: id,
            data: Bytes::from(format!("{error}\n")),
        },
    )
    .await?;
    send(
        frames,
        Frame::Record {
            record_type: STDERR,
            request_id: id,
            content: Vec::new(),
        },
    )
    .await
}

/// Write a CGI response: `Status:` line and headers, then the body.
async fn write_response(
    frames: &mpsc::Sender<Frame>,
    id: u16,
    response: Response,
) -> Result<(), FastCgiError> {
    let (parts, body) = response.into_parts();

    let mut head = format!(
        "Status: {} {}\r\n",
        parts.status.as_u16(),
        parts.status.canonical_reason().unwrap_or("")
    )
    .into_bytes();
    for (name, value) in parts.headers.iter() {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    send(
        frames,
        Frame::Stream {
            record_type: STDOUT,
            request_id: id,
            data: Bytes::from(head),
        },
    )
    .await?;

    let mut body = Body::into_data_stream(body);
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(data) => {
                send(
                    frames,
                    Frame::Stream {
                        record_type: STDOUT,
                        request_id: id,
                        data,
                    },
                )
                .await?
            }
            Err(e) => {
                tracing::debug!(request_id = id, error = %e, "Response body ended early");
                break;
            }
        }
    }
    Ok(())
}

/// Answer a management `GET_VALUES` query for the variables we know.
fn known_values(query: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    for (name, _) in decode_pairs(query)? {
        let value = match name.as_str() {
            "FCGI_MAX_CONNS" => MAX_CONNS,
            "FCGI_MAX_REQS" => MAX_REQS,
            "FCGI_MPXS_CONNS" => "1",
            _ => continue,
        };
        encode_pair(&mut out, &name, value);
    }
    Ok(out)
}
