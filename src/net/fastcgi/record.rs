//! FastCGI record framing and name-value pair encoding.
//!
//! ```text
//! record := version:u8 type:u8 request_id:u16 content_len:u16
//!           padding_len:u8 reserved:u8 content[content_len] padding[padding_len]
//! ```

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const VERSION_1: u8 = 1;
pub const HEADER_LEN: usize = 8;
pub const MAX_CONTENT_LEN: usize = 65_535;

pub const BEGIN_REQUEST: u8 = 1;
pub const ABORT_REQUEST: u8 = 2;
pub const END_REQUEST: u8 = 3;
pub const PARAMS: u8 = 4;
pub const STDIN: u8 = 5;
pub const STDOUT: u8 = 6;
pub const STDERR: u8 = 7;
pub const DATA: u8 = 8;
pub const GET_VALUES: u8 = 9;
pub const GET_VALUES_RESULT: u8 = 10;
pub const UNKNOWN_TYPE: u8 = 11;

pub const ROLE_RESPONDER: u16 = 1;
pub const FLAG_KEEP_CONN: u8 = 1;

pub const REQUEST_COMPLETE: u8 = 0;
pub const UNKNOWN_ROLE: u8 = 3;

/// One decoded record, padding stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub record_type: u8,
    pub request_id: u16,
    pub content: Vec<u8>,
}

/// Body of a `BEGIN_REQUEST` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginRequest {
    pub role: u16,
    pub flags: u8,
}

impl BeginRequest {
    pub fn parse(content: &[u8]) -> io::Result<Self> {
        if content.len() < 8 {
            return Err(invalid("short BEGIN_REQUEST body"));
        }
        Ok(Self {
            role: u16::from_be_bytes([content[0], content[1]]),
            flags: content[2],
        })
    }

    pub fn keep_conn(&self) -> bool {
        self.flags & FLAG_KEEP_CONN != 0
    }
}

/// Read the next record; `None` when the peer closed the connection.
pub async fn read_record<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Record>> {
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    if header[0] != VERSION_1 {
        return Err(invalid(format!("unsupported FastCGI version {}", header[0])));
    }

    let content_len = u16::from_be_bytes([header[4], header[5]]) as usize;
    let padding_len = header[6] as usize;

    let mut content = vec![0u8; content_len];
    reader.read_exact(&mut content).await?;
    let mut padding = [0u8; 255];
    reader.read_exact(&mut padding[..padding_len]).await?;

    Ok(Some(Record {
        record_type: header[1],
        request_id: u16::from_be_bytes([header[2], header[3]]),
        content,
    }))
}

/// Write a single record. `content` must fit in one record.
pub async fn write_record<W: AsyncWrite + Unpin>(
    writer: &mut W,
    record_type: u8,
    request_id: u16,
    content: &[u8],
) -> io::Result<()> {
    debug_assert!(content.len() <= MAX_CONTENT_LEN);
    let padding_len = (8 - content.len() % 8) % 8;

    let mut buf = Vec::with_capacity(HEADER_LEN + content.len() + padding_len);
    buf.push(VERSION_1);
    buf.push(record_type);
    buf.extend_from_slice(&request_id.to_be_bytes());
    buf.extend_from_slice(&(content.len() as u16).to_be_bytes());
    buf.push(padding_len as u8);
    buf.push(0);
    buf.extend_from_slice(content);
    buf.resize(buf.len() + padding_len, 0);

    writer.write_all(&buf).await
}

/// Write `data` as a stream of records, split at the record size limit.
///
/// Does not write the empty record that terminates a stream.
pub async fn write_stream<W: AsyncWrite + Unpin>(
    writer: &mut W,
    record_type: u8,
    request_id: u16,
    data: &[u8],
) -> io::Result<()> {
    for chunk in data.chunks(MAX_CONTENT_LEN) {
        write_record(writer, record_type, request_id, chunk).await?;
    }
    Ok(())
}

/// Write `END_REQUEST` with the given protocol status.
pub async fn write_end_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    request_id: u16,
    app_status: u32,
    protocol_status: u8,
) -> io::Result<()> {
    let mut body = [0u8; 8];
    body[..4].copy_from_slice(&app_status.to_be_bytes());
    body[4] = protocol_status;
    write_record(writer, END_REQUEST, request_id, &body).await
}

/// Decode a sequence of name-value pairs.
pub fn decode_pairs(mut buf: &[u8]) -> io::Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    while !buf.is_empty() {
        let name_len = read_len(&mut buf)?;
        let value_len = read_len(&mut buf)?;
        if buf.len() < name_len + value_len {
            return Err(invalid("truncated name-value pair"));
        }
        let name = String::from_utf8_lossy(&buf[..name_len]).into_owned();
        let value = String::from_utf8_lossy(&buf[name_len..name_len + value_len]).into_owned();
        pairs.push((name, value));
        buf = &buf[name_len + value_len..];
    }
    Ok(pairs)
}

/// Append one name-value pair.
pub fn encode_pair(out: &mut Vec<u8>, name: &str, value: &str) {
    encode_len(out, name.len());
    encode_len(out, value.len());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(value.as_bytes());
}

fn read_len(buf: &mut &[u8]) -> io::Result<usize> {
    let first = *buf.first().ok_or_else(|| invalid("truncated length"))?;
    if first & 0x80 == 0 {
        *buf = &buf[1..];
        return Ok(first as usize);
    }
    if buf.len() < 4 {
        return Err(invalid("truncated length"));
    }
    let len = u32::from_be_bytes([first & 0x7f, buf[1], buf[2], buf[3]]);
    *buf = &buf[4..];
    Ok(len as usize)
}

fn encode_len(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        out.extend_from_slice(&(len as u32 | 0x8000_0000).to_be_bytes());
    }
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_use_long_lengths_past_127_bytes() {
        let long = "x".repeat(300);
        let mut buf = Vec::new();
        encode_pair(&mut buf, "SHORT", "v");
        encode_pair(&mut buf, "HTTP_LONG", &long);

        // 1+1+5+1 for the first pair, then a 1-byte name length and a 4-byte value length.
        assert_eq!(buf.len(), 8 + 1 + 4 + 9 + 300);
        assert_eq!(buf[9], 0x80);

        let pairs = decode_pairs(&buf).unwrap();
        assert_eq!(pairs[0], ("SHORT".to_string(), "v".to_string()));
        assert_eq!(pairs[1].1.len(), 300);
    }

    #[test]
    fn truncated_pair_is_rejected() {
        let mut buf = Vec::new();
        encode_pair(&mut buf, "NAME", "value");
        buf.truncate(buf.len() - 1);
        assert!(decode_pairs(&buf).is_err());
    }

    #[tokio::test]
    async fn records_are_padded_to_eight_bytes() {
        let mut out = Vec::new();
        write_record(&mut out, STDOUT, 7, b"hello").await.unwrap();
        assert_eq!(out.len(), HEADER_LEN + 8);
        assert_eq!(&out[..8], &[1, STDOUT, 0, 7, 0, 5, 3, 0]);

        let record = read_record(&mut out.as_slice()).await.unwrap().unwrap();
        assert_eq!(record.record_type, STDOUT);
        assert_eq!(record.request_id, 7);
        assert_eq!(record.content, b"hello");
    }

    #[tokio::test]
    async fn large_streams_are_split() {
        let data = vec![b'a'; MAX_CONTENT_LEN + 10];
        let mut out = Vec::new();
        write_stream(&mut out, STDOUT, 1, &data).await.unwrap();

        let mut reader = out.as_slice();
        let first = read_record(&mut reader).await.unwrap().unwrap();
        let second = read_record(&mut reader).await.unwrap().unwrap();
        assert_eq!(first.content.len(), MAX_CONTENT_LEN);
        assert_eq!(second.content.len(), 10);
        assert!(read_record(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_version_is_an_error() {
        let bytes = [2u8, STDIN, 0, 1, 0, 0, 0, 0];
        assert!(read_record(&mut &bytes[..]).await.is_err());
    }
}
