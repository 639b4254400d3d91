//! Fixed-width header codec.
//!
//! Encodes outgoing payloads into frames and reads frames off a byte
//! stream. Header layout is described in the parent module.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::FrameError;

/// Frame encoder/decoder for one header width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    header_width: usize,
    max_payload: usize,
}

impl FrameCodec {
    /// Create a codec. `max_payload` bounds what `read_frame` will allocate.
    pub fn new(header_width: usize, max_payload: usize) -> Self {
        Self {
            header_width,
            max_payload,
        }
    }

    /// Encode `payload` as header + UTF-8 bytes.
    ///
    /// Fails with [`FrameError::Encoding`] if the byte length needs more
    /// digits than the header has room for.
    pub fn encode(&self, payload: &str) -> Result<Bytes, FrameError> {
        let body = payload.as_bytes();
        let digits = body.len().to_string();
        if digits.len() > self.header_width {
            return Err(FrameError::Encoding {
                len: body.len(),
                width: self.header_width,
            });
        }

        let mut frame = BytesMut::with_capacity(self.header_width + body.len());
        frame.put_slice(digits.as_bytes());
        frame.put_bytes(b' ', self.header_width - digits.len());
        frame.put_slice(body);
        Ok(frame.freeze())
    }

    /// Parse a header into the payload length it declares.
    pub fn decode_header(&self, header: &[u8]) -> Result<usize, FrameError> {
        let text = std::str::from_utf8(header)
            .map_err(|_| FrameError::InvalidHeader(String::from_utf8_lossy(header).into_owned()))?;
        let trimmed = text.trim();
        trimmed
            .parse::<usize>()
            .map_err(|_| FrameError::InvalidHeader(trimmed.to_string()))
    }

    /// Read one frame.
    ///
    /// Returns `Ok(None)` when the peer closed the stream before sending any
    /// header byte. A stream that ends inside a frame is
    /// [`FrameError::Truncated`].
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Option<String>, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = vec![0u8; self.header_width];
        let got = read_full(reader, &mut header).await?;
        if got == 0 {
            return Ok(None);
        }
        if got < self.header_width {
            return Err(FrameError::Truncated {
                expected: self.header_width,
                got,
            });
        }

        let len = self.decode_header(&header)?;
        if len > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                len,
                max: self.max_payload,
            });
        }

        let mut payload = vec![0u8; len];
        let got = read_full(reader, &mut payload).await?;
        if got < len {
            return Err(FrameError::Truncated { expected: len, got });
        }

        String::from_utf8(payload)
            .map(Some)
            .map_err(|_| FrameError::InvalidUtf8)
    }
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
///
/// Returns the number of bytes read; less than `buf.len()` means the
/// stream ended.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tokio_test::io::Builder;

    fn codec() -> FrameCodec {
        FrameCodec::new(64, 1024)
    }

    #[test]
    fn test_encode_header_layout() {
        let frame = codec().encode("hello").unwrap();
        assert_eq!(frame.len(), 64 + 5);
        assert_eq!(&frame[..2], b"5 ");
        assert!(frame[1..64].iter().all(|&b| b == b' '));
        assert_eq!(&frame[64..], b"hello");
    }

    #[test]
    fn test_encode_counts_bytes_not_chars() {
        let frame = codec().encode("héllo").unwrap();
        assert_eq!(&frame[..1], b"6");
        assert_eq!(codec().decode_header(&frame[..64]).unwrap(), 6);
        assert_eq!(std::str::from_utf8(&frame[64..]).unwrap(), "héllo");
    }

    #[test]
    fn test_encode_empty_payload() {
        let frame = codec().encode("").unwrap();
        assert_eq!(frame.len(), 64);
        assert_eq!(codec().decode_header(&frame).unwrap(), 0);
    }

    #[test]
    fn test_encode_rejects_oversized_length() {
        // Two-byte header holds at most 99
        let narrow = FrameCodec::new(2, 1024);
        assert!(narrow.encode(&"a".repeat(99)).is_ok());
        match narrow.encode(&"a".repeat(100)) {
            Err(FrameError::Encoding { len, width }) => {
                assert_eq!(len, 100);
                assert_eq!(width, 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_decode_header_trims_padding() {
        let mut header = b"1234".to_vec();
        header.resize(64, b' ');
        assert_eq!(codec().decode_header(&header).unwrap(), 1234);
    }

    #[test]
    fn test_decode_header_invalid() {
        let headers: [&[u8]; 6] = [b"abc", b"-5", b"", b"    ", b"12 34", b"\xff\xfe"];
        for header in headers {
            match codec().decode_header(header) {
                Err(err @ FrameError::InvalidHeader(_)) => assert!(err.is_protocol()),
                other => panic!("header {:?}: unexpected {:?}", header, other),
            }
        }
    }

    #[tokio::test]
    async fn test_read_frame() {
        let frame = codec().encode("hello").unwrap();
        let mut stream = Builder::new().read(&frame).build();
        let payload = codec().read_frame(&mut stream).await.unwrap();
        assert_eq!(payload.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_read_frame_split_reads() {
        let frame = codec().encode("split across reads").unwrap();
        let mut stream = Builder::new()
            .read(&frame[..10])
            .read(&frame[10..70])
            .read(&frame[70..])
            .build();
        let payload = codec().read_frame(&mut stream).await.unwrap();
        assert_eq!(payload.as_deref(), Some("split across reads"));
    }

    #[tokio::test]
    async fn test_read_frame_clean_eof() {
        let mut stream = Builder::new().build();
        assert!(codec().read_frame(&mut stream).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_truncated_header() {
        let mut stream = Builder::new().read(b"5   ").build();
        match codec().read_frame(&mut stream).await {
            Err(FrameError::Truncated { expected, got }) => {
                assert_eq!(expected, 64);
                assert_eq!(got, 4);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_frame_truncated_payload() {
        let frame = codec().encode("hello").unwrap();
        let mut stream = Builder::new().read(&frame[..66]).build();
        match codec().read_frame(&mut stream).await {
            Err(FrameError::Truncated { expected, got }) => {
                assert_eq!(expected, 5);
                assert_eq!(got, 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_frame_too_large() {
        let small = FrameCodec::new(64, 4);
        let frame = codec().encode("hello").unwrap();
        let mut stream = Builder::new().read(&frame[..64]).build();
        match small.read_frame(&mut stream).await {
            Err(FrameError::PayloadTooLarge { len, max }) => {
                assert_eq!(len, 5);
                assert_eq!(max, 4);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_frame_invalid_utf8() {
        let mut bytes = b"2".to_vec();
        bytes.resize(64, b' ');
        bytes.extend_from_slice(&[0xc3, 0x28]);
        let mut stream = Builder::new().read(&bytes).build();
        assert!(matches!(
            codec().read_frame(&mut stream).await,
            Err(FrameError::InvalidUtf8)
        ));
    }

    #[tokio::test]
    async fn test_read_frame_reset() {
        let mut stream = Builder::new()
            .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
            .build();
        let err = codec().read_frame(&mut stream).await.unwrap_err();
        assert!(err.is_reset());
    }
}
