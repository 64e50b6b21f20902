use crate::{
    crypto::Hash,
    error::NetError,
    objstore::{self, Root},
};
use byteorder::{BigEndian, ByteOrder};
use ed25519_dalek::PUBLIC_KEY_LENGTH;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Frame {
    Subscribe {
        public_key: [u8; PUBLIC_KEY_LENGTH],
        nonce: u64,
    },
    Root(Root),
    GetObjects {
        id: u64,
        hashes: Vec<Hash>,
    },
    Objects {
        id: u64,
        objects: Vec<Option<Vec<u8>>>,
    },
}

// u32 big-endian length, then the bincode body
pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, frame: &Frame) -> Result<(), NetError> {
    let body = objstore::encode(frame).map_err(|e| NetError::Codec(e.to_string()))?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(NetError::FrameTooLarge(body.len(), MAX_FRAME_BYTES));
    }
    let mut header = [0u8; 4];
    BigEndian::write_u32(&mut header, body.len() as u32);
    w.write_all(&header).await?;
    w.write_all(&body).await?;
    w.flush().await?;
    Ok(())
}

/// `Ok(None)` on a clean EOF between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<Frame>, NetError> {
    let mut header = [0u8; 4];
    match r.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = BigEndian::read_u32(&header) as usize;
    if len == 0 || len > MAX_FRAME_BYTES {
        return Err(NetError::FrameTooLarge(len, MAX_FRAME_BYTES));
    }
    let mut body = vec![0u8; len];
    r.read_exact(&mut body).await?;
    let frame = objstore::decode(&body).map_err(|e| NetError::Codec(e.to_string()))?;
    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_bytes;

    #[tokio::test]
    async fn frames_survive_a_pipe() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let sent = Frame::GetObjects {
            id: 9,
            hashes: vec![hash_bytes(b"x"), hash_bytes(b"y")],
        };
        write_frame(&mut a, &sent).await.unwrap();
        drop(a);

        match read_frame(&mut b).await.unwrap() {
            Some(Frame::GetObjects { id, hashes }) => {
                assert_eq!(id, 9);
                assert_eq!(hashes, vec![hash_bytes(b"x"), hash_bytes(b"y")]);
            }
            other => panic!("unexpected frame {other:?}"),
        }
        assert!(read_frame(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_length_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
        assert!(matches!(
            read_frame(&mut b).await,
            Err(NetError::FrameTooLarge(..))
        ));
    }
}
