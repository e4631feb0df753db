// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Length-prefixed frames, optionally sealed with AES-256-GCM.
//!
//! Wire layout of one frame:
//!
//! ```text
//! +----------------+---------------------------------------------+
//! | len: u32 (BE)  | payload (len bytes)                         |
//! +----------------+---------------------------------------------+
//! ```
//!
//! In encrypted mode the payload is `nonce(12) || ciphertext || tag(16)`.
//! Every sealed frame uses a fresh random nonce from the system CSPRNG.

use std::fmt;

use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use serialite_config::model::RpcConfig;
use serialite_config::parse_key;
use serialite_core::{SerialiteError, TransportMode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload accepted in either direction: 16 MiB.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

const TAG_LEN: usize = 16;

/// Reads and writes frames for one transport mode.
#[derive(Clone)]
pub struct FrameCodec {
    key: Option<[u8; 32]>,
}

impl fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCodec")
            .field("mode", &self.mode())
            .field("key", &self.key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl FrameCodec {
    /// Frames carry plain JSON.
    pub fn unencrypted() -> Self {
        Self { key: None }
    }

    /// Frames are sealed under `key`.
    pub fn encrypted(key: [u8; 32]) -> Self {
        Self { key: Some(key) }
    }

    /// Builds the codec the config asks for.
    pub fn from_config(config: &RpcConfig) -> Result<Self, SerialiteError> {
        match config.transport {
            TransportMode::Unencrypted => Ok(Self::unencrypted()),
            TransportMode::Encrypted => {
                let key = config
                    .key
                    .as_deref()
                    .and_then(parse_key)
                    .ok_or_else(|| {
                        SerialiteError::Config(
                            "encrypted transport needs a 64 hex character rpc.key".to_string(),
                        )
                    })?;
                Ok(Self::encrypted(key))
            }
        }
    }

    pub fn mode(&self) -> TransportMode {
        if self.key.is_some() {
            TransportMode::Encrypted
        } else {
            TransportMode::Unencrypted
        }
    }

    /// Reads one frame and returns its plaintext payload.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly between
    /// frames.
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Option<Vec<u8>>, SerialiteError>
    where
        R: AsyncRead + Unpin,
    {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(io_error("read frame length", e)),
        }

        let len = u32::from_be_bytes(len_buf);
        if len > MAX_FRAME_LEN {
            return Err(SerialiteError::transport(format!(
                "frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"
            )));
        }

        let mut payload = vec![0u8; len as usize];
        reader
            .read_exact(&mut payload)
            .await
            .map_err(|e| io_error("read frame payload", e))?;

        match &self.key {
            Some(key) => open(key, payload).map(Some),
            None => Ok(Some(payload)),
        }
    }

    /// Writes `payload` as one frame and flushes.
    pub async fn write_frame<W>(&self, writer: &mut W, payload: &[u8]) -> Result<(), SerialiteError>
    where
        W: AsyncWrite + Unpin,
    {
        let body = match &self.key {
            Some(key) => seal(key, payload)?,
            None => payload.to_vec(),
        };
        let len = u32::try_from(body.len())
            .ok()
            .filter(|len| *len <= MAX_FRAME_LEN)
            .ok_or_else(|| {
                SerialiteError::transport(format!(
                    "frame of {} bytes exceeds the {MAX_FRAME_LEN} byte limit",
                    body.len()
                ))
            })?;

        writer
            .write_all(&len.to_be_bytes())
            .await
            .map_err(|e| io_error("write frame length", e))?;
        writer
            .write_all(&body)
            .await
            .map_err(|e| io_error("write frame payload", e))?;
        writer
            .flush()
            .await
            .map_err(|e| io_error("flush frame", e))
    }
}

fn io_error(context: &str, e: std::io::Error) -> SerialiteError {
    SerialiteError::Transport {
        message: format!("{context}: {e}"),
        source: Some(Box::new(e)),
    }
}

fn aead_key(key: &[u8; 32]) -> Result<LessSafeKey, SerialiteError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| SerialiteError::transport("failed to create AES-256-GCM key"))?;
    Ok(LessSafeKey::new(unbound))
}

fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, SerialiteError> {
    let key = aead_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| SerialiteError::transport("failed to generate random nonce"))?;

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::empty(),
        &mut in_out,
    )
    .map_err(|_| SerialiteError::transport("AES-256-GCM encryption failed"))?;

    let mut framed = Vec::with_capacity(NONCE_LEN + in_out.len());
    framed.extend_from_slice(&nonce_bytes);
    framed.extend_from_slice(&in_out);
    Ok(framed)
}

fn open(key: &[u8; 32], mut sealed: Vec<u8>) -> Result<Vec<u8>, SerialiteError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(SerialiteError::transport("sealed frame too short"));
    }
    let key = aead_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&sealed[..NONCE_LEN]);
    let ciphertext = &mut sealed[NONCE_LEN..];

    let plaintext = key
        .open_in_place(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::empty(),
            ciphertext,
        )
        .map_err(|_| {
            SerialiteError::transport("AES-256-GCM decryption failed -- wrong key or corrupted frame")
        })?;
    Ok(plaintext.to_vec())
}
