//! Symmetric-key handshake
//!
//! Three frames before any protocol traffic: the server sends a random
//! challenge, the client answers with HMAC-SHA256 over it keyed by the
//! shared secret, and the server sends a verdict frame. Verification is
//! constant-time. The key itself never crosses the wire.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::error::{WireError, WireResult};
use crate::frame::FrameCodec;

/// Challenge length in bytes
pub const CHALLENGE_LEN: usize = 32;

const WELCOME: &[u8] = b"#WELCOME#";
const DENIED: &[u8] = b"#DENIED#";

/// Generate a fresh random challenge.
pub fn make_challenge() -> WireResult<[u8; CHALLENGE_LEN]> {
    let rng = SystemRandom::new();
    let mut challenge = [0u8; CHALLENGE_LEN];
    rng.fill(&mut challenge)
        .map_err(|_| WireError::protocol("challenge entropy unavailable"))?;
    Ok(challenge)
}

/// Compute the answer to a challenge.
pub fn answer_challenge(authkey: &[u8], challenge: &[u8]) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, authkey);
    hmac::sign(&key, challenge).as_ref().to_vec()
}

/// Verify an answer in constant time.
pub fn verify_answer(authkey: &[u8], challenge: &[u8], answer: &[u8]) -> bool {
    let key = hmac::Key::new(hmac::HMAC_SHA256, authkey);
    hmac::verify(&key, challenge, answer).is_ok()
}

/// Run the server side of the handshake on a fresh connection.
///
/// Sends the challenge, checks the answer, and sends the verdict frame.
/// Returns [`WireError::AuthFailed`] when the peer presented the wrong
/// key; the caller should drop the connection in that case.
pub async fn serve_handshake<S>(framed: &mut Framed<S, FrameCodec>, authkey: &[u8]) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let challenge = make_challenge()?;
    framed.send(Bytes::copy_from_slice(&challenge)).await?;
    let answer = framed.next().await.ok_or(WireError::ConnectionClosed)??;
    if verify_answer(authkey, &challenge, &answer) {
        framed.send(Bytes::from_static(WELCOME)).await?;
        Ok(())
    } else {
        debug!("peer failed the authentication challenge");
        framed.send(Bytes::from_static(DENIED)).await?;
        Err(WireError::AuthFailed)
    }
}

/// Run the client side of the handshake on a fresh connection.
pub async fn join_handshake<S>(framed: &mut Framed<S, FrameCodec>, authkey: &[u8]) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let challenge = framed.next().await.ok_or(WireError::ConnectionClosed)??;
    if challenge.len() != CHALLENGE_LEN {
        return Err(WireError::protocol(format!(
            "challenge of {} bytes, expected {CHALLENGE_LEN}",
            challenge.len()
        )));
    }
    framed
        .send(Bytes::from(answer_challenge(authkey, &challenge)))
        .await?;
    let verdict = framed.next().await.ok_or(WireError::ConnectionClosed)??;
    if verdict.as_ref() == WELCOME {
        Ok(())
    } else {
        Err(WireError::AuthFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed_pair() -> (
        Framed<tokio::io::DuplexStream, FrameCodec>,
        Framed<tokio::io::DuplexStream, FrameCodec>,
    ) {
        let (a, b) = tokio::io::duplex(4096);
        (
            Framed::new(a, FrameCodec::new()),
            Framed::new(b, FrameCodec::new()),
        )
    }

    #[test]
    fn answers_are_keyed() {
        let challenge = make_challenge().unwrap();
        let answer = answer_challenge(b"secret", &challenge);
        assert!(verify_answer(b"secret", &challenge, &answer));
        assert!(!verify_answer(b"other", &challenge, &answer));
        assert!(!verify_answer(b"secret", &challenge, b"forged"));
    }

    #[test]
    fn challenges_are_unique() {
        assert_ne!(make_challenge().unwrap(), make_challenge().unwrap());
    }

    #[tokio::test]
    async fn matching_keys_shake_hands() {
        let (mut server, mut client) = framed_pair();
        let (server_side, client_side) = tokio::join!(
            serve_handshake(&mut server, b"shared secret"),
            join_handshake(&mut client, b"shared secret"),
        );
        server_side.unwrap();
        client_side.unwrap();
    }

    #[tokio::test]
    async fn wrong_key_is_denied_on_both_sides() {
        let (mut server, mut client) = framed_pair();
        let (server_side, client_side) = tokio::join!(
            serve_handshake(&mut server, b"right key"),
            join_handshake(&mut client, b"wrong key"),
        );
        assert!(matches!(server_side, Err(WireError::AuthFailed)));
        assert!(matches!(client_side, Err(WireError::AuthFailed)));
    }
}
