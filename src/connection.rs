//! The generic connection loop: Connecting → Authenticating → Serving →
//! Closed, shared by the TCP and Unix listeners.
//!
//! Grounded in `server/handlers/{tcp,net}.go`: a buffered reader/writer
//! pair, `ReadString('\n')`, trim, parse-or-ignore, apply, write the
//! response plus one trailing newline, flush. The auth handshake (§4.6) is
//! inserted ahead of that loop rather than folded into it, since it has
//! its own framing (`AUTH.CHALLENGE.REQ`/`AUTH.CHALLENGE.RES`) and only
//! ever runs once per connection.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::auth::{Authenticator, Ed448Keys};
use crate::codec::{Request, Response};
use crate::errors::StoreError;
use crate::store::{ConsensusHandle, Node};

/// Drives one connection through its full lifecycle. Returns once the
/// peer disconnects or a fatal I/O error occurs. In the Serving state,
/// unparseable lines are dropped silently; the auth handshake is the only
/// place a parse failure produces a response.
pub async fn handle_connection<S, K, C>(
    stream: S,
    node: Arc<Node<C>>,
    authenticator: Arc<Authenticator<K>>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
    K: Ed448Keys,
    C: ConsensusHandle,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    eprintln!("DEBUG before authenticate");
    if !authenticate(&mut reader, &mut writer, &authenticator).await {
        eprintln!("DEBUG authenticate failed");
        return;
    }
    eprintln!("DEBUG after authenticate, before serve");

    serve(&mut reader, &mut writer, &node).await;
    eprintln!("DEBUG after serve");
}

/// Authenticating state: send a fresh challenge, wait for the signed
/// reply, verify it. Returns `true` once the connection may move to
/// Serving; `false` if it should close.
async fn authenticate<R, W, K>(
    reader: &mut BufReader<R>,
    writer: &mut W,
    authenticator: &Authenticator<K>,
) -> bool
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    K: Ed448Keys,
{
    let challenge_hex = authenticator.generate_challenge_hex();
    let req_line = format!("AUTH.CHALLENGE.REQ {challenge_hex}\n");
    if writer.write_all(req_line.as_bytes()).await.is_err() || writer.flush().await.is_err() {
        return false;
    }

    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) => return false,
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, "error reading auth response");
            return false;
        }
    }

    let result = match Request::parse(&line) {
        Ok(Request::AuthChallengeRes { client_id, signature_hex }) => {
            authenticator.verify(&challenge_hex, &client_id, &signature_hex)
        }
        Ok(_) => Err(StoreError::InvalidCommand),
        Err(e) => Err(e),
    };

    let reply = match &result {
        Ok(()) => Response::Ok(true).format(),
        Err(e) => Response::from_store_error(e).format(),
    };
    let _ = writer.write_all(format!("{reply}\n").as_bytes()).await;
    let _ = writer.flush().await;

    result.is_ok()
}

/// Serving state: read one command per line, dispatch, write the response
/// plus a trailing newline. EOF ends the loop cleanly; other I/O errors
/// end it with a warning. Unparseable lines are dropped silently rather
/// than answered with an error, matching the original's
/// `ParseStringIntoCommand` + `continue` on the main command loop.
async fn serve<R, W, C>(reader: &mut BufReader<R>, writer: &mut W, node: &Arc<Node<C>>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    C: ConsensusHandle,
{
    let mut line = String::new();
    loop {
        line.clear();
        eprintln!("DEBUG serve: about to read_line");
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "connection read error");
                break;
            }
        }
        eprintln!("DEBUG serve: read line {:?}", line);

        let trimmed = line.trim();
        if trimmed.is_empty() || Request::parse(trimmed).is_err() {
            continue;
        }

        eprintln!("DEBUG serve: about to apply_cmd");
        let response = node.apply_cmd(trimmed).await;
        eprintln!("DEBUG serve: applied, response={:?}", response);
        if writer
            .write_all(format!("{response}\n").as_bytes())
            .await
            .is_err()
        {
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
        eprintln!("DEBUG serve: wrote and flushed response");
    }
    eprintln!("DEBUG serve: loop exited");
}
