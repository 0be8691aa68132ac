//! Socket relay stage.
//!
//! The agent binds the socket before spawning the child; the instrument
//! inside the child connects back and writes tag-prefixed records. The
//! relay accepts that single connection, reassembles records from the byte
//! stream, and forwards them to the correlator.
//!
//! End-of-stream and undecodable input both end the relay the same way:
//! its output channel closes, which cascades shutdown through the
//! correlator and lets the pipeline drain whatever was accumulated. The
//! relay never terminates the process.

use std::time::Duration;

use kestrel_wire::Record;
use log::{debug, error, info};
use tokio::io::AsyncReadExt;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

const READ_CHUNK: usize = 4096;

/// Accept one instrument connection and relay its records until the
/// stream ends. Consumes the sender, closing the record channel on return.
/// `budget` bounds each handoff to the correlator.
pub async fn run(listener: UnixListener, records: mpsc::Sender<Record>, budget: Duration) {
    let (mut conn, _addr) = match listener.accept().await {
        Ok(conn) => conn,
        Err(e) => {
            error!("relay: accept failed: {e}");
            return;
        }
    };
    info!("relay: instrument connected");

    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    let mut relayed: u64 = 0;

    loop {
        let n = match conn.read(&mut chunk).await {
            Ok(0) => {
                info!("relay: socket EOF after {relayed} records");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                error!("relay: read failed: {e}");
                return;
            }
        };
        buf.extend_from_slice(&chunk[..n]);

        let mut consumed = 0;
        loop {
            match kestrel_wire::decode(&buf[consumed..]) {
                Ok(Some((record, used))) => {
                    consumed += used;
                    if !forward(&records, record, budget).await {
                        return;
                    }
                    relayed += 1;
                }
                Ok(None) => break, // incomplete record, need more input
                Err(e) => {
                    error!("relay: undecodable record, closing stream: {e}");
                    return;
                }
            }
        }
        buf.drain(..consumed);
    }
}

/// Hand one record to the correlator within the back-pressure budget.
/// Returns false when the relay should stop (consumer gone).
async fn forward(records: &mpsc::Sender<Record>, record: Record, budget: Duration) -> bool {
    match timeout(budget, records.send(record)).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => {
            debug!("relay: correlator gone, stopping");
            false
        }
        Err(_) => {
            // Stalled consumer. Drop the record rather than wedging the
            // whole agent; telemetry here is best-effort.
            error!("relay: handoff timed out after {budget:?}, dropping record");
            true
        }
    }
}
