//! JSON-lines serving loop: `{"id"?, "op", "args"?}` per input line, envelope per output line.

use std::io::{BufRead, Write};
use std::sync::Mutex;

use apphost_core::dispatch::{call, envelope};
use apphost_core::{protocol, AppHostAdapter, AppHostError, Stack};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Request {
    /// Echoed back so a host can match responses to concurrent requests.
    #[serde(default)]
    id: Value,
    op: String,
    #[serde(default)]
    args: Vec<Value>,
}

impl Request {
    /// Operations that may wait on the network indefinitely. Everything else answers at once.
    fn may_block(&self) -> bool {
        matches!(
            self.op.as_str(),
            protocol::CONN_ACCEPT | protocol::CONN_READ | protocol::QUERY | protocol::QUERY_NAME
        )
    }

    /// Queries end on their own (refusal or timeout); accepts and reads only end when woken.
    fn ends_on_its_own(&self) -> bool {
        matches!(self.op.as_str(), protocol::QUERY | protocol::QUERY_NAME)
    }
}

fn parse_request(raw: &[u8]) -> Result<Request, AppHostError> {
    let line = std::str::from_utf8(raw)
        .map_err(|e| AppHostError::MalformedInput(format!("request line is not UTF-8: {e}")))?;
    serde_json::from_str(line)
        .map_err(|e| AppHostError::MalformedInput(format!("bad request line: {e}")))
}

fn respond<S: Stack>(adapter: &AppHostAdapter<S>, req: Request) -> Value {
    let mut resp = envelope(call(adapter, &req.op, &req.args));
    resp["id"] = req.id;
    resp
}

fn rejected(err: AppHostError) -> Value {
    let mut resp = envelope(Err(err));
    resp["id"] = Value::Null;
    resp
}

fn write_response<W: Write>(output: &Mutex<W>, resp: &Value) {
    let mut out = output.lock().unwrap_or_else(|e| e.into_inner());
    if let Err(e) = writeln!(out, "{resp}").and_then(|_| out.flush()) {
        warn!(error = %e, "failed to write response");
    }
}

/// Serve until `input` ends or fails, then shut the adapter down.
///
/// Requests run in arrival order. Accepts, reads and queries run on worker threads so a
/// blocked call does not stall later lines; their responses are written when they finish.
/// At end of input the outstanding queries are awaited, then shutdown wakes any pending
/// accept or read.
pub fn serve<S: Stack, R: BufRead, W: Write + Send>(
    adapter: &AppHostAdapter<S>,
    input: R,
    output: W,
) -> std::io::Result<()> {
    let output = Mutex::new(output);
    let output = &output;
    std::thread::scope(|scope| {
        let mut queries = Vec::new();
        let mut lines = input.split(b'\n');
        let result = loop {
            let mut raw = match lines.next() {
                None => break Ok(()),
                Some(Err(e)) => break Err(e),
                Some(Ok(raw)) => raw,
            };
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            if raw.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let req = match parse_request(&raw) {
                Ok(req) => req,
                Err(e) => {
                    write_response(output, &rejected(e));
                    continue;
                }
            };
            if !req.may_block() {
                write_response(output, &respond(adapter, req));
                continue;
            }
            let awaited = req.ends_on_its_own();
            let worker = scope.spawn(move || write_response(output, &respond(adapter, req)));
            if awaited {
                queries.push(worker);
            }
        };
        match &result {
            Ok(()) => info!("input closed, shutting down"),
            Err(e) => warn!(error = %e, "input failed, shutting down"),
        }
        for worker in queries {
            if worker.join().is_err() {
                warn!("query worker panicked");
            }
        }
        adapter.shutdown();
        result
    })
}
