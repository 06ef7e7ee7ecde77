//! String-keyed dispatch: op name + JSON argument array in, JSON value out.

use std::time::Duration;

use serde_json::{json, Value};

use crate::adapter::AppHostAdapter;
use crate::error::{AppHostError, Result};
use crate::protocol::*;
use crate::stack::Stack;

/// Run one flat operation. Argument errors and unknown ops fail before any registry access.
pub fn call<S: Stack>(adapter: &AppHostAdapter<S>, op: &str, args: &[Value]) -> Result<Value> {
    match op {
        LOG => {
            if !adapter.is_shut_down() {
                tracing::info!(target: "apphost::guest", "{}", join_log_args(args));
            }
            Ok(Value::Null)
        }
        SLEEP => {
            let millis = arg_u64(args, 0, "duration")?;
            if !adapter.is_shut_down() {
                std::thread::sleep(Duration::from_millis(millis));
            }
            Ok(Value::Null)
        }
        SERVICE_REGISTER => {
            adapter.service_register(arg_str(args, 0, "service")?)?;
            Ok(Value::Null)
        }
        SERVICE_CLOSE => {
            adapter.service_close(arg_str(args, 0, "service")?)?;
            Ok(Value::Null)
        }
        CONN_ACCEPT => Ok(Value::String(
            adapter.conn_accept(arg_str(args, 0, "service")?)?,
        )),
        CONN_CLOSE => {
            adapter.conn_close(arg_str(args, 0, "id")?)?;
            Ok(Value::Null)
        }
        CONN_WRITE => {
            let id = arg_str(args, 0, "id")?;
            let data = arg_str(args, 1, "data")?;
            adapter.conn_write(id, data.as_bytes())?;
            Ok(Value::Null)
        }
        CONN_READ => Ok(Value::String(adapter.conn_read(arg_str(args, 0, "id")?)?)),
        QUERY => {
            let identity = arg_str(args, 0, "identity")?;
            let query = arg_str(args, 1, "query")?;
            Ok(Value::String(adapter.query(identity, query)?))
        }
        QUERY_NAME => {
            let name = arg_str(args, 0, "name")?;
            let query = arg_str(args, 1, "query")?;
            Ok(Value::String(adapter.query_name(name, query)?))
        }
        GET_NODE_INFO => {
            let info = adapter.node_info(arg_str(args, 0, "identity")?)?;
            serde_json::to_value(info).map_err(|e| AppHostError::MalformedInput(e.to_string()))
        }
        RESOLVE => Ok(Value::String(adapter.resolve(arg_str(args, 0, "name")?)?)),
        other => Err(AppHostError::MalformedInput(format!(
            "unknown operation: {other}"
        ))),
    }
}

/// Like [`call`], with arguments as a JSON array text. Empty text means no arguments.
pub fn call_json<S: Stack>(adapter: &AppHostAdapter<S>, op: &str, args_json: &str) -> Result<Value> {
    let args = parse_args(args_json)?;
    call(adapter, op, &args)
}

pub fn parse_args(args_json: &str) -> Result<Vec<Value>> {
    if args_json.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str(args_json) {
        Ok(Value::Array(args)) => Ok(args),
        Ok(_) => Err(AppHostError::MalformedInput(
            "arguments must be a JSON array".to_string(),
        )),
        Err(e) => Err(AppHostError::MalformedInput(format!(
            "arguments are not valid JSON: {e}"
        ))),
    }
}

/// Wrap a call result as `{"ok": value}` or `{"error": {"kind", "message"}}`.
pub fn envelope(result: Result<Value>) -> Value {
    match result {
        Ok(value) => json!({ "ok": value }),
        Err(e) => json!({ "error": { "kind": e.kind(), "message": e.to_string() } }),
    }
}

fn arg<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a Value> {
    args.get(index)
        .ok_or_else(|| AppHostError::MalformedInput(format!("missing argument {index} ({name})")))
}

fn arg_str<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a str> {
    arg(args, index, name)?.as_str().ok_or_else(|| {
        AppHostError::MalformedInput(format!("argument {index} ({name}) must be a string"))
    })
}

fn arg_u64(args: &[Value], index: usize, name: &str) -> Result<u64> {
    arg(args, index, name)?.as_u64().ok_or_else(|| {
        AppHostError::MalformedInput(format!(
            "argument {index} ({name}) must be a non-negative integer"
        ))
    })
}

fn join_log_args(args: &[Value]) -> String {
    args.iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
