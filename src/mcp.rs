use std::io::{self, BufRead, Write};

use serde_json::json;
use tracing::{debug, info, warn};

use crate::{ToolContext, execute_tool, tool_definitions_json};

pub(crate) const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";
const MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// How a stdio request was framed; the reply uses the same framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    ContentLength,
    Line,
}

#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) framing: Framing,
    pub(crate) body: Vec<u8>,
}

fn content_length(line: &str) -> Option<Option<usize>> {
    let (name, value) = line.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return None;
    }
    Some(value.trim().parse::<usize>().ok())
}

/// Read one message: `Content-Length` headers plus body, or a single JSON
/// line. Blank lines between messages are skipped; `None` at EOF.
pub(crate) fn read_mcp_frame(reader: &mut impl BufRead) -> io::Result<Option<Frame>> {
    let mut first_line = String::new();
    loop {
        first_line.clear();
        if reader.read_line(&mut first_line)? == 0 {
            return Ok(None);
        }
        if !first_line.trim().is_empty() {
            break;
        }
    }

    let Some(declared) = content_length(&first_line) else {
        return Ok(Some(Frame {
            framing: Framing::Line,
            body: first_line.trim().as_bytes().to_vec(),
        }));
    };

    let mut length = declared;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }
        if let Some(value) = content_length(&line) {
            length = value;
        }
    }
    let length = length.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "bad Content-Length header")
    })?;
    if length > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message too large ({length} bytes)"),
        ));
    }
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;
    Ok(Some(Frame {
        framing: Framing::ContentLength,
        body,
    }))
}

pub(crate) fn write_mcp_response(
    writer: &mut impl Write,
    value: &serde_json::Value,
    framing: Framing,
) -> io::Result<()> {
    let payload = serde_json::to_vec(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{e}")))?;
    match framing {
        Framing::ContentLength => {
            write!(writer, "Content-Length: {}\r\n\r\n", payload.len())?;
            writer.write_all(&payload)?;
        }
        Framing::Line => {
            writer.write_all(&payload)?;
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()
}

fn rpc_error(id: serde_json::Value, code: i64, message: impl Into<String>) -> serde_json::Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() }
    })
}

pub(crate) fn parse_error_response(err: &serde_json::Error) -> serde_json::Value {
    rpc_error(serde_json::Value::Null, -32700, format!("parse error: {err}"))
}

/// Result of handling one JSON-RPC message.
#[derive(Debug, Default)]
pub(crate) struct Dispatch {
    /// `None` for notifications.
    pub(crate) response: Option<serde_json::Value>,
    pub(crate) shutdown: bool,
}

pub(crate) fn handle_message(msg: &serde_json::Value, ctx: &mut ToolContext) -> Dispatch {
    let id = msg.get("id").cloned().unwrap_or(serde_json::Value::Null);
    let has_id = !id.is_null();
    let method = msg.get("method").and_then(|m| m.as_str()).unwrap_or("");
    let params = msg.get("params").cloned().unwrap_or_else(|| json!({}));
    debug!(method, has_id, "mcp request");

    let mut shutdown = false;
    let response = match method {
        "initialize" => {
            let protocol = params
                .get("protocolVersion")
                .and_then(|v| v.as_str())
                .unwrap_or(DEFAULT_PROTOCOL_VERSION);
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": protocol,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }
            })
        }
        "ping" => json!({ "jsonrpc": "2.0", "id": id, "result": {} }),
        "tools/list" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "tools": tool_definitions_json(ctx.contacts_enabled()) }
        }),
        "tools/call" => {
            let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            match execute_tool(name, arguments, ctx) {
                Ok(result) => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "content": [
                            { "type": "text", "text": result.output }
                        ],
                        "details": result.details,
                        "isError": result.is_error
                    }
                }),
                Err(err) => {
                    debug!(tool = name, error = %err, "tool call failed");
                    rpc_error(id, -32000, err)
                }
            }
        }
        "shutdown" => {
            shutdown = true;
            json!({ "jsonrpc": "2.0", "id": id, "result": null })
        }
        _ => rpc_error(id, -32601, "method not found"),
    };

    Dispatch {
        response: has_id.then_some(response),
        shutdown,
    }
}

/// Serve JSON-RPC over a byte stream until EOF or `shutdown`.
pub(crate) fn serve_stream(
    reader: &mut impl BufRead,
    writer: &mut impl Write,
    ctx: &mut ToolContext,
) -> io::Result<()> {
    while let Some(frame) = read_mcp_frame(reader)? {
        let msg: serde_json::Value = match serde_json::from_slice(&frame.body) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "unparseable request");
                write_mcp_response(writer, &parse_error_response(&err), frame.framing)?;
                continue;
            }
        };
        let dispatch = handle_message(&msg, ctx);
        if let Some(response) = &dispatch.response {
            write_mcp_response(writer, response, frame.framing)?;
        }
        if dispatch.shutdown {
            info!("shutdown requested");
            break;
        }
    }
    Ok(())
}

pub(crate) fn run_mcp_server(ctx: &mut ToolContext) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        db = %ctx.store.path().display(),
        contacts = ctx.contacts_enabled(),
        "serving MCP over stdio"
    );
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut writer = io::stdout();
    serve_stream(&mut reader, &mut writer, ctx)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_db::fixtures::sample_db;
    use std::io::Cursor;

    fn framed(value: &serde_json::Value) -> String {
        let body = value.to_string();
        format!("Content-Length: {}\r\n\r\n{body}", body.len())
    }

    fn run(input: &str, ctx: &mut ToolContext) -> String {
        let mut reader = Cursor::new(input.as_bytes().to_vec());
        let mut out = Vec::new();
        serve_stream(&mut reader, &mut out, ctx).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn lines(output: &str) -> Vec<serde_json::Value> {
        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn line_requests_get_line_replies() {
        let db = sample_db();
        let mut ctx = ToolContext::new(db.store(), None);
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );
        let replies = lines(&run(input, &mut ctx));
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(replies[0]["result"]["serverInfo"]["name"], "imessage-mcp");
        assert_eq!(replies[1]["id"], 2);
        assert_eq!(replies[1]["result"]["tools"].as_array().unwrap().len(), 25);
    }

    #[test]
    fn framed_requests_get_framed_replies() {
        let db = sample_db();
        let mut ctx = ToolContext::new(db.store(), None);
        let request = json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": { "name": "get_total_chat_count", "arguments": {} }
        });
        let output = run(&framed(&request), &mut ctx);
        let (header, body) = output.split_once("\r\n\r\n").unwrap();
        assert_eq!(header, format!("Content-Length: {}", body.len()));
        let reply: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(reply["result"]["details"], 2);
        assert_eq!(reply["result"]["content"][0]["type"], "text");
        assert_eq!(reply["result"]["isError"], false);
    }

    #[test]
    fn errors_use_jsonrpc_codes() {
        let db = sample_db();
        let mut ctx = ToolContext::new(db.store(), None);
        let input = concat!(
            "{not json}\n",
            r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"get_message","arguments":{}}}"#,
            "\n",
        );
        let replies = lines(&run(input, &mut ctx));
        assert_eq!(replies[0]["error"]["code"], -32700);
        assert!(replies[0]["id"].is_null());
        assert_eq!(replies[1]["error"]["code"], -32601);
        assert_eq!(replies[2]["error"]["code"], -32000);
        assert!(replies[2]["error"]["message"].as_str().unwrap().starts_with("args:"));
    }

    #[test]
    fn shutdown_stops_reading() {
        let db = sample_db();
        let mut ctx = ToolContext::new(db.store(), None);
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"shutdown"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        );
        let replies = lines(&run(input, &mut ctx));
        assert_eq!(replies.len(), 1);
        assert!(replies[0]["result"].is_null());
    }

    #[test]
    fn frame_reader_handles_extra_headers() {
        let input = "Content-Type: application/json\r\n";
        let mut reader = Cursor::new(input.as_bytes().to_vec());
        let frame = read_mcp_frame(&mut reader).unwrap().unwrap();
        assert_eq!(frame.framing, Framing::Line);

        let input = "content-length: 2\r\nContent-Type: application/json\r\n\r\n{}";
        let mut reader = Cursor::new(input.as_bytes().to_vec());
        let frame = read_mcp_frame(&mut reader).unwrap().unwrap();
        assert_eq!(frame.framing, Framing::ContentLength);
        assert_eq!(frame.body, b"{}");
        assert!(read_mcp_frame(&mut reader).unwrap().is_none());

        let mut reader = Cursor::new(b"Content-Length: lots\r\n\r\n".to_vec());
        assert!(read_mcp_frame(&mut reader).is_err());
    }
}
