use std::io::{self, Read};

use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, info, warn};

use crate::{HttpConfig, ToolContext, handle_message, parse_error_response};

pub(crate) const MCP_PATH: &str = "/mcp";
const MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, PartialEq)]
pub(crate) struct HttpReply {
    pub(crate) status: u16,
    pub(crate) body: Option<serde_json::Value>,
}

impl HttpReply {
    fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    fn empty(status: u16) -> Self {
        Self { status, body: None }
    }
}

fn read_body(request: &mut Request) -> Result<Vec<u8>, String> {
    let mut body = Vec::new();
    request
        .as_reader()
        .take(MAX_BODY_BYTES + 1)
        .read_to_end(&mut body)
        .map_err(|e| format!("read body: {e}"))?;
    Ok(body)
}

/// Route one HTTP request: only `POST /mcp` carries JSON-RPC.
pub(crate) fn route_http(
    method: &Method,
    url: &str,
    body: &[u8],
    ctx: &mut ToolContext,
) -> HttpReply {
    let path = url.split('?').next().unwrap_or(url);
    if path != MCP_PATH {
        return HttpReply::json(404, serde_json::json!({ "error": "not found" }));
    }
    if *method != Method::Post {
        return HttpReply::json(405, serde_json::json!({ "error": "method not allowed" }));
    }
    if body.len() as u64 > MAX_BODY_BYTES {
        return HttpReply::json(413, serde_json::json!({ "error": "request body too large" }));
    }

    let msg: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(err) => return HttpReply::json(400, parse_error_response(&err)),
    };
    match handle_message(&msg, ctx).response {
        Some(response) => HttpReply::json(200, response),
        None => HttpReply::empty(202),
    }
}

fn respond(request: Request, reply: HttpReply) -> io::Result<()> {
    match reply.body {
        Some(body) => {
            let mut response =
                Response::from_string(body.to_string()).with_status_code(reply.status);
            if let Ok(header) = "Content-Type: application/json".parse::<Header>() {
                response.add_header(header);
            }
            request.respond(response)
        }
        None => request.respond(Response::empty(reply.status)),
    }
}

/// Serve JSON-RPC over HTTP, one request at a time.
pub(crate) fn run_http_server(
    config: &HttpConfig,
    ctx: &mut ToolContext,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.host, config.port);
    let server = Server::http(&addr)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("server: {e}")))?;
    info!(
        url = %format!("http://{addr}{MCP_PATH}"),
        db = %ctx.store.path().display(),
        contacts = ctx.contacts_enabled(),
        "serving MCP over HTTP"
    );

    for mut request in server.incoming_requests() {
        let method = request.method().clone();
        let url = request.url().to_string();
        let reply = match read_body(&mut request) {
            Ok(body) => route_http(&method, &url, &body, ctx),
            Err(err) => HttpReply::json(400, serde_json::json!({ "error": err })),
        };
        debug!(%method, %url, status = reply.status, "http request");
        if let Err(err) = respond(request, reply) {
            warn!(error = %err, "failed to write http response");
        }
    }
    Ok(())
}
