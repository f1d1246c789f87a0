//! Request routing and response construction.

use crate::{
    http::{request::RequestDescriptor, response::Response, types::StatusCode},
    server::static_files::{self, DocRoot},
};

const HELLO: &[u8] = b"Hello";
const ROUTE_NOT_FOUND: &[u8] = b"Route Not Found";
const FORBIDDEN_FILE_ROUTE: &[u8] = b"Forbidden file route";
const METHOD_UNSUPPORTED: &[u8] = b"This request method is currently unsupported";

/// Turns a fully parsed request into a response value.
///
/// Keep-alive propagates unchanged: the router only ever copies the
/// request's flag, it never flips it on its own.
pub(crate) fn route(req: &RequestDescriptor, buf: &[u8], root: &DocRoot) -> Response {
    let mut response = dispatch(req, buf, root);
    response.close_after_send = !req.keep_alive;
    response
}

fn dispatch(req: &RequestDescriptor, buf: &[u8], root: &DocRoot) -> Response {
    let method = req.method.slice(buf);

    if req.is_api {
        return match method {
            b"GET" if req.normalized_path == b"/" => {
                Response::in_memory(StatusCode::Ok, "text/plain", HELLO.to_vec())
            }
            b"POST" if req.normalized_path == b"/echo" => echo(req.body.slice(buf)),
            b"GET" | b"POST" => not_found(),
            _ => method_not_allowed(),
        };
    }

    match method {
        b"GET" => static_files::serve(root, &req.normalized_path),
        _ => method_not_allowed(),
    }
}

fn echo(body: &[u8]) -> Response {
    let mut copy = Vec::new();
    if copy.try_reserve_exact(body.len()).is_err() {
        return Response::empty(StatusCode::InternalServerError);
    }
    copy.extend_from_slice(body);

    Response::in_memory(StatusCode::Ok, "text/plain", copy)
}

pub(crate) fn not_found() -> Response {
    Response::in_memory(StatusCode::NotFound, "text/plain", ROUTE_NOT_FOUND.to_vec())
}

pub(crate) fn forbidden_file() -> Response {
    Response::in_memory(StatusCode::Forbidden, "text/plain", FORBIDDEN_FILE_ROUTE.to_vec())
}

fn method_not_allowed() -> Response {
    Response::in_memory(
        StatusCode::MethodNotAllowed,
        "text/plain",
        METHOD_UNSUPPORTED.to_vec(),
    )
}
