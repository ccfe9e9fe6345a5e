//! Development diagnostic page.
//!
//! Standalone HTML, built without the renderer so it still works when the
//! failure came from a broken view or layout. Every interpolated value is
//! escaped.

use std::fmt::Write;

use crate::http::error::HandlerError;
use crate::view::escape_html;

use super::policy::RequestSummary;

const STYLE: &str = "body{font-family:monospace;margin:2em}h1{color:#b00}\
pre{background:#f4f4f4;padding:1em;overflow:auto}th{text-align:left;padding-right:1em}";

/// Full diagnostic page for a handler failure.
pub fn development_page(error: &HandlerError, request: &RequestSummary<'_>) -> String {
    let mut out = String::with_capacity(4096);
    let type_name = escape_html(error.type_name());
    let message = escape_html(&error.to_string());

    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{type_name}: {message}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <h1>{type_name}</h1>\n<p>{message}</p>\n"
    );

    let chain = error.chain();
    if chain.len() > 1 {
        out.push_str("<h2>Caused by</h2>\n<ol>\n");
        for cause in &chain[1..] {
            let _ = writeln!(out, "<li>{}</li>", escape_html(cause));
        }
        out.push_str("</ol>\n");
    }

    let _ = write!(
        out,
        "<h2>Request</h2>\n<table>\n<tr><th>Method</th><td>{}</td></tr>\n\
         <tr><th>Path</th><td>{}</td></tr>\n</table>\n",
        escape_html(request.method.as_str()),
        escape_html(request.path)
    );

    if let Some(params) = request.params.filter(|p| !p.is_empty()) {
        out.push_str("<h2>Parameters</h2>\n<table>\n");
        for (key, value) in params.iter() {
            let _ = writeln!(
                out,
                "<tr><th>{}</th><td>{}</td></tr>",
                escape_html(key),
                escape_html(value)
            );
        }
        out.push_str("</table>\n");
    }

    out.push_str("<h2>Headers</h2>\n<table>\n");
    for (name, value) in request.headers {
        let value = value.to_str().unwrap_or("<binary>");
        let _ = writeln!(
            out,
            "<tr><th>{}</th><td>{}</td></tr>",
            escape_html(name.as_str()),
            escape_html(value)
        );
    }
    out.push_str("</table>\n");

    let _ = write!(
        out,
        "<h2>Backtrace</h2>\n<pre>{}</pre>\n</body>\n</html>\n",
        escape_html(&error.backtrace().to_string())
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Params;
    use axum::http::{HeaderMap, HeaderValue, Method};

    #[test]
    fn test_page_contents_are_escaped() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("<agent>"));
        let params = Params::parse(b"q=%3Cscript%3E");
        let request = RequestSummary {
            method: &Method::POST,
            path: "/boom",
            headers: &headers,
            params: Some(&params),
        };

        let error = HandlerError::msg("bad <thing>");
        let page = development_page(&error, &request);

        assert!(page.contains("<h1>HandlerError</h1>"));
        assert!(page.contains("bad &lt;thing&gt;"));
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("&lt;agent&gt;"));
        assert!(page.contains("<h2>Backtrace</h2>"));
        assert!(!page.contains("<script>"));
    }
}
