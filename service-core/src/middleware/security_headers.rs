use axum::{
    extract::Request,
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};

/// Content policy for full HTML pages: the page pulls htmx and Tailwind from
/// their CDNs and Tailwind injects inline styles at runtime.
pub const PAGE_CSP: &str = "default-src 'self'; \
     script-src 'self' 'unsafe-inline' https://unpkg.com https://cdn.tailwindcss.com; \
     style-src 'self' 'unsafe-inline'; \
     img-src 'self' data:; \
     connect-src 'self'; \
     frame-ancestors 'none'";

/// Content policy for fragments, JSON and everything else.
pub const STRICT_CSP: &str = "default-src 'none'; frame-ancestors 'none'";

fn is_html_document(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"))
}

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    // htmx swaps fragments into an existing page, so only full navigations
    // get the page policy.
    let is_fragment_request = req.headers().contains_key("hx-request");

    let mut response = next.run(req).await;
    let page = !is_fragment_request && is_html_document(&response);
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(if page { PAGE_CSP } else { STRICT_CSP }),
    );

    response
}
