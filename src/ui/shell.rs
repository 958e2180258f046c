//! Document shell, not-found page and static assets

use axum::{
    http::{StatusCode, header},
    response::{Html, IntoResponse},
};

/// Page title
pub const TITLE: &str = "Auth Demo";

/// Stylesheet route
pub const STYLESHEET_PATH: &str = "/styles.css";

const STYLES: &str = include_str!("styles.css");

/// Swaps a form's button for its pending template on submit
const PENDING_SCRIPT: &str = r#"document.querySelectorAll('form[data-pending-template]').forEach(function (form) {
  form.addEventListener('submit', function () {
    var template = document.getElementById(form.dataset.pendingTemplate);
    var button = form.querySelector('button');
    if (template && button) {
      button.replaceWith(template.content.cloneNode(true));
    }
  });
});"#;

/// Wrap page markup in the top-level document
pub fn document(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{TITLE}</title>
<link rel="stylesheet" href="{STYLESHEET_PATH}">
</head>
<body>
{body}
<script>{PENDING_SCRIPT}</script>
</body>
</html>
"#
    )
}

/// Markup of the not-found fallback
pub fn not_found_page() -> String {
    document(
        r#"<div class="center fullscreen">
<div>
<h1>Page not found</h1>
<p class="muted">The page you are looking for does not exist.</p>
</div>
</div>"#,
    )
}

/// Markup of the sign-in error page
pub fn error_page(code: &str) -> String {
    let code = html_escape::encode_text(code);
    document(&format!(
        r#"<div class="center fullscreen">
<div>
<h1>Sign in failed</h1>
<p class="muted">Error: <code>{code}</code></p>
<p class="muted"><a href="/">Back to the app</a></p>
</div>
</div>"#
    ))
}

/// Router fallback
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html(not_found_page()))
}

/// GET /styles.css
pub async fn stylesheet() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/css; charset=utf-8"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        STYLES,
    )
}
