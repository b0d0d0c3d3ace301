//! HTML pages shown in the browser after the provider redirects back.

/// Render the page shown when authorization completed.
pub fn render_success_page() -> String {
    render_page(
        "Authorization complete",
        "You can close this window and return to your MCP client.",
        false,
    )
}

/// Render the page shown when the callback was rejected.
///
/// The message is HTML-escaped to prevent XSS.
pub fn render_error_page(message: &str) -> String {
    render_page("Authorization failed", message, true)
}

fn render_page(title: &str, message: &str, is_error: bool) -> String {
    let accent = if is_error { "#c00" } else { "#2e7d32" };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width,initial-scale=1">
<title>{title} - Google Workspace MCP</title>
<style>
body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; background: #f5f5f5; margin: 0; display: flex; justify-content: center; align-items: center; min-height: 100vh; }}
.card {{ background: #fff; border-radius: 8px; box-shadow: 0 2px 8px rgba(0,0,0,0.1); padding: 32px; max-width: 420px; width: 100%; }}
h1 {{ font-size: 20px; margin: 0 0 12px; color: {accent}; }}
p {{ color: #333; font-size: 14px; line-height: 1.5; margin: 0; }}
</style>
</head>
<body>
<div class="card">
<h1>{title}</h1>
<p>{message}</p>
</div>
</body>
</html>"#,
        title = html_escape(title),
        message = html_escape(message),
        accent = accent,
    )
}

/// Escape HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
