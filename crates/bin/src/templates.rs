//! HTML templates for the demo application
//!
//! Simple inline HTML templates without a template engine.

use yusef::{RequestInfo, escape_html};

/// Common CSS styles for all pages
const COMMON_STYLES: &str = r#"
    body {
        font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
        max-width: 800px;
        margin: 40px auto;
        padding: 0 20px;
        background: #f5f5f5;
    }
    .container {
        background: white;
        padding: 30px;
        border-radius: 8px;
        box-shadow: 0 2px 4px rgba(0,0,0,0.1);
    }
    h1 {
        color: #333;
        border-bottom: 2px solid #0066cc;
        padding-bottom: 10px;
    }
    .info-row {
        margin: 10px 0;
        padding: 8px;
        background: #f9f9f9;
        border-radius: 4px;
    }
    .label {
        font-weight: bold;
        color: #666;
        display: inline-block;
        width: 150px;
    }
    .value {
        color: #0066cc;
    }
    input[type="text"] {
        width: 70%;
        padding: 10px;
        border: 1px solid #ddd;
        border-radius: 4px;
        font-size: 14px;
    }
    button {
        background: #0066cc;
        color: white;
        padding: 10px 20px;
        border: none;
        border-radius: 4px;
        cursor: pointer;
        font-weight: bold;
    }
    button.secondary {
        background: #999;
    }
    .notice {
        color: #8a6d3b;
        background: #fcf8e3;
        padding: 10px;
        border-radius: 4px;
        margin: 10px 0;
    }
"#;

/// State rendered by the index page
pub struct IndexView<'a> {
    pub info: &'a RequestInfo,
    pub visits: u64,
    pub notes: &'a [String],
}

/// Render the notes page
pub fn index_page(view: &IndexView<'_>) -> String {
    let info = view.info;
    let action = format!("{}/", info.service_path);
    let nonce = escape_html(info.nonce.as_deref().unwrap_or(""));

    let notice = info.unite_action_data.as_ref().map_or(String::new(), |data| {
        format!(
            r#"<div class="notice">Action result: <code>{}</code></div>"#,
            escape_html(&data.to_string())
        )
    });

    let notes = if view.notes.is_empty() {
        "<p><em>No notes yet.</em></p>".to_string()
    } else {
        let items: String = view
            .notes
            .iter()
            .map(|note| format!("\n            <li>{}</li>", escape_html(note)))
            .collect();
        format!("<ul>{items}\n        </ul>")
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{name} - Notes</title>
    <style>{COMMON_STYLES}</style>
</head>
<body>
    <div class="container">
        <h1>{name}</h1>
        {notice}
        <div class="info-row"><span class="label">Visits:</span> <span class="value">{visits}</span></div>
        <div class="info-row"><span class="label">Cookies:</span> <span class="value">{cookies}</span></div>
        <h2>Notes</h2>
        {notes}
        <form method="POST" action="{action}">
            <input type="hidden" name="unite-action" value="add-note">
            <input type="hidden" name="unite-nonce" value="{nonce}">
            <input type="text" name="note" maxlength="200" required autofocus>
            <button type="submit">Add</button>
        </form>
        <form method="POST" action="{action}">
            <input type="hidden" name="unite-action" value="clear-notes">
            <input type="hidden" name="unite-nonce" value="{nonce}">
            <button type="submit" class="secondary">Clear notes</button>
        </form>
        <p><a href="{api}">Request info (JSON)</a></p>
    </div>
</body>
</html>"#,
        name = escape_html(&info.service_name),
        visits = view.visits,
        cookies = if info.visitor.has_cookies { "yes" } else { "no" },
        action = escape_html(&action),
        api = escape_html(&format!("{}/api/info", info.service_path)),
    )
}
