//! Markup for the injected "ask AI" widget and the body splice.

use serde::Serialize;
use triage_core::DiagnosticRecord;

use crate::capture::escape_html;
use crate::DiagnosticsError;

/// Element id of the widget root; also what tests look for.
pub const WIDGET_MARKER: &str = "triage-widget";

const MARKUP_HEAD: &str = r#"
<div id="triage-widget" style="position:fixed;bottom:20px;right:20px;z-index:10000;font-family:system-ui,sans-serif;">
  <button id="triage-button" type="button" style="background:#4F46E5;color:#fff;border:0;padding:12px 24px;border-radius:8px;font-size:14px;font-weight:600;cursor:pointer;box-shadow:0 4px 6px rgba(0,0,0,.1);">Ask AI about this error</button>
  <div id="triage-overlay" style="display:none;position:fixed;inset:0;background:rgba(0,0,0,.5);z-index:10000;"></div>
  <div id="triage-modal" style="display:none;position:fixed;top:50%;left:50%;transform:translate(-50%,-50%);background:#fff;padding:24px;border-radius:12px;box-shadow:0 20px 25px rgba(0,0,0,.2);max-width:600px;max-height:80vh;overflow-y:auto;z-index:10001;">
    <h3 style="margin:0 0 4px;color:#1F2937;">AI Analysis</h3>
    <div style="margin:0 0 16px;color:#6B7280;font-size:12px;">model: "#;

const MARKUP_TAIL: &str = r#"</div>
    <div id="triage-content" style="color:#4B5563;line-height:1.6;">Analyzing...</div>
    <button id="triage-close" type="button" style="margin-top:16px;background:#E5E7EB;color:#374151;border:0;padding:8px 16px;border-radius:6px;cursor:pointer;">Close</button>
  </div>
</div>
<script>
(function () {
  const errorData = "#;

const SCRIPT_ENDPOINT: &str = ";\n  const endpoint = ";

const SCRIPT_TAIL: &str = r#";
  const button = document.getElementById('triage-button');
  const modal = document.getElementById('triage-modal');
  const overlay = document.getElementById('triage-overlay');
  const closeBtn = document.getElementById('triage-close');
  const content = document.getElementById('triage-content');

  function show(text, isError) {
    content.textContent = '';
    const node = document.createElement(isError ? 'span' : 'pre');
    node.style.cssText = isError ? 'color:#DC2626;' : 'white-space:pre-wrap;font-family:system-ui,sans-serif;';
    node.textContent = text;
    content.appendChild(node);
  }

  button.addEventListener('click', async function () {
    modal.style.display = 'block';
    overlay.style.display = 'block';
    content.textContent = 'Analyzing error... This may take a few seconds.';
    try {
      const response = await fetch(endpoint, {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify(errorData)
      });
      const result = await response.json();
      if (result.success) {
        show(result.response, false);
      } else {
        show('Error: ' + (result.error || 'Unknown error'), true);
      }
    } catch (error) {
      show('Failed to connect: ' + error.message, true);
    }
  });

  function closeModal() {
    modal.style.display = 'none';
    overlay.style.display = 'none';
  }
  closeBtn.addEventListener('click', closeModal);
  overlay.addEventListener('click', closeModal);
})();
</script>
"#;

/// Render the widget for `record`. The record travels as an inline JSON
/// literal; `model` is display text only.
pub fn render(record: &DiagnosticRecord, model: &str, endpoint: &str) -> Result<String, DiagnosticsError> {
    let data = script_json(record)?;
    let endpoint = script_json(&endpoint)?;
    let model = escape_html(model);
    let mut out = String::with_capacity(
        MARKUP_HEAD.len() + MARKUP_TAIL.len() + SCRIPT_TAIL.len() + data.len() + model.len() + 64,
    );
    out.push_str(MARKUP_HEAD);
    out.push_str(&model);
    out.push_str(MARKUP_TAIL);
    out.push_str(&data);
    out.push_str(SCRIPT_ENDPOINT);
    out.push_str(&endpoint);
    out.push_str(SCRIPT_TAIL);
    Ok(out)
}

/// JSON that is also safe inside a `<script>` element: nothing in it can
/// close the element or open a comment, and the JS line separators are
/// escaped.
fn script_json<T: Serialize + ?Sized>(value: &T) -> Result<String, DiagnosticsError> {
    let raw = serde_json::to_string(value)?;
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Insert `fragment` before the first ASCII case-insensitive occurrence of
/// `marker`, or append it when the marker is absent.
pub fn splice(body: &[u8], fragment: &str, marker: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + fragment.len());
    match find_ignore_ascii_case(body, marker.as_bytes()) {
        Some(idx) => {
            out.extend_from_slice(&body[..idx]);
            out.extend_from_slice(fragment.as_bytes());
            out.extend_from_slice(&body[idx..]);
        }
        None => {
            out.extend_from_slice(body);
            out.extend_from_slice(fragment.as_bytes());
        }
    }
    out
}

fn find_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}
