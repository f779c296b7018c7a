//! Exceptions the host attaches to error responses, and panic capture.
//!
//! A handler that fails inserts a [`CapturedException`] into its response (or
//! request) extensions; the interceptor turns it into the exception variant of
//! the diagnostic record. Panics are converted the same way by
//! [`panic_response`], which is wired in through `CatchPanicLayer`.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::sync::Once;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tracing::error;

/// Exception details a host handler hands to the diagnostics layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedException {
    pub message: String,
    pub backtrace: Vec<String>,
}

impl CapturedException {
    pub fn new(message: impl Into<String>, backtrace: Vec<String>) -> Self {
        Self {
            message: message.into(),
            backtrace,
        }
    }

    /// Message from the error and its `source()` chain; frames from a
    /// backtrace taken here (only populated when `RUST_BACKTRACE` is set).
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            message,
            backtrace: frames_from(&Backtrace::capture()),
        }
    }

    /// A bare development error page carrying `self` as a response extension.
    pub fn into_error_page(self, status: StatusCode) -> Response {
        let reason = status.canonical_reason().unwrap_or("Error");
        let page = format!(
            "<!DOCTYPE html>\n<html>\n<head><title>{code} {reason}</title></head>\n<body>\n\
             <h1>{code} {reason}</h1>\n<pre>{message}</pre>\n</body>\n</html>\n",
            code = status.as_u16(),
            message = escape_html(&self.message),
        );
        let mut resp = (status, Html(page)).into_response();
        resp.extensions_mut().insert(self);
        resp
    }
}

pub fn frames_from(bt: &Backtrace) -> Vec<String> {
    if bt.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    parse_frames(&bt.to_string())
}

/// Fold `std` backtrace text (`N: symbol` lines followed by `at file:line`)
/// into one string per frame.
fn parse_frames(text: &str) -> Vec<String> {
    let mut frames: Vec<String> = Vec::new();
    for line in text.lines().map(str::trim) {
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(last) = frames.last_mut() {
                last.push_str(" (");
                last.push_str(location);
                last.push(')');
            }
            continue;
        }
        if let Some((index, symbol)) = line.split_once(": ") {
            if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                frames.push(symbol.trim().to_string());
            }
        }
    }
    frames
}

const PANIC_MACHINERY: [&str; 8] = [
    "std::backtrace",
    "std::panicking",
    "std::panic",
    "core::panicking",
    "core::panic",
    "rust_begin_unwind",
    "__rustc",
    "triage_server::capture",
];

fn is_panic_machinery(frame: &str) -> bool {
    PANIC_MACHINERY.iter().any(|prefix| frame.starts_with(prefix))
        || frame.starts_with("<alloc::boxed::Box<F,A> as core::ops::function::Fn")
}

thread_local! {
    static LAST_PANIC_FRAMES: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Record the panicking thread's frames so [`panic_response`] can attach
/// them. Chains to the previously installed hook; installs at most once.
pub fn install_panic_hook() {
    static INSTALLED: Once = Once::new();
    INSTALLED.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let frames: Vec<String> = frames_from(&Backtrace::force_capture())
                .into_iter()
                .skip_while(|frame| is_panic_machinery(frame))
                .collect();
            LAST_PANIC_FRAMES.with(|slot| *slot.borrow_mut() = Some(frames));
            previous(info);
        }));
    });
}

/// `CatchPanicLayer` handler: a 500 error page carrying the panic as a
/// captured exception.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(&*payload);
    let frames = LAST_PANIC_FRAMES
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_default();
    error!(target: "triage::capture", panic = %message, frames = frames.len(), "handler panicked");
    CapturedException::new(format!("panic: {message}"), frames)
        .into_error_page(StatusCode::INTERNAL_SERVER_ERROR)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
