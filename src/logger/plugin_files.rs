//! Per-plugin log files for the detached daemon.
//!
//! Every event emitted inside a `plugin` span is also appended to
//! `<log dir>/<name>/<name>.log` as `<timestamp> <LEVEL> <message> <fields>`.
//! The span's `debug` field decides whether DEBUG events make it into the
//! file; INFO and above always do.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::{self, Write as _};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use super::{TIMESTAMP_FORMAT, appender};

/// Name of the span the plugin runtime opens around each plugin run.
pub const PLUGIN_SPAN: &str = "plugin";

/// Path of the log file kept for `plugin` under `root`.
#[must_use]
pub fn plugin_log_path(root: &Path, plugin: &str) -> PathBuf {
    root.join(plugin).join(format!("{plugin}.log"))
}

/// Plugin names end up as a directory name; anything that could escape the
/// log root gets no file.
fn is_safe_component(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

#[derive(Debug, Clone)]
struct PluginTarget {
    name: String,
    verbose: bool,
}

#[derive(Default)]
struct SpanFields {
    name: Option<String>,
    debug: bool,
}

impl Visit for SpanFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "name" {
            self.name = Some(value.to_string());
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "debug" {
            self.debug = value;
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "name" {
            self.name = Some(format!("{value:?}"));
        }
    }
}

#[derive(Default)]
struct EventLine {
    message: String,
    fields: String,
}

impl Visit for EventLine {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}

/// `tracing-subscriber` layer fanning plugin events out to their own files.
pub struct PluginFileLayer {
    root: PathBuf,
    files: Mutex<HashMap<String, RollingFileAppender>>,
}

impl fmt::Debug for PluginFileLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginFileLayer")
            .field("root", &self.root)
            .field("open", &self.files.lock().len())
            .finish()
    }
}

impl PluginFileLayer {
    /// Layer writing below `root`. Files are created on first use.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: Mutex::new(HashMap::new()),
        }
    }

    fn write_line(&self, plugin: &str, line: &str) {
        let mut files = self.files.lock();
        let file = match files.entry(plugin.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let dir = self.root.join(plugin);
                match appender(&dir, &format!("{plugin}.log")) {
                    Ok(file) => entry.insert(file),
                    // Nowhere to report it: the main log may be this same disk.
                    Err(_) => return,
                }
            }
        };
        let _ = file.write_all(line.as_bytes());
    }
}

impl<S> Layer<S> for PluginFileLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != PLUGIN_SPAN {
            return;
        }
        let mut fields = SpanFields::default();
        attrs.record(&mut fields);
        let Some(name) = fields.name.filter(|name| is_safe_component(name)) else {
            return;
        };
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(PluginTarget {
                name,
                verbose: fields.debug,
            });
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(target) = ctx.event_scope(event).and_then(|mut scope| {
            scope.find_map(|span| {
                let extensions = span.extensions();
                extensions.get::<PluginTarget>().cloned()
            })
        }) else {
            return;
        };

        let level = *event.metadata().level();
        let ceiling = if target.verbose { Level::DEBUG } else { Level::INFO };
        if level > ceiling {
            return;
        }

        let mut line = EventLine::default();
        event.record(&mut line);
        let rendered = format!(
            "{} {} {}{}\n",
            Local::now().format(TIMESTAMP_FORMAT),
            level.as_str(),
            line.message,
            line.fields
        );
        self.write_line(&target.name, &rendered);
    }
}
