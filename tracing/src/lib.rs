//! Log output and progress bars for the `bkiso` tools.
//!
//! [install] sets up a global subscriber once per process. Long running
//! commands attach a bar to their span with [Bar::start] and feed it with
//! [Bar::update]; spans without an `indicatif.pb_show` field never draw one.
use indicatif::ProgressStyle;
use lazy_static::lazy_static;
use tracing::{Level, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::{filter::IndicatifFilter, writer, IndicatifLayer, IndicatifWriter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

lazy_static! {
    static ref ITEMS_STYLE: ProgressStyle = ProgressStyle::with_template(
        "{span_child_prefix} {wide_msg} {bar:10} ({elapsed}) {pos:>7}/{len:7} items"
    )
    .expect("invalid progress template");
    static ref BYTES_STYLE: ProgressStyle = ProgressStyle::with_template(
        "{span_child_prefix} {wide_msg} {binary_bytes:>7}/{binary_total_bytes:7}@{decimal_bytes_per_sec} ({elapsed}) {bar:10} "
    )
    .expect("invalid progress template");
    static ref SPINNER_STYLE: ProgressStyle = ProgressStyle::with_template(
        "{span_child_prefix}{spinner} {wide_msg} ({elapsed}) {pos:>7} items"
    )
    .expect("invalid progress template");
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Init(#[from] tracing_subscriber::util::TryInitError),

    #[error("invalid RUST_LOG: {0}")]
    Filter(#[from] tracing_subscriber::filter::FromEnvError),
}

/// The kinds of progress the tools report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bar {
    /// Tree items out of a known total, as in extraction.
    Items,
    /// Image bytes out of the final image length.
    Bytes,
    /// Items without a total, as when adding host trees.
    Spinner,
}

impl Bar {
    pub fn style(self) -> &'static ProgressStyle {
        match self {
            Bar::Items => &ITEMS_STYLE,
            Bar::Bytes => &BYTES_STYLE,
            Bar::Spinner => &SPINNER_STYLE,
        }
    }

    /// Shows this bar on `span` with `message` next to it.
    pub fn start(self, span: &Span, message: &str) {
        span.pb_set_style(self.style());
        span.pb_set_message(message);
        span.pb_start();
    }

    /// Moves the bar of `span` to `completed`, first growing its length to
    /// `total` when one is known.
    pub fn update(span: &Span, completed: u64, total: Option<u64>) {
        if let Some(total) = total {
            span.pb_set_length(total);
        }
        span.pb_set_position(completed);
    }
}

/// Where command output goes once logging is installed.
#[derive(Clone)]
pub struct Console {
    stdout: IndicatifWriter<writer::Stdout>,
}

impl Console {
    /// Standard output, suspended around redraws of active bars. Listing and
    /// info output must go through this instead of `println!`.
    pub fn stdout(&self) -> IndicatifWriter<writer::Stdout> {
        self.stdout.clone()
    }
}

/// Logs compact lines to stderr at `level`, unless `RUST_LOG` says
/// otherwise. With `progress`, spans marked `indicatif.pb_show` draw bars.
pub fn install(level: Level, progress: bool) -> Result<Console, Error> {
    let indicatif_layer = IndicatifLayer::new().with_progress_style(SPINNER_STYLE.clone());
    let stdout = indicatif_layer.get_stdout_writer();

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env()?,
        )
        .with(
            tracing_subscriber::fmt::Layer::new()
                .with_writer(indicatif_layer.get_stderr_writer())
                .compact(),
        )
        .with(progress.then(|| indicatif_layer.with_filter(IndicatifFilter::new(false))))
        .try_init()?;

    Ok(Console { stdout })
}

#[cfg(test)]
mod tests {
    use super::Bar;

    #[test]
    fn templates_parse() {
        for bar in [Bar::Items, Bar::Bytes, Bar::Spinner] {
            bar.style();
        }
    }
}
