use crate::config::{LoggingConfig, Section};
use parking_lot::Mutex;
use std::{
    io::{IsTerminal, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::{
    filter::{FilterFn, Targets},
    fmt,
};

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};

// -------- level helpers --------
fn parse_tracing_level(s: &str) -> Option<tracing::Level> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        "off" | "none" => None,
        _ => Some(Level::INFO),
    }
}

fn level_filter(s: &str) -> LevelFilter {
    parse_tracing_level(s).map_or(LevelFilter::OFF, LevelFilter::from_level)
}

/// Returns true if target == crate_name or target starts with "crate_name::"
fn matches_crate_prefix(target: &str, crate_name: &str) -> bool {
    target == crate_name
        || (target.starts_with(crate_name) && target[crate_name.len()..].starts_with("::"))
}

type DefaultFilter = FilterFn<Box<dyn Fn(&tracing::Metadata<'_>) -> bool + Send + Sync + 'static>>;

/// Everything not claimed by an explicit crate section, up to `max_level`.
fn default_filter(crate_names: &[String], max_level: LevelFilter) -> DefaultFilter {
    let crates = crate_names.to_vec();
    FilterFn::new(Box::new(move |meta: &tracing::Metadata<'_>| {
        let target = meta.target();
        if crates.iter().any(|c| matches_crate_prefix(target, c)) {
            return false;
        }
        *meta.level() <= max_level
    }))
}

// -------- rotating writer for files --------
type SharedRotate = Arc<Mutex<FileRotate<AppendTimestamp>>>;

#[derive(Clone)]
struct RotWriterHandle(SharedRotate);

impl Write for RotWriterHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

// A writer handle that may be None (drops writes)
struct RoutedWriterHandle(Option<RotWriterHandle>);

impl Write for RoutedWriterHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.0 {
            Some(w) => w.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.0 {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

/// Routes JSON log records to per-crate files, falling back to the default file.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<SharedRotate>,
    by_prefix: Vec<(String, SharedRotate)>,
}

impl FileRouter {
    fn resolve_for(&self, target: &str) -> Option<RotWriterHandle> {
        self.by_prefix
            .iter()
            .find(|(name, _)| matches_crate_prefix(target, name))
            .map(|(_, w)| w)
            .or(self.default.as_ref())
            .map(|w| RotWriterHandle(w.clone()))
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_prefix.is_empty()
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = RoutedWriterHandle;

    fn make_writer(&'a self) -> Self::Writer {
        RoutedWriterHandle(self.default.as_ref().map(|w| RotWriterHandle(w.clone())))
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        RoutedWriterHandle(self.resolve_for(meta.target()))
    }
}

/// Resolve a log file path against `base_dir` (app.home_dir).
fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn file_limit(section: &Section) -> FileLimit {
    match (section.max_backups, section.max_age_days) {
        (Some(files), _) => FileLimit::MaxFiles(files),
        (None, Some(days)) => FileLimit::Age(chrono::Duration::days(i64::from(days))),
        (None, None) => FileLimit::Age(chrono::Duration::days(1)),
    }
}

fn create_rotating_writer(section: &Section, base_dir: &Path) -> std::io::Result<Option<SharedRotate>> {
    if section.file.trim().is_empty() {
        return Ok(None);
    }
    let log_path = resolve_log_path(&section.file, base_dir);
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let max_bytes = section.max_size_mb.unwrap_or(100) * 1024 * 1024;
    let rot = FileRotate::new(
        &log_path,
        AppendTimestamp::default(file_limit(section)),
        ContentLimit::BytesSurpassed(max_bytes as usize),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    Ok(Some(Arc::new(Mutex::new(rot))))
}

struct Plan {
    crate_names: Vec<String>,
    console: Targets,
    files: Targets,
    default_console: LevelFilter,
    default_file: LevelFilter,
    router: FileRouter,
}

fn plan(cfg: &LoggingConfig, base_dir: &Path) -> Plan {
    let mut sections: Vec<(&String, &Section)> =
        cfg.iter().filter(|(k, _)| k.as_str() != "default").collect();
    // Longest prefix first so nested targets pick the most specific file
    sections.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

    let mut console = Targets::new().with_default(LevelFilter::OFF);
    let mut files = Targets::new().with_default(LevelFilter::OFF);
    let mut router = FileRouter::default();

    for (name, section) in &sections {
        console = console.with_target(name.as_str(), level_filter(&section.console_level));
        match create_rotating_writer(section, base_dir) {
            Ok(Some(writer)) => {
                files = files.with_target(name.as_str(), level_filter(&section.file_level));
                router.by_prefix.push(((*name).clone(), writer));
            }
            Ok(None) => {}
            Err(e) => eprintln!("Failed to init log file for '{name}': {} ({e})", section.file),
        }
    }

    let default = cfg.get("default");
    let mut default_file = LevelFilter::OFF;
    if let Some(section) = default {
        match create_rotating_writer(section, base_dir) {
            Ok(Some(writer)) => {
                router.default = Some(writer);
                default_file = level_filter(&section.file_level);
            }
            Ok(None) => {}
            Err(e) => eprintln!("Failed to init default log file {} ({e})", section.file),
        }
    }

    Plan {
        crate_names: sections.iter().map(|(n, _)| (*n).clone()).collect(),
        console,
        files,
        default_console: default.map_or(LevelFilter::OFF, |s| level_filter(&s.console_level)),
        default_file,
        router,
    }
}

/// Initialize logging from a configuration.
/// - `cfg`: LoggingConfig containing the logging sections
/// - `base_dir`: base directory used to resolve relative log file paths (usually app.home_dir)
///
/// Console output goes to stderr so document output on stdout stays clean.
pub fn init_logging_from_config(cfg: &LoggingConfig, base_dir: &Path) {
    use tracing_subscriber::{layer::SubscriberExt, prelude::*, Registry};

    // Bridge `log` → `tracing` *before* installing the subscriber
    let _ = tracing_log::LogTracer::init();

    let plan = plan(cfg, base_dir);
    let ansi = std::io::stderr().is_terminal();

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(plan.console);
    let console_default = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(default_filter(&plan.crate_names, plan.default_console));

    if plan.router.is_empty() {
        let _ = Registry::default()
            .with(console_layer)
            .with(console_default)
            .try_init();
        return;
    }

    let file_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(plan.router.clone())
        .with_filter(plan.files);
    let file_default = fmt::layer()
        .json()
        .with_ansi(false)
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(plan.router)
        .with_filter(default_filter(&plan.crate_names, plan.default_file));

    let _ = Registry::default()
        .with(console_layer)
        .with(console_default)
        .with(file_layer)
        .with(file_default)
        .try_init();
}

// =================== tests ===================
