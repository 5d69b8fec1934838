use crate::allowlist::FieldOverride;
use crate::error::InitError;
use crate::formatter::RecordSanitizer;
use crate::layer::SanitizingLayer;
use crate::shared::SharedSanitizer;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Formatter configuration.
///
/// **Fields**
/// - `whitelists`: per-namespace allow-list entries (`record`, `traceback`,
///   `meta`, `settings`, or any new namespace).
/// - `replace`: use `whitelists` verbatim instead of extending the defaults.
/// - `datefmt`: strftime pattern for `asctime`.
/// - `use_time`: emit `asctime` at all.
/// - `field_overrides`: explicit `allow`/`deny` per namespace and field,
///   applied last.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct FormatterConfig {
    pub whitelists: Option<BTreeMap<String, Vec<String>>>,
    pub replace: bool,
    pub datefmt: Option<String>,
    pub use_time: bool,
    pub field_overrides: BTreeMap<String, BTreeMap<String, FieldOverride>>,
}

/// Configuration of the sanitizing layer.
///
/// **Fields**
/// - `formatter`: see [`FormatterConfig`].
/// - `min_level`: least severe level that is still formatted.
/// - `enable_console`: additionally install a human-readable
///   `tracing_subscriber::fmt` layer writing to stderr.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub formatter: FormatterConfig,
    pub min_level: Level,
    pub enable_console: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            formatter: FormatterConfig::default(),
            min_level: Level::INFO,
            enable_console: false,
        }
    }
}

/// Install a global subscriber that writes sanitized JSON lines to
/// `make_writer`.
///
/// **Returns** the [`SharedSanitizer`] driving the layer, so the caller can
/// swap in a new configuration later.
pub fn init_tracing_with_config<W>(make_writer: W, config: LayerConfig) -> Result<Arc<SharedSanitizer>, InitError>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let sanitizer = RecordSanitizer::from_config(&config.formatter)?;
    let shared = Arc::new(SharedSanitizer::new(sanitizer));
    let layer = SanitizingLayer::new(Arc::clone(&shared), make_writer).with_min_level(config.min_level);

    if config.enable_console {
        let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        let subscriber = Registry::default().with(layer).with(console);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(shared)
}

/// Initialize tracing with default configuration, writing to stdout.
pub fn init_tracing() -> Result<Arc<SharedSanitizer>, InitError> {
    init_tracing_with_config(std::io::stdout, LayerConfig::default())
}
