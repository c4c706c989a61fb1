use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Config;

/// Per-directory config file name, looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = ".periodica.toml";

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub cache: Option<CacheSection>,
    pub search: Option<SearchSection>,
    pub sources: Option<SourcesSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSection {
    pub dir: Option<String>,
    pub ttl_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSection {
    pub default_limit: Option<usize>,
    pub max_limit: Option<usize>,
    pub default_window_months: Option<u32>,
    pub fuzzy_title_threshold: Option<f64>,
    pub source_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcesSection {
    pub disabled: Option<Vec<String>>,
    pub crossref_mailto: Option<String>,
    pub openalex_mailto: Option<String>,
    pub s2_api_key: Option<String>,
}

/// Platform config directory path: `<config_dir>/periodica/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("periodica").join("config.toml"))
}

/// Load config by cascading CWD `.periodica.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(LOCAL_CONFIG_FILE));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

fn pick<S, T: Clone>(
    overlay: &Option<S>,
    base: &Option<S>,
    field: impl Fn(&S) -> Option<T>,
) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bc, oc) = (&base.cache, &overlay.cache);
    let (bs, os) = (&base.search, &overlay.search);
    let (bx, ox) = (&base.sources, &overlay.sources);
    ConfigFile {
        cache: Some(CacheSection {
            dir: pick(oc, bc, |c| c.dir.clone()),
            ttl_secs: pick(oc, bc, |c| c.ttl_secs),
            sweep_interval_secs: pick(oc, bc, |c| c.sweep_interval_secs),
        }),
        search: Some(SearchSection {
            default_limit: pick(os, bs, |s| s.default_limit),
            max_limit: pick(os, bs, |s| s.max_limit),
            default_window_months: pick(os, bs, |s| s.default_window_months),
            fuzzy_title_threshold: pick(os, bs, |s| s.fuzzy_title_threshold),
            source_timeout_secs: pick(os, bs, |s| s.source_timeout_secs),
        }),
        sources: Some(SourcesSection {
            disabled: pick(ox, bx, |s| s.disabled.clone()),
            crossref_mailto: pick(ox, bx, |s| s.crossref_mailto.clone()),
            openalex_mailto: pick(ox, bx, |s| s.openalex_mailto.clone()),
            s2_api_key: pick(ox, bx, |s| s.s2_api_key.clone()),
        }),
    }
}

impl ConfigFile {
    /// Copy every value present in this file onto `config`.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(cache) = &self.cache {
            if let Some(dir) = &cache.dir {
                config.cache_dir = PathBuf::from(dir);
            }
            if let Some(ttl) = cache.ttl_secs {
                config.cache_ttl_secs = ttl;
            }
            if let Some(interval) = cache.sweep_interval_secs {
                config.cache_sweep_interval_secs = interval;
            }
        }
        if let Some(search) = &self.search {
            if let Some(v) = search.default_limit {
                config.default_limit = v;
            }
            if let Some(v) = search.max_limit {
                config.max_limit = v;
            }
            if let Some(v) = search.default_window_months {
                config.default_window_months = v;
            }
            if let Some(v) = search.fuzzy_title_threshold {
                if (0.0..=1.0).contains(&v) {
                    config.fuzzy_title_threshold = v;
                } else {
                    tracing::warn!(
                        value = v,
                        "ignoring fuzzy_title_threshold outside [0, 1]"
                    );
                }
            }
            if let Some(v) = search.source_timeout_secs {
                config.source_timeout_secs = v;
            }
        }
        if let Some(sources) = &self.sources {
            if let Some(disabled) = &sources.disabled {
                config.disabled_sources = disabled.clone();
            }
            if sources.crossref_mailto.is_some() {
                config.crossref_mailto = sources.crossref_mailto.clone();
            }
            if sources.openalex_mailto.is_some() {
                config.openalex_mailto = sources.openalex_mailto.clone();
            }
            if sources.s2_api_key.is_some() {
                config.s2_api_key = sources.s2_api_key.clone();
            }
        }
    }
}
