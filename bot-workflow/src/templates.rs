use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use berner_core::{ConfigError, CoreError, PostEvent};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Largest comment script file the pool will accept, in bytes.
pub const MAX_TEMPLATE_BYTES: u64 = 10_000;

const DEFAULT_EXTENSION: &str = "txt";

/// A single pre-authored comment script.
#[derive(Debug, Clone)]
pub struct Template {
    text: String,
    source: PathBuf,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: PathBuf::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Substitute the recognized placeholders with values from `post`:
    /// `{subreddit}` becomes the forum name, `{postid}` the post id and
    /// `{post}` the post fullname (ex. "?sub={subreddit}&post={post}" might
    /// become "?sub=WayOfTheBern&post=t3_d0vw1j"). Unrecognized placeholders
    /// pass through verbatim.
    pub fn render(&self, post: &PostEvent) -> String {
        self.text
            .replace("{subreddit}", &post.subreddit)
            .replace("{postid}", &post.id)
            .replace("{post}", &post.fullname)
    }
}

/// Pool of comment templates with uniform random selection.
pub struct TemplatePool {
    templates: Vec<Template>,
    rng: Mutex<fastrand::Rng>,
}

impl TemplatePool {
    /// Load every eligible `.txt` file under `dir`, recursively.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, CoreError> {
        Self::load_with_extension(dir, DEFAULT_EXTENSION)
    }

    /// Load every file under `dir` with the given extension that is at or
    /// under [`MAX_TEMPLATE_BYTES`]. Oversized files are skipped with a
    /// warning; an empty resulting pool is a fatal startup error.
    pub fn load_with_extension(
        dir: impl AsRef<Path>,
        extension: &str,
    ) -> Result<Self, CoreError> {
        let dir = dir.as_ref();
        let mut templates = Vec::new();

        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping unreadable script file {}: {}", path.display(), e);
                    continue;
                }
            };
            if metadata.len() > MAX_TEMPLATE_BYTES {
                warn!(
                    "Skipping oversized script file {} ({} bytes)",
                    path.display(),
                    metadata.len()
                );
                continue;
            }

            let text = fs::read_to_string(path)?;
            debug!("Loaded script file {}", path.display());
            templates.push(Template {
                text,
                source: path.to_path_buf(),
            });
        }

        if templates.is_empty() {
            return Err(ConfigError::NoTemplates {
                path: dir.display().to_string(),
            }
            .into());
        }

        Ok(Self {
            templates,
            rng: Mutex::new(fastrand::Rng::new()),
        })
    }

    /// Build a pool from in-memory templates. The set must be non-empty.
    pub fn from_templates(templates: Vec<Template>) -> Result<Self, CoreError> {
        if templates.is_empty() {
            return Err(ConfigError::NoTemplates {
                path: "<memory>".to_string(),
            }
            .into());
        }
        Ok(Self {
            templates,
            rng: Mutex::new(fastrand::Rng::new()),
        })
    }

    /// Replace the random source with a seeded one for reproducible
    /// selection in tests.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            templates: self.templates,
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// One template chosen uniformly at random from the loaded set. Safe to
    /// call from concurrent per-forum callbacks.
    pub fn sample(&self) -> &Template {
        let index = {
            let mut rng = self.rng.lock().expect("template rng lock poisoned");
            rng.usize(..self.templates.len())
        };
        &self.templates[index]
    }
}
